//! Command-line driver for proof generation and distributed filtering

use std::fs::File;
use std::io::BufWriter;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cdgen::config::{available_threads, DistributedConfig, GeneratorConfig};
use cdgen::distributed::{filter_redundant, TcpTransport, Transport};
use cdgen::filter::{remove_redundant, RedundancyCheck};
use cdgen::proof::{CondensedDetachment, ProofStore};
use cdgen::{Error, Generator, Result, SymbolTable};

#[derive(Parser)]
#[clap(
    name = "cdgen",
    about = "Generate shortest condensed-detachment proofs",
    version = env!("CARGO_PKG_VERSION")
)]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate representatives length by length, resuming from DIR
    Generate {
        #[clap(long, value_name = "DIR")]
        data_dir: PathBuf,

        /// Last proof length to generate
        #[clap(long, value_name = "L")]
        up_to: usize,

        #[clap(long, help = "Worker threads (defaults to all hardware threads).")]
        threads: Option<usize>,

        #[clap(long, default_value_t = 32)]
        low_water_mark: usize,

        #[clap(long, help = "Keep conclusions that are instances of known schemas.")]
        no_filter: bool,

        /// Write per-length statistics as JSON
        #[clap(long, value_name = "FILE")]
        stats: Option<PathBuf>,
    },

    /// Filter the unfiltered collection of one length as one rank of a job
    Filter {
        #[clap(long, value_name = "DIR")]
        data_dir: PathBuf,

        #[clap(long, value_name = "L")]
        length: usize,

        #[clap(long)]
        rank: usize,

        /// Listening addresses of all ranks, in rank order
        #[clap(long, value_delimiter = ',', value_name = "ADDR,...")]
        peers: Vec<SocketAddr>,

        #[clap(long, default_value_t = 50)]
        poll_interval_ms: u64,

        #[clap(long, default_value_t = 64)]
        min_chunk_size: u64,

        #[clap(long, value_name = "FILE")]
        stats: Option<PathBuf>,
    },
}

fn main() {
    // Use RUST_LOG to control log levels, e.g. RUST_LOG=cdgen=debug
    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let result = match args.command {
        Command::Generate {
            data_dir,
            up_to,
            threads,
            low_water_mark,
            no_filter,
            stats,
        } => {
            let config = GeneratorConfig {
                threads: threads.unwrap_or_else(available_threads),
                low_water_mark,
                redundancy_filter: !no_filter,
                data_dir,
            };
            generate(config, up_to, stats.as_deref())
        }
        Command::Filter {
            data_dir,
            length,
            rank,
            peers,
            poll_interval_ms,
            min_chunk_size,
            stats,
        } => {
            let config = DistributedConfig {
                poll_interval: Duration::from_millis(poll_interval_ms),
                min_chunk_size,
                ..Default::default()
            };
            filter(&data_dir, length, rank, &peers, config, stats.as_deref())
        }
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn parser() -> Result<CondensedDetachment> {
    CondensedDetachment::lukasiewicz(Arc::new(SymbolTable::classical()))
}

fn write_stats<T: Serialize>(path: &Path, stats: &T) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, stats)
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
    info!(path = %path.display(), "wrote statistics");
    Ok(())
}

fn generate(config: GeneratorConfig, up_to: usize, stats: Option<&Path>) -> Result<()> {
    info!(
        data_dir = %config.data_dir.display(),
        up_to,
        threads = config.threads,
        filter = config.redundancy_filter,
        "starting generation"
    );
    let mut generator = Generator::from_store(parser()?, config)?;
    let all = generator.generate_up_to(up_to)?;
    if let Some(path) = stats {
        write_stats(path, &all)?;
    }
    Ok(())
}

fn filter(
    data_dir: &Path,
    length: usize,
    rank: usize,
    peers: &[SocketAddr],
    config: DistributedConfig,
    stats: Option<&Path>,
) -> Result<()> {
    let transport = TcpTransport::connect(rank, peers)?;
    match filter_rank(&transport, data_dir, length, config, stats) {
        Ok(()) => Ok(()),
        Err(e) => {
            error!(rank, "fatal: {}", e);
            transport.abort(1)
        }
    }
}

fn filter_rank<T: Transport>(
    transport: &T,
    data_dir: &Path,
    length: usize,
    config: DistributedConfig,
    stats: Option<&Path>,
) -> Result<()> {
    let parser = parser()?;
    let store = ProofStore::new(data_dir);
    let mut representatives = store.load(&parser, Some(length.saturating_sub(2)))?;
    store.load_unfiltered(length, &parser, &mut representatives)?;

    let check = RedundancyCheck::new(&representatives, length);
    let (keys, outcome) = filter_redundant(&check, transport, config)?;
    if let Some(keys) = keys {
        let removed = remove_redundant(&mut representatives, &keys);
        store.save_length(&representatives, length, true)?;
        info!(length, removed, "filtered collection saved");
    }
    if let Some(path) = stats {
        write_stats(path, &outcome.stats)?;
    }
    Ok(())
}
