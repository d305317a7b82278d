//! Length-partitioned proof collections on disk
//!
//! A data directory holds one file per proof length:
//!
//! - `dProofs<k>.txt`: representatives of length `k` after redundancy filtering
//! - `dProofs<k>-unfiltered.txt`: representatives before filtering
//!
//! Each line is `proof:conclusionKey`, sorted by key. Lines consisting of a
//! bare proof are accepted on load; their key is recomputed by the parser.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{ProofParser, Representatives};
use crate::logic::Formula;
use crate::{Error, Result};

/// One stored line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredProof {
    pub proof: String,
    pub key: Option<String>,
}

impl StoredProof {
    fn parse_line(line: &str) -> Option<StoredProof> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        Some(match line.split_once(':') {
            Some((proof, key)) => StoredProof {
                proof: proof.to_string(),
                key: Some(key.to_string()),
            },
            None => StoredProof {
                proof: line.to_string(),
                key: None,
            },
        })
    }
}

/// Directory of proof collection files
#[derive(Debug, Clone)]
pub struct ProofStore {
    dir: PathBuf,
}

impl ProofStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ProofStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn filtered_path(&self, length: usize) -> PathBuf {
        self.dir.join(format!("dProofs{}.txt", length))
    }

    pub fn unfiltered_path(&self, length: usize) -> PathBuf {
        self.dir.join(format!("dProofs{}-unfiltered.txt", length))
    }

    /// Write the representatives of one length, sorted by key
    pub fn save_length(
        &self,
        representatives: &Representatives,
        length: usize,
        filtered: bool,
    ) -> Result<PathBuf> {
        let path = if filtered {
            self.filtered_path(length)
        } else {
            self.unfiltered_path(length)
        };
        let mut lines: Vec<(&str, &str)> = representatives
            .of_length(length)
            .map(|(key, rep)| (key.as_str(), rep.proof.as_str()))
            .collect();
        lines.sort_unstable();

        fs::create_dir_all(&self.dir)?;
        let mut writer = BufWriter::new(File::create(&path)?);
        for (key, proof) in &lines {
            writeln!(writer, "{}:{}", proof, key)?;
        }
        writer.flush()?;
        info!(path = %path.display(), entries = lines.len(), "saved proofs");
        Ok(path)
    }

    /// Read the raw lines of a collection file
    pub fn read(path: &Path) -> Result<Vec<StoredProof>> {
        let file = File::open(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("cannot read {}: {}", path.display(), e),
            ))
        })?;
        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            if let Some(entry) = StoredProof::parse_line(&line?) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Lengths `1, 3, 5, …` with a filtered collection file, stopping at the
    /// first gap
    pub fn filtered_lengths(&self) -> Vec<usize> {
        (1..)
            .step_by(2)
            .take_while(|&length| self.filtered_path(length).is_file())
            .collect()
    }

    /// Load all consecutive filtered collections, optionally stopping after
    /// `up_to`.
    pub fn load<P: ProofParser + ?Sized>(
        &self,
        parser: &P,
        up_to: Option<usize>,
    ) -> Result<Representatives> {
        let mut representatives = Representatives::new();
        for length in self.filtered_lengths() {
            if up_to.is_some_and(|limit| length > limit) {
                break;
            }
            self.load_file(&self.filtered_path(length), parser, &mut representatives)?;
        }
        Ok(representatives)
    }

    /// Add the unfiltered collection of `length` to `representatives`
    pub fn load_unfiltered<P: ProofParser + ?Sized>(
        &self,
        length: usize,
        parser: &P,
        representatives: &mut Representatives,
    ) -> Result<usize> {
        self.load_file(&self.unfiltered_path(length), parser, representatives)
    }

    fn load_file<P: ProofParser + ?Sized>(
        &self,
        path: &Path,
        parser: &P,
        representatives: &mut Representatives,
    ) -> Result<usize> {
        let entries = ProofStore::read(path)?;
        let count = entries.len();
        for entry in entries {
            let (key, conclusion) = match entry.key {
                Some(key) => {
                    let conclusion = Formula::from_key(&key, parser.symbols())?;
                    (key, conclusion)
                }
                None => {
                    let conclusion = parser.parse(&entry.proof).map_err(|failure| {
                        Error::Parse(format!(
                            "stored proof {:?} in {}: {}",
                            entry.proof,
                            path.display(),
                            failure
                        ))
                    })?;
                    (conclusion.key(parser.symbols()), conclusion)
                }
            };
            representatives.offer(key, entry.proof, conclusion);
        }
        debug!(path = %path.display(), entries = count, "loaded proofs");
        Ok(count)
    }
}
