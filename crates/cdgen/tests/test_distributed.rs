//! Integration tests for the distributed redundancy filter over in-process ranks

use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cdgen::distributed::{
    filter_redundant, DistributedFilter, FilterOutcome, LocalHub, TcpTransport,
};
use cdgen::{
    find_redundant, CondensedDetachment, DistributedConfig, Error, Generator, GeneratorConfig,
    RedundancyCheck, Result, SymbolTable,
};

fn config() -> DistributedConfig {
    DistributedConfig {
        poll_interval: Duration::from_millis(1),
        min_chunk_size: 4,
        reservable_denominator: 3,
    }
}

/// Run one pass with `size` ranks, each loading `counts[rank]` indices
fn run_ranks<F>(counts: &[u64], check: F) -> Vec<Result<FilterOutcome>>
where
    F: Fn(usize, u64) -> bool + Sync,
{
    let hub = LocalHub::new(counts.len());
    thread::scope(|scope| {
        let handles: Vec<_> = hub
            .iter()
            .zip(counts)
            .enumerate()
            .map(|(rank, (transport, &count))| {
                let check = &check;
                scope.spawn(move || {
                    let filter = DistributedFilter::new(transport, config())?;
                    filter.run(count, |i| Ok(check(rank, i)))
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

#[test]
fn test_every_index_processed_exactly_once() {
    for size in 1..=4 {
        for count in [0u64, 1, 2, 3, 17, 300] {
            let hits: Vec<AtomicUsize> = (0..count).map(|_| AtomicUsize::new(0)).collect();
            let outcomes = run_ranks(&vec![count; size], |rank, i| {
                hits[i as usize].fetch_add(1, Ordering::SeqCst);
                // Slow rank 0 down so the others have to steal from it
                if rank == 0 {
                    thread::sleep(Duration::from_micros(200));
                }
                i % 7 == 3
            });

            for (i, hit) in hits.iter().enumerate() {
                assert_eq!(hit.load(Ordering::SeqCst), 1, "index {} with {} ranks", i, size);
            }
            let outcomes: Vec<FilterOutcome> =
                outcomes.into_iter().map(|o| o.unwrap()).collect();
            let expected: Vec<u64> = (0..count).filter(|i| i % 7 == 3).collect();
            assert_eq!(outcomes[0].redundant.as_ref(), Some(&expected));
            assert!(outcomes[1..].iter().all(|o| o.redundant.is_none()));

            let processed: u64 = outcomes.iter().map(|o| o.stats.processed).sum();
            assert_eq!(processed, count);
            let found: u64 = outcomes.iter().map(|o| o.stats.found).sum();
            assert_eq!(found, expected.len() as u64);
        }
    }
}

#[test]
fn test_work_is_stolen_from_slow_rank() {
    let outcomes = run_ranks(&[400, 400], |rank, _| {
        if rank == 0 {
            thread::sleep(Duration::from_micros(500));
        }
        false
    });
    let outcomes: Vec<FilterOutcome> = outcomes.into_iter().map(|o| o.unwrap()).collect();
    assert!(outcomes[1].stats.stolen >= 1);
    assert!(outcomes[0].stats.given >= 1);
    assert!(outcomes[1].stats.processed > 200);
}

#[test]
fn test_size_mismatch_fails_every_rank() {
    let outcomes = run_ranks(&[10, 10, 11], |_, _| false);
    assert_eq!(outcomes.len(), 3);
    for outcome in outcomes {
        assert!(matches!(outcome, Err(Error::SizeMismatch(_))));
    }
}

#[test]
fn test_distributed_matches_local_filter() {
    let parser = CondensedDetachment::lukasiewicz(Arc::new(SymbolTable::classical())).unwrap();
    let mut generator = Generator::new(
        parser,
        GeneratorConfig {
            redundancy_filter: false,
            ..GeneratorConfig::sequential()
        },
    );
    generator.generate_up_to(7).unwrap();
    let check = RedundancyCheck::new(generator.representatives(), 7);
    let local = check.candidate_keys(&find_redundant(&check).unwrap());

    for size in [1, 3] {
        let hub = LocalHub::new(size);
        let results: Vec<Option<Vec<String>>> = thread::scope(|scope| {
            let handles: Vec<_> = hub
                .iter()
                .map(|transport| {
                    let check = &check;
                    scope.spawn(move || filter_redundant(check, transport, config()).unwrap().0)
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(results[0].as_ref(), Some(&local));
        assert!(results[1..].iter().all(Option::is_none));
    }
}

#[test]
fn test_failed_rank_stops_tcp_peers() {
    let addrs: Vec<SocketAddr> = (0..2)
        .map(|_| {
            let l = TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap()
        })
        .collect();

    let results: Vec<Result<FilterOutcome>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|rank| {
                let addrs = &addrs;
                scope.spawn(move || {
                    let transport = TcpTransport::connect(rank, addrs)?;
                    let filter = DistributedFilter::new(&transport, config())?;
                    let outcome = if rank == 1 {
                        filter.run(10, |_| Err(Error::CorruptedFormula("arity 1 vs 2".into())))
                    } else {
                        filter.run(10, |_| Ok(false))
                    };
                    // Dropping the transport closes this rank's connections
                    outcome
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(matches!(results[1], Err(Error::CorruptedFormula(_))));
    assert!(matches!(results[0], Err(Error::Transport(_))));
}
