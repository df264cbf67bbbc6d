//! Concurrent copy/drop workload on one shared object
//!
//! Worker threads clone, drop, mint/release and strengthen handles to a
//! single object. The run fails unless every worker's unit came back and the
//! object was destroyed exactly once.

use crate::config::StressConfig;
use crate::ffi;
use crate::logging::{debug, info};
use crate::object::{make_reference, Object, Reference};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Shared object of the stress run
struct Payload {
    drops: Arc<AtomicUsize>,
}

impl Object for Payload {}

impl Drop for Payload {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StressReport {
    pub threads: usize,
    pub operations: usize,
    pub destructor_runs: usize,
    pub elapsed_ms: u128,
}

pub fn run_stress(settings: &StressConfig) -> Result<StressReport, String> {
    let drops = Arc::new(AtomicUsize::new(0));
    let root = make_reference(Payload { drops: Arc::clone(&drops) });
    let started = Instant::now();

    crossbeam::scope(|scope| {
        for worker in 0..settings.threads {
            let seed = root.clone();
            let operations = settings.operations;
            scope.spawn(move |_| churn(seed, worker as u64, operations));
        }
    })
    .map_err(|_| "stress worker panicked".to_string())?;

    let remaining = root.reference_count();
    if remaining != 1 {
        return Err(format!("expected 1 outstanding reference, found {}", remaining));
    }
    drop(root);

    let destructor_runs = drops.load(Ordering::SeqCst);
    if destructor_runs != 1 {
        return Err(format!("expected 1 destructor run, found {}", destructor_runs));
    }

    let report = StressReport {
        threads: settings.threads,
        operations: settings.operations,
        destructor_runs,
        elapsed_ms: started.elapsed().as_millis(),
    };
    info!(threads = report.threads, elapsed_ms = report.elapsed_ms as u64, "stress run passed");
    Ok(report)
}

/// Random copy/drop/mint/strengthen operations on a thread-local pool
fn churn(seed: Reference<Payload>, worker: u64, operations: usize) {
    let mut pool = vec![seed];
    let mut state = worker.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;

    for _ in 0..operations {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let pick = (state >> 8) as usize % pool.len();

        match state % 4 {
            0 => pool.push(pool[pick].clone()),
            1 if pool.len() > 1 => drop(pool.swap_remove(pick)),
            2 => {
                let token = pool[pick].mint();
                unsafe { ffi::release(token) };
            }
            _ => {
                let weak = pool[pick].weaken();
                // Safety: `pool` keeps a strong alias alive
                pool.push(unsafe { weak.strengthen() });
            }
        }
    }

    debug!(worker, remaining = pool.len(), "stress worker finished");
}
