//! Concurrent copy/drop on shared aliases of one object
//!
//! Run under ThreadSanitizer for the race-detector check:
//! `RUSTFLAGS="-Zsanitizer=thread" cargo +nightly test --test concurrency`

use euler::ffi;
use euler::{make_reference, Object, Reference};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const THREADS: usize = 8;
const OPERATIONS: usize = 10_000;

struct Shared {
    drops: Arc<AtomicUsize>,
    payload: Vec<u64>,
}

impl Object for Shared {}

impl Drop for Shared {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Apply one schedule on a thread-local pool seeded with one alias
fn run_schedule(seed: Reference<Shared>, schedule: &[u8]) -> u64 {
    let mut pool = vec![seed];
    let mut checksum = 0u64;

    for (step, op) in schedule.iter().enumerate() {
        let pick = step % pool.len();
        match op {
            0 => pool.push(pool[pick].clone()),
            1 if pool.len() > 1 => drop(pool.swap_remove(pick)),
            2 => {
                let token = pool[pick].mint();
                let alias = unsafe { ffi::reclaim::<Shared>(token) };
                checksum = checksum.wrapping_add(alias.payload[step % alias.payload.len()]);
                drop(alias);
                unsafe { ffi::release(token) };
            }
            _ => {
                let weak = pool[pick].weaken();
                pool.push(unsafe { weak.strengthen() });
            }
        }
    }

    checksum
}

fn shared() -> (Reference<Shared>, Arc<AtomicUsize>) {
    let drops = Arc::new(AtomicUsize::new(0));
    let root = make_reference(Shared {
        drops: Arc::clone(&drops),
        payload: (0..64).collect(),
    });
    (root, drops)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(4))]

    /// 8 threads x 10,000 random operations: the destructor runs exactly once
    #[test]
    fn prop_destructor_runs_once(
        schedules in prop::collection::vec(prop::collection::vec(0u8..4, OPERATIONS), THREADS)
    ) {
        let (root, drops) = shared();

        crossbeam::scope(|scope| {
            for schedule in &schedules {
                let seed = root.clone();
                scope.spawn(move |_| run_schedule(seed, schedule));
            }
        })
        .unwrap();

        prop_assert_eq!(root.reference_count(), 1);
        prop_assert_eq!(drops.load(Ordering::SeqCst), 0);

        drop(root);
        prop_assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}

/// The root is dropped first, so the last release happens on a worker
#[test]
fn test_last_release_on_worker() {
    let (root, drops) = shared();
    let seeds: Vec<_> = (0..THREADS).map(|_| root.clone()).collect();
    drop(root);

    crossbeam::scope(|scope| {
        for (worker, seed) in seeds.into_iter().enumerate() {
            scope.spawn(move |_| {
                let schedule: Vec<u8> = (0..1000).map(|i| ((i * 7 + worker) % 4) as u8).collect();
                run_schedule(seed, &schedule)
            });
        }
    })
    .unwrap();

    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

/// Tokens minted on one thread and released on another
#[test]
fn test_tokens_cross_threads() {
    let (root, drops) = shared();
    let words: Vec<usize> = (0..THREADS * 100).map(|_| root.mint().as_ptr() as usize).collect();
    assert_eq!(root.reference_count() as usize, 1 + THREADS * 100);

    crossbeam::scope(|scope| {
        for chunk in words.chunks(100) {
            scope.spawn(move |_| {
                for word in chunk {
                    unsafe { ffi::release(ffi::Token::from_ptr(*word as *mut std::ffi::c_void)) };
                }
            });
        }
    })
    .unwrap();

    assert_eq!(root.reference_count(), 1);
    drop(root);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}
