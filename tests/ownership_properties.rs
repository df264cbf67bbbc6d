//! Property tests for strong/weak handle counting and the boundary codec

use euler::ffi::{self, Token};
use euler::{make_reference, Object, Reference};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Tracked {
    drops: Arc<AtomicUsize>,
}

impl Object for Tracked {}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

struct Unrelated;

impl Object for Unrelated {}

fn tracked() -> (Reference<Tracked>, Arc<AtomicUsize>) {
    let drops = Arc::new(AtomicUsize::new(0));
    (make_reference(Tracked { drops: Arc::clone(&drops) }), drops)
}

#[derive(Debug, Clone)]
enum Op {
    Clone(usize),
    Drop(usize),
    Move(usize),
    Mint(usize),
    Release(usize),
    Reclaim(usize),
    Strengthen(usize),
    Upcast(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<usize>().prop_map(Op::Clone),
        any::<usize>().prop_map(Op::Drop),
        any::<usize>().prop_map(Op::Move),
        any::<usize>().prop_map(Op::Mint),
        any::<usize>().prop_map(Op::Release),
        any::<usize>().prop_map(Op::Reclaim),
        any::<usize>().prop_map(Op::Strengthen),
        any::<usize>().prop_map(Op::Upcast),
    ]
}

proptest! {
    /// Count always equals live aliases plus outstanding tokens; the object
    /// is destroyed exactly once, when both reach zero.
    #[test]
    fn prop_count_matches_outstanding(ops in prop::collection::vec(op(), 1..200)) {
        let (first, drops) = tracked();
        let mut aliases = vec![first];
        let mut tokens: Vec<Token> = Vec::new();

        for op in ops {
            let outstanding = aliases.len() + tokens.len();
            if outstanding == 0 {
                break;
            }

            match op {
                Op::Clone(i) if !aliases.is_empty() => {
                    let copy = aliases[i % aliases.len()].clone();
                    aliases.push(copy);
                }
                Op::Drop(i) if !aliases.is_empty() => {
                    let index = i % aliases.len();
                    drop(aliases.swap_remove(index));
                }
                Op::Move(i) if !aliases.is_empty() => {
                    let index = i % aliases.len();
                    let moved = aliases.swap_remove(index);
                    aliases.insert(0, moved);
                }
                Op::Mint(i) if !aliases.is_empty() => {
                    tokens.push(aliases[i % aliases.len()].mint());
                }
                Op::Release(i) if !tokens.is_empty() => {
                    let index = i % tokens.len();
                    unsafe { ffi::release(tokens.swap_remove(index)) };
                }
                Op::Reclaim(i) if !tokens.is_empty() => {
                    let token = tokens[i % tokens.len()];
                    aliases.push(unsafe { ffi::reclaim::<Tracked>(token) });
                }
                Op::Strengthen(i) if !aliases.is_empty() => {
                    let weak = aliases[i % aliases.len()].weaken();
                    aliases.push(unsafe { weak.strengthen() });
                }
                Op::Upcast(i) if !aliases.is_empty() => {
                    let index = i % aliases.len();
                    let base = aliases.swap_remove(index).upcast();
                    let narrowed = base.cast_to::<Tracked>();
                    drop(base);
                    aliases.push(narrowed);
                }
                _ => {}
            }

            let expected = aliases.len() + tokens.len();
            if let Some(alias) = aliases.first() {
                prop_assert_eq!(alias.reference_count() as usize, expected);
            } else if let Some(token) = tokens.first() {
                prop_assert_eq!(unsafe { ffi::token_count(*token) } as usize, expected);
            }
            let destroyed = if expected == 0 { 1 } else { 0 };
            prop_assert_eq!(drops.load(Ordering::SeqCst), destroyed);
        }

        drop(aliases);
        for token in tokens {
            unsafe { ffi::release(token) };
        }
        prop_assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    /// A mint followed by its finalizer leaves the count where it was
    #[test]
    fn prop_mint_release_neutral(extra in 0usize..16, rounds in 1usize..32) {
        let (a, drops) = tracked();
        let copies: Vec<_> = (0..extra).map(|_| a.clone()).collect();
        let before = a.reference_count();

        for _ in 0..rounds {
            let token = a.mint();
            prop_assert_eq!(a.reference_count(), before + 1);
            unsafe { ffi::release(token) };
            prop_assert_eq!(a.reference_count(), before);
        }

        drop(copies);
        prop_assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(a);
        prop_assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    /// Reclaim only ever adds; every reclaimed alias subtracts exactly one
    #[test]
    fn prop_reclaim_never_decrements(reclaims in 0usize..32) {
        let (a, _) = tracked();
        let token = a.mint();

        let mut aliases = Vec::new();
        for n in 1..=reclaims {
            aliases.push(unsafe { Reference::<Tracked>::reclaim(token) });
            prop_assert_eq!(a.reference_count() as usize, 2 + n);
        }

        while let Some(alias) = aliases.pop() {
            drop(alias);
            prop_assert_eq!(a.reference_count() as usize, 2 + aliases.len());
        }

        unsafe { ffi::release(token) };
        prop_assert_eq!(a.reference_count(), 1);
    }

    /// Downcasts to the wrong type never touch the count
    #[test]
    fn prop_cast_mismatch_is_inert(attempts in 1usize..16) {
        let (a, _) = tracked();
        let base = a.clone().upcast();

        for _ in 0..attempts {
            prop_assert!(base.cast_to::<Unrelated>().is_null());
        }
        prop_assert_eq!(a.reference_count(), 2);

        let narrowed = base.cast_to::<Tracked>();
        prop_assert!(narrowed.ptr_eq(&a));
        prop_assert_eq!(a.reference_count(), 3);
    }
}

#[test]
fn test_handles_are_one_word() {
    use std::mem::size_of;
    assert_eq!(size_of::<Reference<Tracked>>(), size_of::<*mut ()>());
    assert_eq!(size_of::<Reference<dyn Object>>(), size_of::<*mut ()>());
    assert_eq!(size_of::<Token>(), size_of::<*mut ()>());
}
