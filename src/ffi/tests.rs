//! Tests for the boundary codec

use super::*;
use crate::object::make_reference;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Texture {
    drops: Arc<AtomicUsize>,
}

impl Object for Texture {}

impl Drop for Texture {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

struct Sound;

impl Object for Sound {}

fn texture() -> (Reference<Texture>, Arc<AtomicUsize>) {
    let drops = Arc::new(AtomicUsize::new(0));
    (make_reference(Texture { drops: Arc::clone(&drops) }), drops)
}

#[cfg(test)]
mod codec_tests {
    use super::*;

    #[test]
    fn test_mint_increments() {
        let (a, _) = texture();
        let token = a.mint();
        assert!(!token.is_null());
        assert_eq!(token.as_ptr() as *const c_void, a.as_ptr());
        assert_eq!(a.reference_count(), 2);

        unsafe { release(token) };
        assert_eq!(a.reference_count(), 1);
    }

    #[test]
    fn test_finalizer_scenario() {
        let (a, drops) = texture();
        let token = mint(&a);
        assert_eq!(a.reference_count(), 2);

        unsafe { release(token) };
        assert_eq!(a.reference_count(), 1);
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        drop(a);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_of_last_unit_destroys() {
        let (a, drops) = texture();
        let token = a.mint();
        drop(a);
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert_eq!(unsafe { token_count(token) }, 1);

        unsafe { release(token) };
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reclaim_never_decrements() {
        let (a, _) = texture();
        let token = a.mint();

        let first = unsafe { reclaim::<Texture>(token) };
        let second = unsafe { Reference::<Texture>::reclaim(token) };
        assert_eq!(a.reference_count(), 4);
        assert!(first.ptr_eq(&a));

        drop(first);
        drop(second);
        assert_eq!(a.reference_count(), 2);

        unsafe { Reference::<Texture>::release(token) };
        assert_eq!(a.reference_count(), 1);
    }

    #[test]
    fn test_reclaim_wrong_type_is_null() {
        let (a, _) = texture();
        let token = a.mint();

        let wrong = unsafe { reclaim::<Sound>(token) };
        assert!(wrong.is_null());
        assert_eq!(a.reference_count(), 2);

        let erased = unsafe { reclaim::<dyn Object>(token) };
        assert_eq!(erased.as_ptr(), a.as_ptr());
        drop(erased);

        unsafe { release(token) };
    }

    #[test]
    fn test_null_token() {
        let empty: Reference<Texture> = Reference::null();
        let token = empty.mint();
        assert!(token.is_null());
        assert_eq!(token, Token::NULL);
        assert!(unsafe { reclaim::<Texture>(token) }.is_null());
        unsafe { release(token) };
    }

    #[test]
    fn test_token_word_round_trip() {
        let (a, _) = texture();
        let word = a.mint().as_ptr();
        let token = Token::from_ptr(word);
        assert_eq!(unsafe { token_count(token) }, 2);
        unsafe { release(token) };
        assert_eq!(a.reference_count(), 1);
    }
}

#[cfg(test)]
mod c_api_tests {
    use super::*;

    #[test]
    fn test_retain_release() {
        let (a, drops) = texture();
        let word = a.mint().as_ptr();

        unsafe {
            assert_eq!(euler_token_retain(word), word);
            assert_eq!(euler_token_refcount(word), 3);

            euler_token_release(word);
            euler_token_release(word);
        }

        assert_eq!(a.reference_count(), 1);
        drop(a);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_null_safety() {
        unsafe {
            assert!(euler_token_retain(std::ptr::null_mut()).is_null());
            euler_token_release(std::ptr::null_mut());
            assert_eq!(euler_token_refcount(std::ptr::null()), 0);
        }
    }
}
