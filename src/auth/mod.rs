//! Admission helpers: token validation and connection caps
//!
//! Both endpoints run the same two gates before serving a call: a shared
//! bearer token carried in call metadata, and a cap on concurrent callers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Metadata key carrying the access token
pub const AUTH_TOKEN_HEADER: &str = "x-custom-auth-token";

/// Check call metadata against the configured token
///
/// An empty configured token disables the check. Keys are matched
/// case-insensitively; values byte-for-byte in constant time.
pub fn validate_token(metadata: &[(String, String)], expected: &str) -> bool {
    if expected.is_empty() {
        return true;
    }
    metadata.iter().any(|(key, value)| {
        key.eq_ignore_ascii_case(AUTH_TOKEN_HEADER)
            && constant_time_eq(value.as_bytes(), expected.as_bytes())
    })
}

/// Constant-time byte slice comparison
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Cap on concurrent callers for one endpoint
///
/// Admission takes a slot; the returned guard releases it on drop, so the
/// count returns to its pre-call value on every exit path.
#[derive(Debug)]
pub struct ConnectionSlots {
    active: AtomicUsize,
    limit: usize,
}

impl ConnectionSlots {
    /// Create a cap admitting at most `limit` concurrent callers
    pub fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            active: AtomicUsize::new(0),
            limit,
        })
    }

    /// Try to take a slot; `None` when the endpoint is at capacity
    pub fn try_acquire(self: &Arc<Self>) -> Option<SlotGuard> {
        let result = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if current < self.limit {
                    Some(current + 1)
                } else {
                    None
                }
            });
        match result {
            Ok(_) => Some(SlotGuard {
                slots: Arc::clone(self),
            }),
            Err(_) => None,
        }
    }

    /// Number of currently held slots
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

/// Holds one admission slot; releases it on drop
#[derive(Debug)]
pub struct SlotGuard {
    slots: Arc<ConnectionSlots>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.slots.active.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_token_disables_check() {
        assert!(validate_token(&[], ""));
        assert!(validate_token(&metadata(&[("other", "value")]), ""));
    }

    #[test]
    fn test_token_match() {
        let md = metadata(&[("x-custom-auth-token", "secret")]);
        assert!(validate_token(&md, "secret"));
        assert!(!validate_token(&md, "different"));
    }

    #[test]
    fn test_token_key_case_insensitive() {
        let md = metadata(&[("X-Custom-Auth-Token", "secret")]);
        assert!(validate_token(&md, "secret"));
    }

    #[test]
    fn test_token_value_case_sensitive() {
        let md = metadata(&[("x-custom-auth-token", "SECRET")]);
        assert!(!validate_token(&md, "secret"));
    }

    #[test]
    fn test_missing_token_rejected() {
        assert!(!validate_token(&[], "secret"));
    }

    #[test]
    fn test_slots_enforce_limit() {
        let slots = ConnectionSlots::new(2);

        let first = slots.try_acquire();
        let second = slots.try_acquire();
        assert!(first.is_some());
        assert!(second.is_some());
        assert!(slots.try_acquire().is_none());
        assert_eq!(slots.active(), 2);

        drop(first);
        assert_eq!(slots.active(), 1);
        assert!(slots.try_acquire().is_some());
    }

    #[test]
    fn test_slots_release_on_drop() {
        let slots = ConnectionSlots::new(1);
        {
            let _guard = slots.try_acquire().unwrap();
            assert_eq!(slots.active(), 1);
        }
        assert_eq!(slots.active(), 0);
    }
}
