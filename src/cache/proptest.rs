//! Property-Based Tests for the LRU Core
//!
//! # Test Properties
//!
//! 1. **Eviction Bound**: accounted bytes never exceed a non-zero budget
//! 2. **Accounting**: accounted bytes equal the sum over live entries
//! 3. **Recency**: the most recently written key is the head of the list

#![cfg(test)]

use proptest::prelude::*;

use super::byteview::ByteView;
use super::lru::LruCache;

// =============================================================================
// Property Strategies
// =============================================================================

/// Short keys from a small alphabet so that replacements actually happen.
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-f]{1,3}"
}

fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..64)
}

fn ops_strategy() -> impl Strategy<Value = Vec<(String, Vec<u8>)>> {
    prop::collection::vec((key_strategy(), value_strategy()), 1..200)
}

fn accounted(lru: &LruCache<ByteView>) -> u64 {
    lru.keys()
        .iter()
        .map(|k| (k.len() + lru.peek(k).map_or(0, |v| v.len())) as u64)
        .sum()
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: after every add, accounted bytes stay within the budget.
    #[test]
    fn prop_eviction_bound(budget in 1u64..512, ops in ops_strategy()) {
        let mut lru = LruCache::new(budget, None);
        for (key, value) in ops {
            lru.add(key, ByteView::from(value));
            prop_assert!(lru.bytes() <= budget);
        }
    }

    /// Property: the running counter matches a recount over live entries.
    #[test]
    fn prop_accounting_matches_contents(budget in 0u64..512, ops in ops_strategy()) {
        let mut lru = LruCache::new(budget, None);
        for (key, value) in ops {
            lru.add(key, ByteView::from(value));
            prop_assert_eq!(lru.bytes(), accounted(&lru));
            prop_assert_eq!(lru.keys().len(), lru.len());
        }
    }

    /// Property: with an unbounded store the last written key is the MRU head.
    #[test]
    fn prop_last_write_is_most_recent(ops in ops_strategy()) {
        let mut lru = LruCache::new(0, None);
        let mut last = String::new();
        for (key, value) in ops {
            last = key.clone();
            lru.add(key, ByteView::from(value));
        }
        prop_assert_eq!(lru.keys().first().cloned(), Some(last));
    }
}
