//! Property-Based Tests for the Expiry Index
//!
//! # Test Properties
//!
//! 1. **Single Entry**: any sequence of touches leaves exactly one ordered
//!    entry per distinct name
//! 2. **Sweep Prefix**: a sweep removes exactly the names whose last touch
//!    is at least one TTL old, and nothing else

#![cfg(test)]

use std::collections::HashMap;
use std::time::{Duration, Instant};

use proptest::prelude::*;

use super::ExpiryIndex;

const TTL: Duration = Duration::from_secs(100);

// =============================================================================
// Property Strategies
// =============================================================================

/// Touches as (name, offset in seconds from a fixed start)
fn touch_strategy() -> impl Strategy<Value = Vec<(String, u64)>> {
    prop::collection::vec(("[a-f]{1,2}", 0u64..300), 1..200)
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: refresh never leaves stale ordered entries behind.
    #[test]
    fn prop_single_entry_per_name(touches in touch_strategy()) {
        let index = ExpiryIndex::new(TTL);
        let start = Instant::now();
        let mut last: HashMap<String, u64> = HashMap::new();

        for (name, offset) in &touches {
            index.touch_at(name, start + Duration::from_secs(*offset));
            last.insert(name.clone(), *offset);
        }

        prop_assert_eq!(index.len(), last.len());
        prop_assert!(index.verify().is_ok());
        for (name, offset) in &last {
            prop_assert_eq!(
                index.expires_at(name),
                Some(start + Duration::from_secs(*offset) + TTL)
            );
        }
    }

    /// Property: a sweep at `now` evicts exactly the expired names.
    #[test]
    fn prop_sweep_removes_expired_prefix(touches in touch_strategy(), at in 0u64..500) {
        let index = ExpiryIndex::new(TTL);
        let start = Instant::now();
        let mut last: HashMap<String, u64> = HashMap::new();

        for (name, offset) in &touches {
            index.touch_at(name, start + Duration::from_secs(*offset));
            last.insert(name.clone(), *offset);
        }

        let now = start + Duration::from_secs(at);
        let mut swept = index.sweep_expired(now);
        swept.sort();

        let mut expected: Vec<String> = last
            .iter()
            .filter(|(_, offset)| start + Duration::from_secs(**offset) + TTL <= now)
            .map(|(name, _)| name.clone())
            .collect();
        expected.sort();

        prop_assert_eq!(index.len(), last.len() - expected.len());
        prop_assert_eq!(swept, expected);
        prop_assert!(index.verify().is_ok());
    }
}
