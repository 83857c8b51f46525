//! Property-based tests for sequence resolution.

use proptest::prelude::*;

use super::NumberSources;

fn source() -> impl Strategy<Value = Option<u64>> {
    prop::option::of(0u64..100_000_000)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// *For any* combination of sources, the next number exceeds every one of them.
    #[test]
    fn prop_next_exceeds_all_sources(remote in source(), local in source(), counter in source()) {
        let sources = NumberSources { remote_last: remote, local_last: local, counter_last: counter, pending_last: None };
        let next = sources.next();
        for known in [remote, local, counter].into_iter().flatten() {
            prop_assert!(next > known);
        }
        prop_assert!(next >= 1);
    }

    /// *For any* reservation chain, feeding each reserved number back as the
    /// counter yields contiguous numbers.
    #[test]
    fn prop_counter_chain_is_contiguous(remote in source(), count in 1usize..50) {
        let mut sources = NumberSources { remote_last: remote, ..NumberSources::default() };
        let first = sources.next();
        for offset in 0..count as u64 {
            let number = sources.next();
            prop_assert_eq!(number, first + offset);
            sources.counter_last = Some(number);
        }
    }

    /// *For any* counter running ahead, a submission never skips past the
    /// authority's next number.
    #[test]
    fn prop_submission_follows_remote(remote in 0u64..100_000_000, ahead in 0u64..1_000) {
        let sources = NumberSources {
            remote_last: Some(remote),
            local_last: None,
            counter_last: Some(remote + ahead),
            pending_last: None,
        };
        prop_assert_eq!(sources.submission_number(), remote + 1);
    }
}
