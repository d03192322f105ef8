//! Properties of the rolling counter and metrics facade.

use mjolnir::counter::{EventKind, RollingCounter};
use mjolnir::Mjolnir;
use mjolnir_core::{Clock, GroupKey, ManualClock};
use proptest::prelude::*;
use std::sync::Arc;

fn kind_strategy() -> impl Strategy<Value = EventKind> {
    prop_oneof![
        Just(EventKind::Success),
        Just(EventKind::Failure),
        Just(EventKind::ShortCircuited),
        Just(EventKind::Timeout),
        Just(EventKind::ThreadPoolRejected),
        Just(EventKind::BulkheadRejected),
        Just(EventKind::BadRequest),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every increment whose timestamp lies inside one window span is
    /// visible at a read taken before the window rolls.
    #[test]
    fn counts_inside_the_window_are_exact(
        offsets in prop::collection::vec((0u64..10_000, kind_strategy()), 0..200),
    ) {
        let clock = Arc::new(ManualClock::new());
        let counter = RollingCounter::with_defaults(Arc::clone(&clock) as Arc<dyn Clock>);

        let mut sorted = offsets.clone();
        sorted.sort_by_key(|(at, _)| *at);

        let mut expected = [0u64; 7];
        for (at, kind) in &sorted {
            // Monotonic: the manual clock only moves forward.
            let now = clock.now_millis();
            if *at > now {
                clock.advance(at - now);
            }
            counter.increment(*kind);
            expected[*kind as usize] += 1;
        }

        // Read before anything can age out (the window spans 10 000 ms
        // and every stamp is strictly inside it).
        for kind in EventKind::ALL {
            prop_assert_eq!(counter.count(kind), expected[kind as usize]);
        }
    }

    /// Two full windows later, nothing is left.
    #[test]
    fn everything_ages_out(
        offsets in prop::collection::vec((0u64..10_000, kind_strategy()), 0..100),
    ) {
        let clock = Arc::new(ManualClock::new());
        let counter = RollingCounter::with_defaults(Arc::clone(&clock) as Arc<dyn Clock>);

        let mut sorted = offsets.clone();
        sorted.sort_by_key(|(at, _)| *at);
        for (at, kind) in &sorted {
            let now = clock.now_millis();
            if *at > now {
                clock.advance(at - now);
            }
            counter.increment(*kind);
        }

        clock.advance(20_000);
        for kind in EventKind::ALL {
            prop_assert_eq!(counter.count(kind), 0);
        }
    }

    /// The error rate stays a percentage for any marking sequence.
    #[test]
    fn error_percent_is_bounded(kinds in prop::collection::vec(kind_strategy(), 0..100)) {
        let runtime = Mjolnir::with_defaults();
        let breaker = runtime.breaker(&GroupKey::new("prop-bounds"));
        let metrics = breaker.metrics();

        for kind in &kinds {
            match kind {
                EventKind::Success => metrics.mark_command_success(),
                EventKind::Failure => metrics.mark_command_failure(),
                EventKind::ShortCircuited => metrics.mark_short_circuited(),
                EventKind::Timeout => metrics.mark_command_timeout(),
                EventKind::ThreadPoolRejected => metrics.mark_thread_pool_rejected(),
                EventKind::BulkheadRejected => metrics.mark_bulkhead_rejected(),
                EventKind::BadRequest => metrics.mark_bad_request(),
            }
        }

        prop_assert!(metrics.error_percent() <= 100);
        prop_assert!(metrics.total() <= kinds.len() as u64);
    }
}
