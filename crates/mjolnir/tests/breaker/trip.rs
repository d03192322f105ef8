//! Trip, cooldown, probe, and recovery cycles.

use crate::support::{manual_runtime, run};
use mjolnir::config::{keys, MemoryConfig};
use mjolnir::{
    BoxError, BreakerState, CallTimeout, CommandDescriptor, CommandStatus, FnCommand, Mjolnir,
};
use mjolnir_core::{Clock, GroupKey, ManualClock};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn failed_probe_reopens_and_recovery_needs_another_cooldown() {
    let (clock, runtime) = manual_runtime();
    let group = "trip-cycle";

    for _ in 0..10 {
        assert_eq!(run(&runtime, group, Err("down")).await, CommandStatus::Faulted);
    }
    assert_eq!(run(&runtime, group, Ok(1)).await, CommandStatus::Rejected);

    // First probe fails: straight back to Open.
    clock.advance(10_000);
    assert_eq!(run(&runtime, group, Err("still down")).await, CommandStatus::Faulted);
    assert_eq!(run(&runtime, group, Ok(1)).await, CommandStatus::Rejected);

    // Second probe succeeds: Closed, and traffic flows again.
    clock.advance(10_000);
    assert_eq!(run(&runtime, group, Ok(1)).await, CommandStatus::RanToCompletion);
    assert_eq!(
        runtime.breaker(&GroupKey::new(group)).state(),
        BreakerState::Closed
    );
    assert_eq!(run(&runtime, group, Ok(2)).await, CommandStatus::RanToCompletion);
}

#[tokio::test]
async fn closing_resets_the_window() {
    let (clock, runtime) = manual_runtime();
    let group = "trip-reset";

    for _ in 0..10 {
        let _ = run(&runtime, group, Err("down")).await;
    }
    let _ = run(&runtime, group, Ok(1)).await; // trips
    clock.advance(10_000);
    assert_eq!(run(&runtime, group, Ok(1)).await, CommandStatus::RanToCompletion);

    let breaker = runtime.breaker(&GroupKey::new(group));
    // Only the probe's own success mark may be present.
    assert!(breaker.metrics().total() <= 1);
    assert_eq!(breaker.metrics().error_percent(), 0);
}

#[tokio::test]
async fn short_circuited_calls_do_not_keep_the_breaker_open() {
    let (clock, runtime) = manual_runtime();
    let group = "trip-shortcircuit";

    for _ in 0..10 {
        let _ = run(&runtime, group, Err("down")).await;
    }
    // A pile of rejected calls during the cooldown must not delay
    // recovery: rejections are not failures.
    for _ in 0..25 {
        assert_eq!(run(&runtime, group, Ok(1)).await, CommandStatus::Rejected);
    }

    clock.advance(10_000);
    assert_eq!(run(&runtime, group, Ok(1)).await, CommandStatus::RanToCompletion);
}

#[tokio::test]
async fn canceled_probe_reopens_instead_of_wedging() {
    let (clock, runtime) = manual_runtime();
    let group = "trip-canceled-probe";

    for _ in 0..10 {
        let _ = run(&runtime, group, Err("down")).await;
    }
    let _ = run(&runtime, group, Ok(1)).await; // trips
    clock.advance(10_000);

    // The probe is admitted, then the caller walks away mid-flight.
    let token = CancellationToken::new();
    let mut probe: FnCommand<u32> = FnCommand::new(
        CommandDescriptor::named("Probe", group, Duration::from_millis(500)),
        |_token| async {
            std::future::pending::<()>().await;
            Ok(0)
        },
    );
    let invocation = runtime.invoke_return(&mut probe, CallTimeout::Token(token.clone()));
    let canceller = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    };
    let (result, ()) = tokio::join!(invocation, canceller);
    assert_eq!(
        result.expect("not a programming error").status(),
        CommandStatus::Canceled
    );

    // The slot came back: the breaker is open again, and after another
    // cooldown a fresh probe is admitted and can fix it.
    let breaker = runtime.breaker(&GroupKey::new(group));
    assert_eq!(breaker.state(), BreakerState::Open);
    assert_eq!(run(&runtime, group, Ok(1)).await, CommandStatus::Rejected);

    clock.advance(10_000);
    assert_eq!(run(&runtime, group, Ok(1)).await, CommandStatus::RanToCompletion);
    assert_eq!(breaker.state(), BreakerState::Closed);
}

#[tokio::test]
async fn probe_shed_by_a_nested_command_reopens() {
    let clock = Arc::new(ManualClock::new());
    let config = Arc::new(MemoryConfig::new());
    let inner_key = GroupKey::new("trip-nested-inner");
    config.set_u64(keys::pool(&inner_key, "threadCount"), 0);
    let runtime = Arc::new(
        Mjolnir::builder()
            .clock(Arc::clone(&clock) as Arc<dyn Clock>)
            .config(config)
            .build(),
    );
    let group = "trip-nested-outer";

    for _ in 0..10 {
        let _ = run(&runtime, group, Err("down")).await;
    }
    let _ = run(&runtime, group, Ok(1)).await; // trips
    clock.advance(10_000);

    // The probe's body dispatches a nested command that is load-shed.
    let nested_runtime = Arc::clone(&runtime);
    let mut probe = FnCommand::new(
        CommandDescriptor::named("Probe", group, Duration::from_millis(500)),
        move |_token| async move {
            let mut inner: FnCommand<u32> = FnCommand::new(
                CommandDescriptor::named("Probe", "trip-nested-inner", Duration::from_millis(500)),
                |_token| async { Ok(0) },
            );
            match nested_runtime.invoke(&mut inner, CallTimeout::Configured).await {
                Ok(value) => Ok(value),
                Err(error) => Err(Box::new(error) as BoxError),
            }
        },
    );
    let result = runtime
        .invoke_return(&mut probe, CallTimeout::Configured)
        .await
        .expect("not a programming error");
    assert_eq!(result.status(), CommandStatus::Rejected);

    // The outer breaker released the slot rather than staying half-open.
    let breaker = runtime.breaker(&GroupKey::new(group));
    assert_eq!(breaker.state(), BreakerState::Open);

    clock.advance(10_000);
    assert_eq!(run(&runtime, group, Ok(1)).await, CommandStatus::RanToCompletion);
}

#[tokio::test]
async fn window_aging_forgives_old_failures() {
    let (clock, runtime) = manual_runtime();
    let group = "trip-aging";

    // Nine failures, then the window ages out entirely.
    for _ in 0..9 {
        let _ = run(&runtime, group, Err("flaky")).await;
    }
    clock.advance(11_000);

    // A tenth failure alone is under the minimum-operations floor.
    assert_eq!(run(&runtime, group, Err("flaky")).await, CommandStatus::Faulted);
    assert_eq!(run(&runtime, group, Ok(1)).await, CommandStatus::RanToCompletion);
}
