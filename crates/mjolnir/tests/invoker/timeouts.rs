//! Timeout and cancellation composition.

use crate::support::{descriptor, failing_command, BodyProbe};
use mjolnir::config::{keys, MemoryConfig};
use mjolnir::{BoxError, CallTimeout, CommandStatus, EventKind, FnCommand, Mjolnir, TimeoutUsed};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// A command whose body sleeps far longer than any test timeout.
fn slow_command(group: &str) -> FnCommand<bool> {
    FnCommand::new(descriptor(group), |_token| async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(true)
    })
}

#[tokio::test]
async fn explicit_timeout_classifies_as_timed_out() {
    let runtime = Mjolnir::with_defaults();

    let started = Instant::now();
    let mut command = slow_command("to-explicit");
    let error = runtime
        .invoke(&mut command, CallTimeout::Millis(30))
        .await
        .expect_err("should time out");

    assert_eq!(error.status(), CommandStatus::TimedOut);
    assert_eq!(error.timeout_used(), TimeoutUsed::Millis(30));
    assert!(error.elapsed() >= Duration::from_millis(30));
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "the invoker must not wait out the body"
    );
}

#[tokio::test]
async fn timeout_counts_as_a_breaker_failure() {
    let runtime = Mjolnir::with_defaults();

    let mut command = slow_command("to-marks");
    let _ = runtime.invoke(&mut command, CallTimeout::Millis(10)).await;

    let breaker = runtime.breaker(&"to-marks".into());
    assert_eq!(breaker.metrics().count(EventKind::Timeout), 1);
    assert_eq!(breaker.metrics().error_percent(), 100);
}

#[tokio::test]
async fn caller_cancellation_is_not_a_breaker_failure() {
    let runtime = Arc::new(Mjolnir::with_defaults());
    let token = CancellationToken::new();

    let invocation = {
        let runtime = Arc::clone(&runtime);
        let token = token.clone();
        tokio::spawn(async move {
            let mut command = slow_command("to-cancel");
            runtime.invoke(&mut command, CallTimeout::Token(token)).await
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    token.cancel();

    let error = invocation
        .await
        .expect("join")
        .expect_err("should be canceled");
    assert_eq!(error.status(), CommandStatus::Canceled);
    assert_eq!(error.timeout_used(), TimeoutUsed::Token);

    let breaker = runtime.breaker(&"to-cancel".into());
    assert_eq!(breaker.metrics().total(), 0);
    assert_eq!(breaker.metrics().error_percent(), 0);
}

#[tokio::test]
async fn config_override_beats_the_descriptor_default() {
    let config = Arc::new(MemoryConfig::new());
    config.set_u64(keys::command_timeout("to-config.NoOp"), 25);
    let runtime = Mjolnir::builder().config(config).build();

    let mut command = slow_command("to-config");
    let error = runtime
        .invoke(&mut command, CallTimeout::Configured)
        .await
        .expect_err("should time out");
    assert_eq!(error.timeout_used(), TimeoutUsed::Millis(25));
}

#[tokio::test]
async fn composed_token_fires_on_timeout() {
    let runtime = Mjolnir::with_defaults();
    let observed = BodyProbe::new();

    let probe = observed.clone();
    let mut command: FnCommand<bool> = FnCommand::new(descriptor("to-cooperative"), move |token| {
        // A watcher outliving the body future proves the token is
        // cancelled when the timeout fires.
        tokio::spawn(async move {
            token.cancelled().await;
            probe.mark();
        });
        async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(BoxError::from("unreachable"))
        }
    });

    let error = runtime
        .invoke(&mut command, CallTimeout::Millis(20))
        .await
        .expect_err("should time out");
    assert_eq!(error.status(), CommandStatus::TimedOut);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(observed.ran());
}

#[tokio::test]
async fn ignore_timeouts_bypasses_caller_cancellation_too() {
    let config = Arc::new(MemoryConfig::new());
    config.set_bool(keys::IGNORE_TIMEOUTS, true);
    let runtime = Mjolnir::builder().config(config).build();

    let token = CancellationToken::new();
    token.cancel();

    let probe = BodyProbe::new();
    let marked = probe.clone();
    let mut command = FnCommand::new(descriptor("to-ignore"), move |_token| async move {
        marked.mark();
        Ok(true)
    });

    let value = runtime
        .invoke(&mut command, CallTimeout::Token(token))
        .await
        .expect("cancellation ignored");
    assert!(value);
    assert!(probe.ran());
}

#[tokio::test]
async fn pre_expired_paths_do_not_touch_admission_metrics() {
    let runtime = Mjolnir::with_defaults();

    let mut command = failing_command("to-untouched");
    let _ = runtime.invoke(&mut command, CallTimeout::Millis(0)).await;

    // The breaker was never consulted and nothing was marked.
    let breaker = runtime.breaker(&"to-untouched".into());
    assert_eq!(breaker.metrics().total(), 0);
    assert_eq!(breaker.metrics().count(EventKind::Timeout), 0);
}
