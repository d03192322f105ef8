//! Fallback execution, gating, and markers.

use crate::support::{descriptor, failing_command};
use mjolnir::config::{keys, MemoryConfig};
use mjolnir::{
    BoxError, CallTimeout, CommandStatus, FallbackDisposition, FnCommand, Mjolnir,
};
use mjolnir_core::GroupKey;
use std::sync::Arc;

fn failing_with_fallback(group: &str, fallback: Result<bool, &'static str>) -> FnCommand<bool> {
    FnCommand::new(descriptor(group), |_token| async {
        Err(BoxError::from("primary failed"))
    })
    .with_fallback(move || async move { fallback.map_err(BoxError::from) })
}

#[tokio::test]
async fn fallback_success_replaces_the_failure() {
    let runtime = Mjolnir::with_defaults();

    let mut command = failing_with_fallback("fb-ok", Ok(true));
    let value = runtime
        .invoke(&mut command, CallTimeout::Configured)
        .await
        .expect("fallback saved the call");
    assert!(value);
}

#[tokio::test]
async fn missing_fallback_is_marked_not_implemented() {
    let runtime = Mjolnir::with_defaults();

    let mut command = failing_command("fb-none");
    let error = runtime
        .invoke(&mut command, CallTimeout::Configured)
        .await
        .expect_err("no fallback");
    assert_eq!(
        error.fallback_disposition(),
        Some(FallbackDisposition::NotImplemented)
    );
    assert_eq!(error.status(), CommandStatus::Faulted);
}

#[tokio::test]
async fn failed_fallback_preserves_the_original_failure() {
    let runtime = Mjolnir::with_defaults();

    let mut command = failing_with_fallback("fb-fail", Err("fallback also failed"));
    let error = runtime
        .invoke(&mut command, CallTimeout::Configured)
        .await
        .expect_err("both paths failed");

    assert_eq!(
        error.fallback_disposition(),
        Some(FallbackDisposition::Failed)
    );
    assert_eq!(
        error.cause().expect("original cause").to_string(),
        "primary failed"
    );
    assert_eq!(
        error.fallback_error().expect("fallback error").to_string(),
        "fallback also failed"
    );
}

#[tokio::test]
async fn full_gate_rejects_the_fallback_and_surfaces_the_original() {
    let config = Arc::new(MemoryConfig::new());
    config.set_u64(keys::fallback(&GroupKey::new("fb-gated"), "maxConcurrent"), 0);
    let runtime = Mjolnir::builder().config(config).build();

    let mut command = failing_with_fallback("fb-gated", Ok(true));
    let error = runtime
        .invoke(&mut command, CallTimeout::Configured)
        .await
        .expect_err("gate was closed");

    assert_eq!(
        error.fallback_disposition(),
        Some(FallbackDisposition::Rejected)
    );
    assert_eq!(error.status(), CommandStatus::Faulted);
    assert_eq!(
        error.cause().expect("original cause").to_string(),
        "primary failed"
    );
}

#[tokio::test]
async fn fallback_also_covers_rejections() {
    let config = Arc::new(MemoryConfig::new());
    // Saturate instantly: a zero-permit bulkhead.
    config.set_u64(keys::pool(&GroupKey::new("fb-rejected"), "threadCount"), 0);
    let runtime = Mjolnir::builder().config(config).build();

    let mut command = failing_with_fallback("fb-rejected", Ok(true));
    let value = runtime
        .invoke(&mut command, CallTimeout::Configured)
        .await
        .expect("fallback covered the rejection");
    assert!(value);
}
