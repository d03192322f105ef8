//! Classification of rejections surfaced by nested commands.

use crate::support::descriptor;
use mjolnir::config::{keys, MemoryConfig};
use mjolnir::{
    BoxError, CallTimeout, CommandErrorKind, CommandStatus, EventKind, FnCommand, Mjolnir,
};
use mjolnir_core::GroupKey;
use std::sync::Arc;

#[tokio::test]
async fn nested_rejection_is_rejected_not_faulted() {
    let config = Arc::new(MemoryConfig::new());
    config.set_u64(keys::pool(&GroupKey::new("inner"), "threadCount"), 0);
    let runtime = Arc::new(Mjolnir::builder().config(config).build());

    let nested_runtime = Arc::clone(&runtime);
    let mut outer = FnCommand::new(descriptor("outer"), move |_token| async move {
        let mut inner = FnCommand::new(descriptor("inner"), |_token| async { Ok(true) });
        match nested_runtime.invoke(&mut inner, CallTimeout::Configured).await {
            Ok(value) => Ok(value),
            Err(error) => Err(Box::new(error) as BoxError),
        }
    });

    let error = runtime
        .invoke(&mut outer, CallTimeout::Configured)
        .await
        .expect_err("inner was load-shed");

    assert_eq!(error.status(), CommandStatus::Rejected);
    assert_eq!(error.kind(), CommandErrorKind::BulkheadRejected);

    // The outer breaker records no fault of its own; the inner bulkhead
    // rejection was accounted against the inner breaker.
    let outer_breaker = runtime.breaker(&"outer".into());
    assert_eq!(outer_breaker.metrics().total(), 0);
    let inner_breaker = runtime.breaker(&"inner".into());
    assert_eq!(inner_breaker.metrics().count(EventKind::BulkheadRejected), 1);
}

#[tokio::test]
async fn nested_fault_still_counts_against_the_outer_breaker() {
    let runtime = Arc::new(Mjolnir::with_defaults());

    let nested_runtime = Arc::clone(&runtime);
    let mut outer = FnCommand::new(descriptor("outer-fault"), move |_token| async move {
        let mut inner: FnCommand<bool> = FnCommand::new(descriptor("inner-fault"), |_token| async {
            Err(BoxError::from("inner blew up"))
        });
        match nested_runtime.invoke(&mut inner, CallTimeout::Configured).await {
            Ok(value) => Ok(value),
            Err(error) => Err(Box::new(error) as BoxError),
        }
    });

    let error = runtime
        .invoke(&mut outer, CallTimeout::Configured)
        .await
        .expect_err("inner fault propagates");
    assert_eq!(error.status(), CommandStatus::Faulted);

    let outer_breaker = runtime.breaker(&"outer-fault".into());
    assert_eq!(outer_breaker.metrics().count(EventKind::Failure), 1);
}
