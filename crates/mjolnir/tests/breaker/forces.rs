//! Operator overrides and the master switch.

use crate::support::run;
use mjolnir::config::{keys, MemoryConfig};
use mjolnir::{CommandStatus, ConfigProvider, Mjolnir};
use mjolnir_core::GroupKey;
use std::sync::Arc;

#[tokio::test]
async fn force_fixed_admits_regardless_of_health() {
    let config = Arc::new(MemoryConfig::new());
    let key = GroupKey::new("force-fixed");
    config.set_bool(keys::breaker(&key, "forceFixed"), true);
    let runtime = Mjolnir::builder().config(config).build();

    for _ in 0..20 {
        let _ = run(&runtime, "force-fixed", Err("down")).await;
    }
    // A window this unhealthy would normally trip; the override wins.
    assert_eq!(
        run(&runtime, "force-fixed", Ok(1)).await,
        CommandStatus::RanToCompletion
    );
}

#[tokio::test]
async fn force_tripped_rejects_a_healthy_group() {
    let config = Arc::new(MemoryConfig::new());
    let key = GroupKey::new("force-tripped");
    config.set_bool(keys::breaker(&key, "forceTripped"), true);
    let runtime = Mjolnir::builder().config(config).build();

    assert_eq!(
        run(&runtime, "force-tripped", Ok(1)).await,
        CommandStatus::Rejected
    );
}

#[tokio::test]
async fn force_fixed_outranks_force_tripped() {
    let config = Arc::new(MemoryConfig::new());
    let key = GroupKey::new("force-both");
    config.set_bool(keys::breaker(&key, "forceTripped"), true);
    config.set_bool(keys::breaker(&key, "forceFixed"), true);
    let runtime = Mjolnir::builder().config(config).build();

    assert_eq!(
        run(&runtime, "force-both", Ok(1)).await,
        CommandStatus::RanToCompletion
    );
}

#[tokio::test]
async fn overrides_are_hot_reloadable() {
    let config = Arc::new(MemoryConfig::new());
    let key = GroupKey::new("force-flip");
    let runtime = Mjolnir::builder()
        .config(Arc::clone(&config) as Arc<dyn ConfigProvider>)
        .build();

    assert_eq!(run(&runtime, "force-flip", Ok(1)).await, CommandStatus::RanToCompletion);

    config.set_bool(keys::breaker(&key, "forceTripped"), true);
    assert_eq!(run(&runtime, "force-flip", Ok(1)).await, CommandStatus::Rejected);

    config.clear(&keys::breaker(&key, "forceTripped"));
    assert_eq!(run(&runtime, "force-flip", Ok(1)).await, CommandStatus::RanToCompletion);
}

#[tokio::test]
async fn disabled_breakers_never_reject() {
    let config = Arc::new(MemoryConfig::new());
    config.set_bool(keys::USE_CIRCUIT_BREAKERS, false);
    let runtime = Mjolnir::builder().config(config).build();

    for _ in 0..20 {
        let _ = run(&runtime, "switch-off", Err("down")).await;
    }
    assert_eq!(
        run(&runtime, "switch-off", Ok(1)).await,
        CommandStatus::RanToCompletion
    );
}
