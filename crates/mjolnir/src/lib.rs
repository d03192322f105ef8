//! Client-side latency and fault isolation.
//!
//! Each risky call against a downstream dependency is wrapped as a
//! one-shot *command* and invoked through a runtime that enforces three
//! protections:
//!
//! - a per-call **timeout** with cooperative cancellation,
//! - a **bulkhead** capping concurrent outstanding calls per dependency,
//! - a **circuit breaker** that trips when the recent error rate passes
//!   a threshold and short-circuits calls until the dependency recovers.
//!
//! ## Basic Example
//!
//! ```rust
//! use mjolnir::{CallTimeout, CommandDescriptor, FnCommand, Mjolnir};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), mjolnir::CommandError> {
//! let runtime = Mjolnir::with_defaults();
//!
//! let mut command = FnCommand::new(
//!     CommandDescriptor::named("FetchUser", "identity", Duration::from_millis(500)),
//!     |_token| async { Ok("user-42") },
//! );
//!
//! let user = runtime.invoke(&mut command, CallTimeout::Configured).await?;
//! assert_eq!(user, "user-42");
//! # Ok(())
//! # }
//! ```
//!
//! ## Result-Carrying Invocation
//!
//! [`Mjolnir::invoke`] surfaces failures as `Err`;
//! [`Mjolnir::invoke_return`] packages them into a [`CommandResult`]
//! instead, so callers can branch on status without unwinding. The one
//! exception either way is the programming error of invoking a command
//! instance twice, which is always an `Err`.
//!
//! ```rust
//! use mjolnir::{CallTimeout, CommandDescriptor, CommandStatus, FnCommand, Mjolnir};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), mjolnir::CommandError> {
//! let runtime = Mjolnir::with_defaults();
//! let mut command = FnCommand::new(
//!     CommandDescriptor::named("Flaky", "reports", Duration::from_secs(1)),
//!     |_token| async { Err::<(), _>("backend unavailable".into()) },
//! );
//!
//! let result = runtime.invoke_return(&mut command, CallTimeout::Configured).await?;
//! assert_eq!(result.status(), CommandStatus::Faulted);
//! assert!(result.error().is_some());
//! # Ok(())
//! # }
//! ```
//!
//! ## Fallbacks
//!
//! A command may carry a fallback, invoked once when the primary path
//! fails or is rejected. Concurrent fallbacks per group are bounded by a
//! gate (`mjolnir.fallback.<key>.maxConcurrent`, default 10).
//!
//! ```rust
//! use mjolnir::{CallTimeout, CommandDescriptor, FnCommand, Mjolnir};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), mjolnir::CommandError> {
//! let runtime = Mjolnir::with_defaults();
//! let mut command = FnCommand::new(
//!     CommandDescriptor::named("Recommend", "reco", Duration::from_millis(250)),
//!     |_token| async { Err::<Vec<u32>, _>("model offline".into()) },
//! )
//! .with_fallback(|| async { Ok(Vec::new()) });
//!
//! let recommendations = runtime.invoke(&mut command, CallTimeout::Configured).await?;
//! assert!(recommendations.is_empty());
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! All thresholds are read through a [`config::ConfigProvider`] on every
//! decision, so they can be retuned (or a breaker force-fixed) at
//! runtime:
//!
//! ```rust
//! use mjolnir::config::{keys, MemoryConfig};
//! use mjolnir::Mjolnir;
//! use mjolnir_core::GroupKey;
//! use std::sync::Arc;
//!
//! let config = Arc::new(MemoryConfig::new());
//! config.set_u64(
//!     keys::breaker(&GroupKey::new("identity"), "thresholdPercent"),
//!     25,
//! );
//! let runtime = Mjolnir::builder().config(config).build();
//! # let _ = runtime;
//! ```
//!
//! ## Observability
//!
//! Breakers and bulkheads emit typed events to listeners registered on
//! the runtime builder, and every invocation pushes
//! `(service, status, value)` lines into the configured
//! [`mjolnir_core::MetricsSink`]. A periodic gauge publisher
//! ([`Mjolnir::spawn_gauge_publisher`]) reports breaker health and pool
//! occupancy.
//!
//! ## Feature Flags
//! - `metrics`: emit counters/gauges through the `metrics` crate
//! - `tracing`: log admission decisions and state transitions via
//!   `tracing`

pub mod breaker;
pub mod bulkhead;
pub mod command;
pub mod config;
pub mod counter;
pub mod error;
pub mod events;
pub mod fallback;
mod gauges;
mod invoker;
pub mod metrics;
mod runtime;

pub use breaker::{BreakerSnapshot, BreakerState, CircuitBreaker};
pub use bulkhead::{Bulkhead, BulkheadPermit, BulkheadRejection, BulkheadVariant};
pub use command::{Command, CommandDescriptor, FnCommand};
pub use config::{ConfigProvider, MemoryConfig};
pub use counter::EventKind;
pub use error::{
    BadRequest, BoxError, CommandError, CommandErrorKind, CommandStatus, FallbackDisposition,
    TimeoutUsed,
};
pub use events::{BreakerEvent, BulkheadEvent};
pub use fallback::{FallbackGate, FallbackPermit};
pub use invoker::{CallTimeout, CommandResult};
pub use self::metrics::CommandMetrics;
pub use runtime::{Mjolnir, MjolnirBuilder};

pub use mjolnir_core::GroupKey;
