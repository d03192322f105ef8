//! Tower integration for mjolnir.
//!
//! [`CommandLayer`] wraps any `tower::Service` so that every call is
//! synthesized into a fresh one-shot command and handed to the mjolnir
//! invoker: the call gets the configured timeout, bulkhead admission,
//! and circuit-breaker protection of its group, and failures surface as
//! classified [`CommandError`]s.
//!
//! ## Example
//!
//! ```rust
//! use mjolnir::Mjolnir;
//! use mjolnir_tower::CommandLayer;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tower::{service_fn, Layer, Service};
//!
//! # async fn example() -> Result<(), mjolnir::CommandError> {
//! let runtime = Arc::new(Mjolnir::with_defaults());
//!
//! let layer = CommandLayer::builder(Arc::clone(&runtime), "identity")
//!     .name("FetchUser")
//!     .timeout(Duration::from_millis(500))
//!     .build();
//!
//! let mut service = layer.layer(service_fn(|id: u64| async move {
//!     Ok::<_, std::io::Error>(format!("user-{id}"))
//! }));
//!
//! let user = service.call(42).await?;
//! assert_eq!(user, "user-42");
//! # Ok(())
//! # }
//! ```
//!
//! ## Cancellation forwarding
//!
//! When the request type itself carries a `CancellationToken`, register
//! a token extractor: the invoker then classifies caller cancellation as
//! `Canceled` (never as a breaker failure), and the inner service still
//! sees the token it was handed inside the request. Absent an extractor,
//! the call is governed by the configured timeout alone; the invoker
//! stops driving the inner future once it fires.
//!
//! Under the global `mjolnir.ignoreTimeouts` flag the invoker never
//! cancels, so the inner service observes exactly the caller-supplied
//! token, or nothing at all when the request carries none.

use futures::future::BoxFuture;
use mjolnir::{BoxError, CallTimeout, CommandDescriptor, CommandError, FnCommand, Mjolnir};
use mjolnir_core::GroupKey;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::{Layer, Service, ServiceExt};

type TokenExtractor<Req> = Arc<dyn Fn(&Req) -> Option<CancellationToken> + Send + Sync>;

const DEFAULT_COMMAND_NAME: &str = "Call";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

struct Shared<Req> {
    runtime: Arc<Mjolnir>,
    name: String,
    group: GroupKey,
    breaker_key: Option<GroupKey>,
    bulkhead_key: Option<GroupKey>,
    timeout: Duration,
    extractor: Option<TokenExtractor<Req>>,
}

impl<Req> Shared<Req> {
    fn descriptor(&self) -> CommandDescriptor {
        let mut descriptor =
            CommandDescriptor::named(&self.name, self.group.clone(), self.timeout);
        if let Some(key) = &self.breaker_key {
            descriptor = descriptor.with_breaker_key(key.clone());
        }
        if let Some(key) = &self.bulkhead_key {
            descriptor = descriptor.with_bulkhead_key(key.clone());
        }
        descriptor
    }
}

/// Layer that routes calls on the wrapped service through a mjolnir
/// command per call.
pub struct CommandLayer<Req> {
    shared: Arc<Shared<Req>>,
}

impl<Req> Clone for CommandLayer<Req> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<Req> CommandLayer<Req> {
    /// Returns a builder for a layer over `group` on the given runtime.
    pub fn builder(runtime: Arc<Mjolnir>, group: impl Into<GroupKey>) -> CommandLayerBuilder<Req> {
        CommandLayerBuilder {
            runtime,
            group: group.into(),
            name: None,
            breaker_key: None,
            bulkhead_key: None,
            timeout: DEFAULT_TIMEOUT,
            extractor: None,
        }
    }
}

impl<S, Req> Layer<S> for CommandLayer<Req> {
    type Service = CommandService<S, Req>;

    fn layer(&self, inner: S) -> Self::Service {
        CommandService {
            inner,
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Builder for [`CommandLayer`].
pub struct CommandLayerBuilder<Req> {
    runtime: Arc<Mjolnir>,
    group: GroupKey,
    name: Option<String>,
    breaker_key: Option<GroupKey>,
    bulkhead_key: Option<GroupKey>,
    timeout: Duration,
    extractor: Option<TokenExtractor<Req>>,
}

impl<Req> CommandLayerBuilder<Req> {
    /// Command name for calls through this layer; rendered as
    /// `<group>.<name>`. Default: `Call`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Routes admission through a breaker key other than the group.
    pub fn breaker_key(mut self, key: impl Into<GroupKey>) -> Self {
        self.breaker_key = Some(key.into());
        self
    }

    /// Routes admission through a bulkhead key other than the group.
    pub fn bulkhead_key(mut self, key: impl Into<GroupKey>) -> Self {
        self.bulkhead_key = Some(key.into());
        self
    }

    /// Default timeout for calls through this layer; a
    /// `command.<name>.Timeout` config entry still overrides it.
    /// Default: 1 second.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Extracts a caller-supplied cancellation token from the request.
    pub fn token_extractor<F>(mut self, extractor: F) -> Self
    where
        F: Fn(&Req) -> Option<CancellationToken> + Send + Sync + 'static,
    {
        self.extractor = Some(Arc::new(extractor));
        self
    }

    pub fn build(self) -> CommandLayer<Req> {
        CommandLayer {
            shared: Arc::new(Shared {
                runtime: self.runtime,
                name: self.name.unwrap_or_else(|| DEFAULT_COMMAND_NAME.to_string()),
                group: self.group,
                breaker_key: self.breaker_key,
                bulkhead_key: self.bulkhead_key,
                timeout: self.timeout,
                extractor: self.extractor,
            }),
        }
    }
}

/// A tower service whose calls run as one-shot mjolnir commands.
pub struct CommandService<S, Req> {
    inner: S,
    shared: Arc<Shared<Req>>,
}

impl<S: Clone, Req> Clone for CommandService<S, Req> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S, Req> Service<Req> for CommandService<S, Req>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Into<BoxError> + Send + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = CommandError;
    type Future = BoxFuture<'static, Result<S::Response, CommandError>>;

    // Readiness of the inner service is driven per call (the command
    // body takes a clone through `oneshot`), so the wrapper itself is
    // always ready.
    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let shared = Arc::clone(&self.shared);
        let inner = self.inner.clone();

        Box::pin(async move {
            let caller_token = shared.extractor.as_ref().and_then(|extract| extract(&req));

            let mut command = FnCommand::new(shared.descriptor(), move |_token| async move {
                inner.oneshot(req).await.map_err(Into::into)
            });

            let timeout = match caller_token {
                Some(token) => CallTimeout::Token(token),
                None => CallTimeout::Configured,
            };
            shared.runtime.invoke(&mut command, timeout).await
        })
    }
}
