//! Command descriptors and the command trait.

use crate::error::{BoxError, CommandError};
use futures::future::BoxFuture;
use mjolnir_core::GroupKey;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Cache of derived command names, keyed by (name source, group).
///
/// Name derivation walks type paths and rewrites the group; commands are
/// constructed per call, so the derived string is computed once per
/// (type or provided name) × group and shared from here.
fn name_cache() -> &'static Mutex<HashMap<(String, GroupKey), Arc<str>>> {
    static CACHE: OnceLock<Mutex<HashMap<(String, GroupKey), Arc<str>>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

fn cached_name(source: &str, group: &GroupKey) -> Arc<str> {
    let mut cache = name_cache().lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(name) = cache.get(&(source.to_string(), group.clone())) {
        return Arc::clone(name);
    }
    let rendered: Arc<str> = format!("{}.{}", group.as_str().replace('.', "-"), source).into();
    cache.insert((source.to_string(), group.clone()), Arc::clone(&rendered));
    rendered
}

/// Last path segment of a type name, generics stripped, with a trailing
/// `Command` suffix removed when something is left over.
fn type_name_stem<C: ?Sized>() -> &'static str {
    let full = std::any::type_name::<C>();
    let no_generics = full.split('<').next().unwrap_or(full);
    let stem = no_generics.rsplit("::").next().unwrap_or(no_generics);
    match stem.strip_suffix("Command") {
        Some(trimmed) if !trimmed.is_empty() => trimmed,
        _ => stem,
    }
}

/// Immutable per-command metadata.
///
/// Built once when the command is constructed and consumed by the
/// invoker: the derived name, the group, the breaker and bulkhead keys
/// (the group by default), the default timeout, and the single-use flag.
///
/// # Panics
///
/// Construction panics on a zero default timeout; that is a programming
/// error at the call site, not a runtime condition.
pub struct CommandDescriptor {
    name: Arc<str>,
    group: GroupKey,
    breaker_key: GroupKey,
    bulkhead_key: GroupKey,
    default_timeout: Duration,
    invoked: AtomicBool,
}

impl CommandDescriptor {
    /// Descriptor whose name is derived from the type `C`.
    ///
    /// The name is `<group with dots replaced by dashes>.<type name
    /// without a Command suffix>`: type `FetchUserCommand` in group
    /// `my.api` becomes `my-api.FetchUser`.
    pub fn for_type<C: ?Sized>(group: impl Into<GroupKey>, default_timeout: Duration) -> Self {
        let group = group.into();
        Self::build(cached_name(type_name_stem::<C>(), &group), group, default_timeout)
    }

    /// Descriptor with an explicitly supplied name.
    ///
    /// The rendered name is still prefixed with the dash-rewritten
    /// group: `named("NoOp", "test", …)` yields `test.NoOp`.
    pub fn named(
        name: &str,
        group: impl Into<GroupKey>,
        default_timeout: Duration,
    ) -> Self {
        let group = group.into();
        Self::build(cached_name(name, &group), group, default_timeout)
    }

    fn build(name: Arc<str>, group: GroupKey, default_timeout: Duration) -> Self {
        assert!(
            default_timeout > Duration::ZERO,
            "default timeout must be positive (command {name})"
        );
        Self {
            name,
            breaker_key: group.clone(),
            bulkhead_key: group.clone(),
            group,
            default_timeout,
            invoked: AtomicBool::new(false),
        }
    }

    /// Routes this command's admission through a different breaker key.
    pub fn with_breaker_key(mut self, key: impl Into<GroupKey>) -> Self {
        self.breaker_key = key.into();
        self
    }

    /// Routes this command's admission through a different bulkhead key.
    pub fn with_bulkhead_key(mut self, key: impl Into<GroupKey>) -> Self {
        self.bulkhead_key = key.into();
        self
    }

    /// The rendered command name, e.g. `my-api.FetchUser`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub fn group(&self) -> &GroupKey {
        &self.group
    }

    pub fn breaker_key(&self) -> &GroupKey {
        &self.breaker_key
    }

    pub fn bulkhead_key(&self) -> &GroupKey {
        &self.bulkhead_key
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Flips the single-use flag; false means it was already claimed.
    pub(crate) fn try_claim(&self) -> bool {
        !self.invoked.swap(true, Ordering::AcqRel)
    }
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("name", &self.name)
            .field("group", &self.group)
            .field("breaker_key", &self.breaker_key)
            .field("bulkhead_key", &self.bulkhead_key)
            .field("default_timeout", &self.default_timeout)
            .field("invoked", &self.invoked.load(Ordering::Relaxed))
            .finish()
    }
}

/// A one-shot unit of work against a protected dependency.
///
/// The invoker calls [`execute`](Command::execute) at most once, under a
/// composed cancellation token that fires when the effective timeout
/// elapses or the caller cancels. Bodies should honor the token at their
/// await points; the invoker additionally stops driving the body future
/// once the token fires.
///
/// [`fallback`](Command::fallback) is consulted when the invocation does
/// not run to completion; returning `None` (the default) means no
/// fallback is implemented and the original failure stands.
pub trait Command: Send {
    type Output: Send + 'static;

    fn descriptor(&self) -> &CommandDescriptor;

    fn execute(
        &mut self,
        token: CancellationToken,
    ) -> BoxFuture<'static, Result<Self::Output, BoxError>>;

    fn fallback(
        &mut self,
        cause: &CommandError,
    ) -> Option<BoxFuture<'static, Result<Self::Output, BoxError>>> {
        let _ = cause;
        None
    }
}

type BoxedBody<T> =
    Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, Result<T, BoxError>> + Send>;
type BoxedFallback<T> = Box<dyn FnOnce() -> BoxFuture<'static, Result<T, BoxError>> + Send>;

/// A [`Command`] built from a closure, for call sites that don't want a
/// dedicated type.
///
/// ```
/// use mjolnir::{Command, CommandDescriptor, FnCommand};
/// use std::time::Duration;
///
/// let command = FnCommand::new(
///     CommandDescriptor::named("Ping", "edge", Duration::from_millis(200)),
///     |_token| async { Ok("pong") },
/// );
/// assert_eq!(command.descriptor().name(), "edge.Ping");
/// ```
pub struct FnCommand<T> {
    descriptor: CommandDescriptor,
    body: Option<BoxedBody<T>>,
    fallback: Option<BoxedFallback<T>>,
}

impl<T: Send + 'static> FnCommand<T> {
    pub fn new<F, Fut>(descriptor: CommandDescriptor, body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        Self {
            descriptor,
            body: Some(Box::new(move |token| Box::pin(body(token)))),
            fallback: None,
        }
    }

    /// Attaches a fallback invoked when the primary path fails.
    pub fn with_fallback<G, Fut>(mut self, fallback: G) -> Self
    where
        G: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        self.fallback = Some(Box::new(move || Box::pin(fallback())));
        self
    }
}

impl<T: Send + 'static> Command for FnCommand<T> {
    type Output = T;

    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    fn execute(&mut self, token: CancellationToken) -> BoxFuture<'static, Result<T, BoxError>> {
        match self.body.take() {
            Some(body) => body(token),
            // The invoker's single-use guard fires first; this is a
            // second line of defense for direct trait misuse.
            None => Box::pin(async { Err(BoxError::from("command body already consumed")) }),
        }
    }

    fn fallback(
        &mut self,
        _cause: &CommandError,
    ) -> Option<BoxFuture<'static, Result<T, BoxError>>> {
        self.fallback.take().map(|fallback| fallback())
    }
}
