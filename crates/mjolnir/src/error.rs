//! Error taxonomy and per-invocation diagnostics.

use crate::command::CommandDescriptor;
use mjolnir_core::GroupKey;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Boxed error type carried by command bodies and fallbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Final disposition of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// The body produced a value.
    RanToCompletion,
    /// The body raised an error.
    Faulted,
    /// The caller's cancellation fired before the body finished.
    Canceled,
    /// The timeout fired before the body finished.
    TimedOut,
    /// The breaker or bulkhead refused admission.
    Rejected,
}

impl CommandStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandStatus::RanToCompletion => "RanToCompletion",
            CommandStatus::Faulted => "Faulted",
            CommandStatus::Canceled => "Canceled",
            CommandStatus::TimedOut => "TimedOut",
            CommandStatus::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The timeout that governed an invocation, as recorded in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutUsed {
    /// A numeric timeout, explicit or configured.
    Millis(u64),
    /// Caller-supplied cancellation governed the call instead.
    Token,
    /// The global ignore-timeouts flag bypassed both.
    Ignored,
}

impl fmt::Display for TimeoutUsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutUsed::Millis(ms) => write!(f, "{ms}"),
            TimeoutUsed::Token => f.write_str("Token"),
            TimeoutUsed::Ignored => f.write_str("Ignored"),
        }
    }
}

/// What happened to the fallback, when one was considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackDisposition {
    /// The command supplied no fallback.
    NotImplemented,
    /// The fallback gate was full; the fallback never ran.
    Rejected,
    /// The fallback ran and failed.
    Failed,
}

impl FallbackDisposition {
    fn as_str(self) -> &'static str {
        match self {
            FallbackDisposition::NotImplemented => "fallback not implemented",
            FallbackDisposition::Rejected => "fallback rejected",
            FallbackDisposition::Failed => "fallback failed",
        }
    }
}

/// Classified failure kinds. Rejections are load shedding and never
/// count as downstream faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandErrorKind {
    /// Programming error: the command instance was invoked twice.
    Reused,
    /// The breaker is open (or the probe slot is taken).
    BreakerRejected,
    /// The bulkhead had no permits.
    BulkheadRejected,
    /// The pool's admission queue was full.
    PoolRejected,
    /// The composed cancellation fired due to timeout.
    TimedOut,
    /// The composed cancellation fired due to the caller's token.
    Canceled,
    /// The body flagged the input as a caller mistake.
    BadRequest,
    /// The body raised any other error.
    Faulted,
}

impl CommandErrorKind {
    /// The invocation status this kind surfaces as.
    pub fn status(self) -> CommandStatus {
        match self {
            CommandErrorKind::Reused | CommandErrorKind::BadRequest | CommandErrorKind::Faulted => {
                CommandStatus::Faulted
            }
            CommandErrorKind::BreakerRejected
            | CommandErrorKind::BulkheadRejected
            | CommandErrorKind::PoolRejected => CommandStatus::Rejected,
            CommandErrorKind::TimedOut => CommandStatus::TimedOut,
            CommandErrorKind::Canceled => CommandStatus::Canceled,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            CommandErrorKind::Reused => "command instance reused",
            CommandErrorKind::BreakerRejected => "breaker rejected",
            CommandErrorKind::BulkheadRejected => "bulkhead rejected",
            CommandErrorKind::PoolRejected => "pool queue rejected",
            CommandErrorKind::TimedOut => "timed out",
            CommandErrorKind::Canceled => "canceled",
            CommandErrorKind::BadRequest => "bad request",
            CommandErrorKind::Faulted => "faulted",
        }
    }
}

/// A classified invocation failure with its diagnostic bag.
///
/// Every failure the invoker surfaces carries the command name, the
/// breaker and bulkhead keys, the timeout that governed the call, and
/// the elapsed time from cancellation composition to classification.
#[derive(Debug)]
pub struct CommandError {
    kind: CommandErrorKind,
    command: Arc<str>,
    breaker_key: GroupKey,
    bulkhead_key: GroupKey,
    timeout_used: TimeoutUsed,
    elapsed: Duration,
    fallback: Option<FallbackDisposition>,
    fallback_error: Option<BoxError>,
    cause: Option<BoxError>,
}

impl CommandError {
    pub(crate) fn new(
        kind: CommandErrorKind,
        descriptor: &CommandDescriptor,
        timeout_used: TimeoutUsed,
        elapsed: Duration,
    ) -> Self {
        Self {
            kind,
            command: descriptor.name_arc(),
            breaker_key: descriptor.breaker_key().clone(),
            bulkhead_key: descriptor.bulkhead_key().clone(),
            timeout_used,
            elapsed,
            fallback: None,
            fallback_error: None,
            cause: None,
        }
    }

    pub(crate) fn with_cause(mut self, cause: BoxError) -> Self {
        self.cause = Some(cause);
        self
    }

    pub(crate) fn with_fallback(mut self, disposition: FallbackDisposition) -> Self {
        self.fallback = Some(disposition);
        self
    }

    pub(crate) fn with_fallback_error(mut self, error: BoxError) -> Self {
        self.fallback = Some(FallbackDisposition::Failed);
        self.fallback_error = Some(error);
        self
    }

    pub fn kind(&self) -> CommandErrorKind {
        self.kind
    }

    pub fn status(&self) -> CommandStatus {
        self.kind.status()
    }

    /// True for breaker, bulkhead, and pool rejections.
    pub fn is_rejection(&self) -> bool {
        self.status() == CommandStatus::Rejected
    }

    /// True for the reuse programming error, which is surfaced as `Err`
    /// by every invocation form.
    pub fn is_programming_error(&self) -> bool {
        self.kind == CommandErrorKind::Reused
    }

    /// The command name, e.g. `my-api.FetchUser`.
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn breaker_key(&self) -> &GroupKey {
        &self.breaker_key
    }

    pub fn bulkhead_key(&self) -> &GroupKey {
        &self.bulkhead_key
    }

    pub fn timeout_used(&self) -> TimeoutUsed {
        self.timeout_used
    }

    /// Time from cancellation composition to classification. Zero for
    /// failures raised before composition (e.g. reuse).
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn fallback_disposition(&self) -> Option<FallbackDisposition> {
        self.fallback
    }

    /// The error raised by the fallback itself, when it ran and failed.
    pub fn fallback_error(&self) -> Option<&BoxError> {
        self.fallback_error.as_ref()
    }

    /// The underlying error raised by the body, when there was one.
    pub fn cause(&self) -> Option<&BoxError> {
        self.cause.as_ref()
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "command {} {}: status={} breaker={} bulkhead={} timeout={} elapsed={}ms",
            self.command,
            self.kind.describe(),
            self.status(),
            self.breaker_key,
            self.bulkhead_key,
            self.timeout_used,
            self.elapsed.as_millis(),
        )?;
        if let Some(disposition) = self.fallback {
            write!(f, " ({})", disposition.as_str())?;
        }
        Ok(())
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

/// Marker wrapper for caller mistakes.
///
/// A body that fails because the *input* was invalid (rather than
/// because the dependency misbehaved) can wrap its error in
/// [`BadRequest`]; the invoker surfaces it as `Faulted` but keeps it out
/// of the breaker's error rate.
#[derive(Debug, Error)]
#[error("bad request: {message}")]
pub struct BadRequest {
    message: String,
    source: Option<BoxError>,
}

impl BadRequest {
    pub fn new(error: impl Into<BoxError>) -> Self {
        let source = error.into();
        Self {
            message: source.to_string(),
            source: Some(source),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }
}
