//! Invocation orchestration.
//!
//! The invoker is the only place outcomes are classified. One invocation
//! walks: single-use guard, timeout resolution, cancellation
//! composition, breaker and bulkhead admission, body execution under the
//! composed token, classification and metric marks, optional fallback,
//! and finally the caller-facing surface.

use crate::bulkhead::BulkheadRejection;
use crate::command::Command;
use crate::config::keys;
use crate::error::{
    BadRequest, BoxError, CommandError, CommandErrorKind, CommandStatus, FallbackDisposition,
    TimeoutUsed,
};
use crate::runtime::Mjolnir;
use mjolnir_core::GroupKey;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::runtime::RuntimeFlavor;
use tokio_util::sync::CancellationToken;

/// Timeout argument accepted by the invocation forms.
#[derive(Debug, Clone)]
pub enum CallTimeout {
    /// Use `command.<name>.Timeout` when configured, else the
    /// descriptor's default.
    Configured,
    /// Explicit millisecond budget; `0` means "already expired" and the
    /// body never runs.
    Millis(u64),
    /// Caller-supplied cancellation governs the call instead of a
    /// timeout.
    Token(CancellationToken),
}

/// The outcome of one invocation: a value, or a classified failure with
/// its diagnostics.
pub struct CommandResult<T> {
    outcome: Outcome<T>,
}

enum Outcome<T> {
    Completed(T),
    Failed(CommandError),
}

impl<T> CommandResult<T> {
    fn completed(value: T) -> Self {
        Self {
            outcome: Outcome::Completed(value),
        }
    }

    fn failed(error: CommandError) -> Self {
        Self {
            outcome: Outcome::Failed(error),
        }
    }

    pub fn status(&self) -> CommandStatus {
        match &self.outcome {
            Outcome::Completed(_) => CommandStatus::RanToCompletion,
            Outcome::Failed(error) => error.status(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Completed(_))
    }

    pub fn value(&self) -> Option<&T> {
        match &self.outcome {
            Outcome::Completed(value) => Some(value),
            Outcome::Failed(_) => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self.outcome {
            Outcome::Completed(value) => Some(value),
            Outcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&CommandError> {
        match &self.outcome {
            Outcome::Completed(_) => None,
            Outcome::Failed(error) => Some(error),
        }
    }

    pub fn into_result(self) -> Result<T, CommandError> {
        match self.outcome {
            Outcome::Completed(value) => Ok(value),
            Outcome::Failed(error) => Err(error),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for CommandResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Outcome::Completed(value) => f
                .debug_struct("CommandResult")
                .field("status", &CommandStatus::RanToCompletion)
                .field("value", value)
                .finish(),
            Outcome::Failed(error) => f
                .debug_struct("CommandResult")
                .field("status", &error.status())
                .field("error", error)
                .finish(),
        }
    }
}

enum Verdict<T> {
    Body(Result<T, BoxError>),
    TimedOut,
    Canceled,
}

impl Mjolnir {
    /// Invokes `command`, surfacing any non-success as `Err`.
    ///
    /// This is the throw-on-failure form; [`invoke_return`] is the
    /// result-carrying form. Both run the same pipeline.
    ///
    /// [`invoke_return`]: Mjolnir::invoke_return
    pub async fn invoke<C: Command>(
        &self,
        command: &mut C,
        timeout: CallTimeout,
    ) -> Result<C::Output, CommandError> {
        self.invoke_return(command, timeout).await?.into_result()
    }

    /// Invokes `command`, packaging any non-success into the returned
    /// [`CommandResult`] instead of `Err`.
    ///
    /// The only failure still surfaced as `Err` is the programming
    /// error: invoking a command instance twice.
    pub async fn invoke_return<C: Command>(
        &self,
        command: &mut C,
        timeout: CallTimeout,
    ) -> Result<CommandResult<C::Output>, CommandError> {
        // Single-use guard. This is the one failure that ignores the
        // result-carrying surface.
        let descriptor = command.descriptor();
        let name = descriptor.name_arc();
        let group = descriptor.group().clone();
        let breaker_key = descriptor.breaker_key().clone();
        let bulkhead_key = descriptor.bulkhead_key().clone();
        let default_timeout = descriptor.default_timeout();

        if !descriptor.try_claim() {
            let claimed_timeout = match &timeout {
                CallTimeout::Millis(ms) => TimeoutUsed::Millis(*ms),
                CallTimeout::Token(_) => TimeoutUsed::Token,
                CallTimeout::Configured => {
                    TimeoutUsed::Millis(default_timeout.as_millis() as u64)
                }
            };
            return Err(CommandError::new(
                CommandErrorKind::Reused,
                descriptor,
                claimed_timeout,
                Duration::ZERO,
            ));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(command = %name, breaker = %breaker_key, bulkhead = %bulkhead_key, "invoking command");

        // Effective timeout and cancellation composition.
        let ignore_timeouts = self
            .config()
            .get_bool(keys::IGNORE_TIMEOUTS)
            .unwrap_or(false);
        let started = Instant::now();

        let (caller_token, deadline_millis, timeout_used) = match timeout {
            CallTimeout::Token(token) => (Some(token), None, TimeoutUsed::Token),
            CallTimeout::Millis(ms) => (None, Some(ms), TimeoutUsed::Millis(ms)),
            CallTimeout::Configured => {
                let ms = self
                    .config()
                    .get_u64(&keys::command_timeout(&name))
                    .unwrap_or(default_timeout.as_millis() as u64);
                (None, Some(ms), TimeoutUsed::Millis(ms))
            }
        };
        let (deadline_millis, timeout_used) = if ignore_timeouts {
            (None, TimeoutUsed::Ignored)
        } else {
            (deadline_millis, timeout_used)
        };

        // Already expired or already canceled: classify without
        // consulting the breaker or bulkhead, and without running the
        // body.
        if !ignore_timeouts {
            if deadline_millis == Some(0) {
                let elapsed = started.elapsed();
                self.emit_execute(&name, CommandStatus::TimedOut, elapsed);
                let error = CommandError::new(
                    CommandErrorKind::TimedOut,
                    command.descriptor(),
                    timeout_used,
                    elapsed,
                );
                return Ok(self.conclude(command, &group, error).await);
            }
            if caller_token
                .as_ref()
                .is_some_and(CancellationToken::is_cancelled)
            {
                let elapsed = started.elapsed();
                self.emit_execute(&name, CommandStatus::Canceled, elapsed);
                let error = CommandError::new(
                    CommandErrorKind::Canceled,
                    command.descriptor(),
                    timeout_used,
                    elapsed,
                );
                return Ok(self.conclude(command, &group, error).await);
            }
        }

        // Admission: breaker first, then bulkhead. Neither rejection is
        // a downstream fault, so neither marks a failure.
        let breaker = self.breaker(&breaker_key);
        let breakers_enabled = self
            .config()
            .get_bool(keys::USE_CIRCUIT_BREAKERS)
            .unwrap_or(true);
        if breakers_enabled {
            let allowed = breaker.is_allowing();
            self.sink().event(
                &format!("mjolnir breaker {breaker_key} IsAllowing"),
                if allowed { "Allowed" } else { "Rejected" },
                None,
            );
            if !allowed {
                breaker.metrics().mark_short_circuited();
                let elapsed = started.elapsed();
                self.emit_execute(&name, CommandStatus::Rejected, elapsed);
                let error = CommandError::new(
                    CommandErrorKind::BreakerRejected,
                    command.descriptor(),
                    timeout_used,
                    elapsed,
                );
                return Ok(self.conclude(command, &group, error).await);
            }
        }

        let bulkhead = self.bulkhead(&bulkhead_key);
        let permit = match bulkhead.admit().await {
            Ok(permit) => permit,
            Err(rejection) => {
                let kind = match &rejection {
                    BulkheadRejection::Saturated { .. } => {
                        breaker.metrics().mark_bulkhead_rejected();
                        CommandErrorKind::BulkheadRejected
                    }
                    BulkheadRejection::QueueFull { .. } => {
                        breaker.metrics().mark_thread_pool_rejected();
                        CommandErrorKind::PoolRejected
                    }
                };
                let elapsed = started.elapsed();
                self.emit_execute(&name, CommandStatus::Rejected, elapsed);
                let error =
                    CommandError::new(kind, command.descriptor(), timeout_used, elapsed)
                        .with_cause(Box::new(rejection));
                return Ok(self.conclude(command, &group, error).await);
            }
        };

        // Execution under the composed token. The composed token is a
        // child of the caller's (when one was supplied) and is cancelled
        // exactly once, by the timeout arm.
        let composed = match &caller_token {
            Some(token) => token.child_token(),
            None => CancellationToken::new(),
        };
        let mut body = command.execute(composed.clone());

        let verdict: Verdict<C::Output> = if ignore_timeouts {
            Verdict::Body((&mut body).await)
        } else {
            match deadline_millis {
                Some(ms) => {
                    let deadline = tokio::time::sleep(Duration::from_millis(ms));
                    tokio::pin!(deadline);
                    tokio::select! {
                        biased;
                        result = &mut body => Verdict::Body(result),
                        _ = composed.cancelled() => Verdict::Canceled,
                        () = &mut deadline => {
                            composed.cancel();
                            Verdict::TimedOut
                        }
                    }
                }
                None => {
                    tokio::select! {
                        biased;
                        result = &mut body => Verdict::Body(result),
                        _ = composed.cancelled() => Verdict::Canceled,
                    }
                }
            }
        };
        drop(body);
        drop(permit);

        // Classification.
        let elapsed = started.elapsed();
        let (kind, cause): (CommandErrorKind, Option<BoxError>) = match verdict {
            Verdict::Body(Ok(value)) => {
                breaker.metrics().mark_command_success();
                breaker.mark_success(elapsed);
                self.emit_execute(&name, CommandStatus::RanToCompletion, elapsed);
                return Ok(CommandResult::completed(value));
            }
            Verdict::TimedOut => {
                breaker.metrics().mark_command_timeout();
                breaker.mark_failure();
                (CommandErrorKind::TimedOut, None)
            }
            Verdict::Canceled => {
                // Not a downstream fault, but if this call held the
                // probe slot the breaker must get it back.
                breaker.release_probe();
                (CommandErrorKind::Canceled, None)
            }
            Verdict::Body(Err(error)) => {
                let nested_rejection = error
                    .downcast_ref::<CommandError>()
                    .filter(|nested| nested.is_rejection())
                    .map(CommandError::kind);
                if let Some(nested_kind) = nested_rejection {
                    // A nested command was load-shed; its own breaker
                    // already accounted for it. Any probe slot this
                    // call held is released without a verdict.
                    breaker.release_probe();
                    (nested_kind, Some(error))
                } else if error.is::<BadRequest>() {
                    // Caller mistakes say nothing about the dependency,
                    // so a bad-request probe is unresolved too.
                    breaker.metrics().mark_bad_request();
                    breaker.release_probe();
                    (CommandErrorKind::BadRequest, Some(error))
                } else {
                    breaker.metrics().mark_command_failure();
                    breaker.mark_failure();
                    (CommandErrorKind::Faulted, Some(error))
                }
            }
        };

        self.emit_execute(&name, kind.status(), elapsed);
        let mut error = CommandError::new(kind, command.descriptor(), timeout_used, elapsed);
        if let Some(cause) = cause {
            error = error.with_cause(cause);
        }
        Ok(self.conclude(command, &group, error).await)
    }

    /// Blocking adapter over [`invoke`](Mjolnir::invoke).
    ///
    /// Canonical semantics are the asynchronous form; this blocks the
    /// calling thread on it, using the ambient multithreaded runtime
    /// when present and an owned fallback runtime otherwise.
    pub fn invoke_blocking<C: Command>(
        &self,
        command: &mut C,
        timeout: CallTimeout,
    ) -> Result<C::Output, CommandError> {
        self.block_on(self.invoke(command, timeout))
    }

    /// Blocking adapter over [`invoke_return`](Mjolnir::invoke_return).
    pub fn invoke_return_blocking<C: Command>(
        &self,
        command: &mut C,
        timeout: CallTimeout,
    ) -> Result<CommandResult<C::Output>, CommandError> {
        self.block_on(self.invoke_return(command, timeout))
    }

    fn block_on<F>(&self, future: F) -> F::Output
    where
        F: std::future::Future + Send,
        F::Output: Send,
    {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(future))
            }
            // No runtime, or a current-thread runtime we must not block
            // from within: drive the future on the owned runtime from a
            // scoped thread.
            _ => std::thread::scope(|scope| {
                match scope
                    .spawn(|| self.fallback_runtime().block_on(future))
                    .join()
                {
                    Ok(output) => output,
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }),
        }
    }

    /// Fallback tail shared by every failure path: consult the command's
    /// fallback, bound it by the group's gate, and fold the outcome into
    /// the final result.
    async fn conclude<C: Command>(
        &self,
        command: &mut C,
        group: &GroupKey,
        error: CommandError,
    ) -> CommandResult<C::Output> {
        let Some(fallback) = command.fallback(&error) else {
            return CommandResult::failed(error.with_fallback(FallbackDisposition::NotImplemented));
        };

        let gate = self.fallback_gate(group);
        let Some(_slot) = gate.try_acquire() else {
            #[cfg(feature = "tracing")]
            tracing::warn!(command = %error.command(), "fallback gate full, surfacing original failure");
            return CommandResult::failed(error.with_fallback(FallbackDisposition::Rejected));
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(command = %error.command(), "running fallback");

        match fallback.await {
            Ok(value) => CommandResult::completed(value),
            Err(fallback_error) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(command = %error.command(), "fallback failed");
                CommandResult::failed(error.with_fallback_error(fallback_error))
            }
        }
    }

    fn emit_execute(&self, name: &str, status: CommandStatus, elapsed: Duration) {
        self.sink().event(
            &format!("mjolnir command {name} execute"),
            status.as_str(),
            Some(elapsed.as_millis() as i64),
        );

        #[cfg(feature = "metrics")]
        metrics::counter!(
            "mjolnir_commands_total",
            "command" => name.to_string(),
            "status" => status.as_str()
        )
        .increment(1);
    }
}
