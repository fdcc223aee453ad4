use std::time::Duration;

use ns_compiler::CommandDescriptor;
use ns_core::{FallbackAction, RetryStrategy};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::command::{Command, CommandContext, CommandError, CommandOutcome};
use crate::options::timeout_from_secs;

/// How one command execution ended once its policy was applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Succeeded(CommandOutcome),
    /// Failure swallowed by a `Continue` or `UseDefault` fallback.
    Absorbed {
        error: CommandError,
        fallback: FallbackAction,
    },
    Fatal(CommandError),
    Cancelled,
}

impl Resolution {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub resolution: Resolution,
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Timeout, retry and fallback settings resolved for one command.
#[derive(Debug, Clone, PartialEq)]
pub struct ResiliencePolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_strategy: RetryStrategy,
    pub base_delay: Duration,
    pub fallback: FallbackAction,
    pub critical: bool,
}

impl ResiliencePolicy {
    pub fn from_descriptor(
        descriptor: &CommandDescriptor,
        default_timeout: Duration,
        base_delay: Duration,
    ) -> Self {
        let timeout = if descriptor.timeout_secs > 0.0 {
            timeout_from_secs(descriptor.timeout_secs)
        } else {
            default_timeout
        };
        Self {
            timeout,
            max_retries: descriptor.max_retries,
            retry_strategy: descriptor.retry_strategy,
            base_delay,
            fallback: descriptor.fallback,
            critical: descriptor.critical,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        match self.retry_strategy {
            RetryStrategy::None => 1,
            RetryStrategy::Linear | RetryStrategy::Exponential => self.max_retries + 1,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn retry_delay(&self, retry: u32) -> Duration {
        match self.retry_strategy {
            RetryStrategy::None => Duration::ZERO,
            RetryStrategy::Linear => self.base_delay,
            RetryStrategy::Exponential => {
                let factor = 2u32.saturating_pow(retry.saturating_sub(1));
                self.base_delay.saturating_mul(factor)
            }
        }
    }
}

/// Runs `command` under `policy`, racing every attempt and retry delay
/// against `cancel`.
pub async fn execute_with_policy(
    command: &dyn Command,
    context: &mut CommandContext<'_>,
    policy: &ResiliencePolicy,
    cancel: &CancellationToken,
) -> ExecutionReport {
    let started = Instant::now();
    let alias = command.descriptor().alias.clone();
    let script = context.script_name().to_string();
    let line = context.line_index;
    let max_attempts = policy.max_attempts();
    let mut attempts = 0;

    let last_error = loop {
        attempts += 1;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CommandError::Cancelled),
            result = tokio::time::timeout(policy.timeout, command.execute(context, cancel)) => {
                match result {
                    Ok(result) => result,
                    Err(_) => Err(CommandError::Timeout {
                        seconds: policy.timeout.as_secs_f64(),
                    }),
                }
            }
        };

        let error = match result {
            Ok(outcome) => {
                return ExecutionReport {
                    resolution: Resolution::Succeeded(outcome),
                    attempts,
                    elapsed: started.elapsed(),
                };
            }
            Err(error) => error,
        };

        if matches!(error, CommandError::Cancelled) || cancel.is_cancelled() {
            tracing::debug!(script = %script, line, command = %alias, attempt = attempts, "command cancelled");
            return ExecutionReport {
                resolution: Resolution::Cancelled,
                attempts,
                elapsed: started.elapsed(),
            };
        }

        tracing::warn!(
            script = %script,
            line,
            command = %alias,
            attempt = attempts,
            error = %error,
            "command attempt failed"
        );

        if attempts >= max_attempts || !error.is_retryable() {
            break error;
        }

        let delay = policy.retry_delay(attempts);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return ExecutionReport {
                    resolution: Resolution::Cancelled,
                    attempts,
                    elapsed: started.elapsed(),
                };
            }
            _ = tokio::time::sleep(delay) => {}
        }
    };

    let resolution = resolve_failure(last_error, policy);
    match &resolution {
        Resolution::Fatal(error) => tracing::error!(
            script = %script,
            line,
            command = %alias,
            attempt = attempts,
            error = %error,
            "command failed"
        ),
        Resolution::Absorbed { error, fallback } => tracing::warn!(
            script = %script,
            line,
            command = %alias,
            attempt = attempts,
            fallback = ?fallback,
            error = %error,
            "command failure absorbed"
        ),
        _ => {}
    }

    ExecutionReport {
        resolution,
        attempts,
        elapsed: started.elapsed(),
    }
}

fn resolve_failure(error: CommandError, policy: &ResiliencePolicy) -> Resolution {
    if policy.critical {
        return Resolution::Fatal(error);
    }
    match policy.fallback {
        FallbackAction::Continue | FallbackAction::UseDefault => Resolution::Absorbed {
            error,
            fallback: policy.fallback,
        },
        // No outer policy exists above the driving loop, so Retry ends like Abort.
        FallbackAction::Abort | FallbackAction::Retry => Resolution::Fatal(error),
    }
}

#[cfg(test)]
mod resilience_tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::services::ServiceRegistry;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Scripted {
        descriptor: CommandDescriptor,
        calls: AtomicU32,
        succeed_on: Option<u32>,
        hang: bool,
    }

    impl Scripted {
        fn failing(descriptor: CommandDescriptor) -> Self {
            Self {
                descriptor,
                calls: AtomicU32::new(0),
                succeed_on: None,
                hang: false,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Command for Scripted {
        fn descriptor(&self) -> &CommandDescriptor {
            &self.descriptor
        }

        async fn execute(
            &self,
            _context: &mut CommandContext<'_>,
            _cancel: &CancellationToken,
        ) -> Result<CommandOutcome, CommandError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.hang {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.succeed_on == Some(call) {
                return Ok(CommandOutcome::Completed);
            }
            Err(CommandError::failed(format!("attempt {} failed", call)))
        }
    }

    fn descriptor(fallback: FallbackAction) -> CommandDescriptor {
        CommandDescriptor::new("flaky", "test")
            .retry(2, RetryStrategy::Linear)
            .fallback(fallback)
    }

    async fn run(command: &Scripted, cancel: &CancellationToken) -> ExecutionReport {
        run_with_base_delay(command, cancel, Duration::from_millis(250)).await
    }

    async fn run_with_base_delay(
        command: &Scripted,
        cancel: &CancellationToken,
        base_delay: Duration,
    ) -> ExecutionReport {
        let mut execution = ExecutionContext::default();
        execution.load_script("intro", 3);
        let services = ServiceRegistry::new();
        let mut context = CommandContext::new(&mut execution, &services, 0);
        let policy = ResiliencePolicy::from_descriptor(
            command.descriptor(),
            Duration::from_secs(30),
            base_delay,
        );
        execute_with_policy(command, &mut context, &policy, cancel).await
    }

    #[tokio::test(start_paused = true)]
    async fn continue_fallback_absorbs_after_three_attempts() {
        let command = Scripted::failing(descriptor(FallbackAction::Continue));
        let report = run(&command, &CancellationToken::new()).await;
        assert_eq!(command.calls(), 3);
        assert_eq!(report.attempts, 3);
        assert!(matches!(
            report.resolution,
            Resolution::Absorbed {
                fallback: FallbackAction::Continue,
                ..
            }
        ));
        assert!(!report.resolution.is_fatal());
    }

    #[tokio::test(start_paused = true)]
    async fn abort_fallback_is_fatal_after_three_attempts() {
        let command = Scripted::failing(descriptor(FallbackAction::Abort));
        let report = run(&command, &CancellationToken::new()).await;
        assert_eq!(command.calls(), 3);
        assert!(report.resolution.is_fatal());
    }

    #[tokio::test(start_paused = true)]
    async fn critical_command_ignores_lenient_fallback() {
        let command = Scripted::failing(descriptor(FallbackAction::UseDefault).critical());
        let report = run(&command, &CancellationToken::new()).await;
        assert!(report.resolution.is_fatal());
    }

    #[tokio::test(start_paused = true)]
    async fn retry_succeeds_on_later_attempt() {
        let mut command = Scripted::failing(descriptor(FallbackAction::Abort));
        command.succeed_on = Some(2);
        let report = run(&command, &CancellationToken::new()).await;
        assert_eq!(report.resolution, Resolution::Succeeded(CommandOutcome::Completed));
        assert_eq!(report.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_failure() {
        let mut command = Scripted::failing(
            CommandDescriptor::new("slow", "test")
                .timeout(1.0)
                .fallback(FallbackAction::Abort),
        );
        command.hang = true;
        let report = run(&command, &CancellationToken::new()).await;
        assert_eq!(report.attempts, 1);
        assert!(matches!(
            report.resolution,
            Resolution::Fatal(CommandError::Timeout { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_is_not_a_failure() {
        let mut command = Scripted::failing(descriptor(FallbackAction::Abort));
        command.hang = true;
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let report = run(&command, &cancel).await;
        assert_eq!(report.resolution, Resolution::Cancelled);
        assert_eq!(command.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_fallback_is_fatal_once_attempts_run_out() {
        let command = Scripted::failing(descriptor(FallbackAction::Retry));
        let report = run(&command, &CancellationToken::new()).await;
        assert_eq!(command.calls(), 3);
        assert_eq!(report.attempts, 3);
        assert!(matches!(
            report.resolution,
            Resolution::Fatal(CommandError::Failed(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn use_default_fallback_is_absorbed() {
        let command = Scripted::failing(descriptor(FallbackAction::UseDefault));
        let report = run(&command, &CancellationToken::new()).await;
        assert_eq!(report.attempts, 3);
        assert!(matches!(
            report.resolution,
            Resolution::Absorbed {
                fallback: FallbackAction::UseDefault,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn exponential_backoff_waits_between_attempts() {
        let command = Scripted::failing(
            CommandDescriptor::new("flaky", "test")
                .retry(2, RetryStrategy::Exponential)
                .fallback(FallbackAction::Continue),
        );
        let started = Instant::now();
        let report = run_with_base_delay(
            &command,
            &CancellationToken::new(),
            Duration::from_millis(100),
        )
        .await;
        assert_eq!(report.attempts, 3);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(300), "waited {:?}", waited);
        assert!(waited < Duration::from_millis(310), "waited {:?}", waited);
        assert!(report.elapsed <= waited);
    }

    #[test]
    fn retry_delays_follow_strategy() {
        let mut policy = ResiliencePolicy::from_descriptor(
            &CommandDescriptor::new("x", "test").retry(3, RetryStrategy::Exponential),
            Duration::from_secs(30),
            Duration::from_millis(100),
        );
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.retry_delay(1), Duration::from_millis(100));
        assert_eq!(policy.retry_delay(3), Duration::from_millis(400));

        policy.retry_strategy = RetryStrategy::Linear;
        assert_eq!(policy.retry_delay(3), Duration::from_millis(100));

        policy.retry_strategy = RetryStrategy::None;
        assert_eq!(policy.max_attempts(), 1);
    }
}
