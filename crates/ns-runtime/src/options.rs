use std::time::Duration;

use ns_compiler::CompileOptions;
use ns_core::NarrativeError;
use serde::{Deserialize, Serialize};

/// Longest timeout any command may be given.
pub const MAX_TIMEOUT_SECS: f64 = 86_400.0;

/// Converts seconds to a timeout, clamped into `[0, MAX_TIMEOUT_SECS]`.
pub(crate) fn timeout_from_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.clamp(0.0, MAX_TIMEOUT_SECS))
        .unwrap_or(Duration::from_secs(MAX_TIMEOUT_SECS as u64))
}

/// What the driving loop does with a command that bound with non-fatal errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BindingErrorPolicy {
    /// Log the errors and execute the command anyway.
    #[default]
    Warn,
    /// Log the errors and skip the line.
    Skip,
    /// Fail the run.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InterpreterOptions {
    pub max_call_stack_depth: usize,
    pub retry_base_delay_ms: u64,
    /// Used for commands whose descriptor declares no timeout.
    pub default_timeout_secs: f64,
    pub playback_speed: f32,
    pub binding_error_policy: BindingErrorPolicy,
    pub allow_bare_aliases: bool,
    pub literal_cache_capacity: usize,
    /// Upper bound on lines advanced by a single `run` call.
    pub max_steps_per_run: u64,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self {
            max_call_stack_depth: 10,
            retry_base_delay_ms: 250,
            default_timeout_secs: 30.0,
            playback_speed: 1.0,
            binding_error_policy: BindingErrorPolicy::Warn,
            allow_bare_aliases: true,
            literal_cache_capacity: 256,
            max_steps_per_run: 100_000,
        }
    }
}

impl InterpreterOptions {
    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            allow_bare_aliases: self.allow_bare_aliases,
            literal_cache_capacity: self.literal_cache_capacity,
        }
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn default_timeout(&self) -> Duration {
        timeout_from_secs(self.default_timeout_secs)
    }

    /// Rejects values the runner would otherwise clamp or ignore.
    pub fn validate(&self) -> Result<(), NarrativeError> {
        if !(self.default_timeout_secs.is_finite()
            && (0.0..=MAX_TIMEOUT_SECS).contains(&self.default_timeout_secs))
        {
            return Err(NarrativeError::new(
                "OPTIONS_INVALID",
                format!(
                    "defaultTimeoutSecs must be between 0 and {}, got {}.",
                    MAX_TIMEOUT_SECS, self.default_timeout_secs
                ),
            ));
        }
        if !(self.playback_speed.is_finite() && self.playback_speed > 0.0) {
            return Err(NarrativeError::new(
                "OPTIONS_INVALID",
                format!("Playback speed must be positive, got {}.", self.playback_speed),
            ));
        }
        Ok(())
    }
}
