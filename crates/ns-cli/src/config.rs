use std::fs;
use std::path::Path;

use ns_core::NarrativeError;
use ns_runtime::InterpreterOptions;

use crate::{map_cli_config_invalid, map_cli_config_read, RunArgs};

/// Interpreter options from `--config`, with explicit flags laid over them.
pub(crate) fn load_interpreter_options(args: &RunArgs) -> Result<InterpreterOptions, NarrativeError> {
    let mut options = match &args.config {
        Some(path) => read_options_file(Path::new(path))?,
        None => InterpreterOptions::default(),
    };
    if let Some(speed) = args.speed {
        if !(speed.is_finite() && speed > 0.0) {
            return Err(NarrativeError::new(
                "CLI_CONFIG_INVALID",
                format!("Playback speed must be positive, got {}.", speed),
            ));
        }
        options.playback_speed = speed;
    }
    Ok(options)
}

fn read_options_file(path: &Path) -> Result<InterpreterOptions, NarrativeError> {
    if !path.exists() {
        return Err(NarrativeError::new(
            "CLI_CONFIG_NOT_FOUND",
            format!("Config file does not exist: {}", path.display()),
        ));
    }
    let raw = fs::read_to_string(path).map_err(map_cli_config_read)?;
    let options: InterpreterOptions =
        serde_json::from_str(&raw).map_err(map_cli_config_invalid)?;
    options
        .validate()
        .map_err(|error| NarrativeError::new("CLI_CONFIG_INVALID", error.message))?;
    Ok(options)
}

#[cfg(test)]
mod config_tests {
    use super::*;
    use crate::cli_test_support::*;
    use ns_runtime::BindingErrorPolicy;

    fn args(config: Option<String>, speed: Option<f32>) -> RunArgs {
        RunArgs {
            script: None,
            entry_script: None,
            state_in: None,
            state_out: None,
            config,
            breakpoints: Vec::new(),
            speed,
            strict: false,
        }
    }

    #[test]
    fn defaults_without_config() {
        let options = load_interpreter_options(&args(None, None)).expect("options");
        assert_eq!(options, InterpreterOptions::default());
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let path = temp_path("config").join("options.json");
        write_file(
            &path,
            r#"{"bindingErrorPolicy":"abort","maxCallStackDepth":4}"#,
        );
        let options =
            load_interpreter_options(&args(Some(path.to_string_lossy().to_string()), Some(2.0)))
                .expect("options");
        assert_eq!(options.binding_error_policy, BindingErrorPolicy::Abort);
        assert_eq!(options.max_call_stack_depth, 4);
        assert_eq!(options.playback_speed, 2.0);
        assert_eq!(options.retry_base_delay_ms, 250);
    }

    #[test]
    fn config_errors_are_mapped() {
        let missing = temp_path("config-missing").join("options.json");
        let error = load_interpreter_options(&args(Some(missing.to_string_lossy().to_string()), None))
            .expect_err("missing");
        assert_eq!(error.code, "CLI_CONFIG_NOT_FOUND");

        let broken = temp_path("config-broken").join("options.json");
        write_file(&broken, "{");
        let error = load_interpreter_options(&args(Some(broken.to_string_lossy().to_string()), None))
            .expect_err("broken");
        assert_eq!(error.code, "CLI_CONFIG_INVALID");

        let error = load_interpreter_options(&args(None, Some(0.0))).expect_err("speed");
        assert_eq!(error.code, "CLI_CONFIG_INVALID");
    }

    #[test]
    fn out_of_range_config_values_are_rejected() {
        let huge = temp_path("config-huge").join("options.json");
        write_file(&huge, r#"{"defaultTimeoutSecs":1e20}"#);
        let error = load_interpreter_options(&args(Some(huge.to_string_lossy().to_string()), None))
            .expect_err("huge timeout");
        assert_eq!(error.code, "CLI_CONFIG_INVALID");
        assert!(error.message.contains("defaultTimeoutSecs"));

        let negative = temp_path("config-negative").join("options.json");
        write_file(&negative, r#"{"defaultTimeoutSecs":-5}"#);
        let error =
            load_interpreter_options(&args(Some(negative.to_string_lossy().to_string()), None))
                .expect_err("negative timeout");
        assert_eq!(error.code, "CLI_CONFIG_INVALID");

        let zero_speed = temp_path("config-speed").join("options.json");
        write_file(&zero_speed, r#"{"playbackSpeed":0}"#);
        let error =
            load_interpreter_options(&args(Some(zero_speed.to_string_lossy().to_string()), None))
                .expect_err("zero speed");
        assert_eq!(error.code, "CLI_CONFIG_INVALID");
    }
}
