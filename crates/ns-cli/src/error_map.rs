use std::fmt::Display;

use ns_core::NarrativeError;

fn map_error(code: &'static str, error: impl Display) -> NarrativeError {
    NarrativeError::new(code, error.to_string())
}

pub(crate) fn emit_error(error: NarrativeError) -> i32 {
    println!("RESULT:ERROR");
    println!("ERROR_CODE:{}", error.code);
    if let Some(location) = &error.location {
        println!("ERROR_AT:{}", location);
    }
    println!(
        "ERROR_MSG_JSON:{}",
        serde_json::to_string(&error.message).unwrap_or_else(|_| "\"Unknown error\"".to_string())
    );
    1
}

pub(crate) fn map_cli_source_path(error: std::io::Error) -> NarrativeError {
    map_error("CLI_SOURCE_PATH", error)
}

pub(crate) fn map_cli_source_scan(error: std::path::StripPrefixError) -> NarrativeError {
    map_error("CLI_SOURCE_SCAN", error)
}

pub(crate) fn map_cli_source_read(error: std::io::Error) -> NarrativeError {
    map_error("CLI_SOURCE_READ", error)
}

pub(crate) fn map_cli_state_write(error: std::io::Error) -> NarrativeError {
    map_error("CLI_STATE_WRITE", error)
}

pub(crate) fn map_cli_state_encode(error: serde_json::Error) -> NarrativeError {
    map_error("CLI_STATE_WRITE", error)
}

pub(crate) fn map_cli_state_read(error: std::io::Error) -> NarrativeError {
    map_error("CLI_STATE_READ", error)
}

pub(crate) fn map_cli_state_invalid(error: serde_json::Error) -> NarrativeError {
    map_error("CLI_STATE_INVALID", error)
}

pub(crate) fn map_cli_config_read(error: std::io::Error) -> NarrativeError {
    map_error("CLI_CONFIG_READ", error)
}

pub(crate) fn map_cli_config_invalid(error: serde_json::Error) -> NarrativeError {
    map_error("CLI_CONFIG_INVALID", error)
}

pub(crate) fn map_cli_runtime(error: std::io::Error) -> NarrativeError {
    map_error("CLI_RUNTIME", error)
}
