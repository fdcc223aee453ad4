use std::ffi::OsString;

use clap::Parser;
use ns_core::NarrativeError;

mod check;
mod cli_args;
mod config;
mod error_map;
mod logging;
mod models;
mod play;
mod report;
mod source_loader;
mod state_store;

pub(crate) use check::run_check;
pub(crate) use cli_args::{CheckArgs, Cli, Mode, RunArgs};
pub(crate) use config::load_interpreter_options;
pub(crate) use error_map::{
    emit_error, map_cli_config_invalid, map_cli_config_read, map_cli_runtime,
    map_cli_source_path, map_cli_source_read, map_cli_source_scan, map_cli_state_encode,
    map_cli_state_invalid, map_cli_state_read, map_cli_state_write,
};
pub(crate) use logging::init_logging;
pub(crate) use models::{
    LoadedSource, PlayerState, RunReport, PLAYER_STATE_SCHEMA, SOURCE_REF_PREFIX,
};
pub(crate) use play::run_play;
pub(crate) use report::emit_run_report;
pub(crate) use source_loader::{load_source_by_ref, load_sources};
pub(crate) use state_store::{load_player_state, save_player_state};

pub fn run_cli_from_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return error.exit_code();
        }
    };
    init_logging(cli.log_level.as_deref());
    match run(cli) {
        Ok(code) => code,
        Err(error) => emit_error(error),
    }
}

fn run(cli: Cli) -> Result<i32, NarrativeError> {
    match cli.command {
        Mode::Check(args) => run_check(args),
        Mode::Run(args) => run_play(args),
    }
}


#[cfg(test)]
mod tests;
