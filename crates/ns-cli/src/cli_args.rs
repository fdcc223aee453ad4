use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "narrascript")]
#[command(about = "Narrative script checker and player")]
pub(crate) struct Cli {
    /// Log filter for stderr, e.g. `debug` or `ns_runtime=trace`.
    #[arg(long = "log-level", global = true)]
    pub(crate) log_level: Option<String>,
    #[command(subcommand)]
    pub(crate) command: Mode,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Mode {
    /// Compile scripts and report diagnostics.
    Check(CheckArgs),
    /// Run a script until it ends, pauses or hits a breakpoint.
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub(crate) struct CheckArgs {
    /// A `.nss` file or a directory searched recursively.
    #[arg(long = "script")]
    pub(crate) script: String,
}

#[derive(Debug, Args)]
pub(crate) struct RunArgs {
    #[arg(long = "script", required_unless_present = "state_in")]
    pub(crate) script: Option<String>,
    /// Entry script name when `--script` is a directory.
    #[arg(long = "entry-script")]
    pub(crate) entry_script: Option<String>,
    #[arg(long = "state-in")]
    pub(crate) state_in: Option<String>,
    #[arg(long = "state-out")]
    pub(crate) state_out: Option<String>,
    /// JSON file with interpreter options.
    #[arg(long = "config")]
    pub(crate) config: Option<String>,
    /// 1-based line numbers to pause before.
    #[arg(long = "breakpoint")]
    pub(crate) breakpoints: Vec<usize>,
    /// Overrides the configured playback speed.
    #[arg(long = "speed")]
    pub(crate) speed: Option<f32>,
    /// Refuse scripts with fatal diagnostics.
    #[arg(long = "strict")]
    pub(crate) strict: bool,
}
