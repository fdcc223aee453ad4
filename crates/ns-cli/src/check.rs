use ns_api::{check_scripts_from_text_map, Diagnostic};
use ns_core::NarrativeError;

use crate::{load_sources, CheckArgs};

pub(crate) fn run_check(args: CheckArgs) -> Result<i32, NarrativeError> {
    let source = load_sources(&args.script, None)?;
    let diagnostics = check_scripts_from_text_map(&source.scripts_text)?;

    for diagnostic in &diagnostics {
        println!("{}", format_diagnostic(diagnostic));
    }

    let fatal = diagnostics.iter().filter(|diagnostic| diagnostic.fatal).count();
    if fatal > 0 {
        return Err(NarrativeError::new(
            "CLI_CHECK_FAILED",
            format!("{} fatal diagnostic(s) in {} script(s).", fatal, source.scripts_text.len()),
        ));
    }

    println!("RESULT:OK");
    println!("SCRIPTS:{}", source.scripts_text.len());
    println!("WARNINGS:{}", diagnostics.len());
    Ok(0)
}

pub(crate) fn format_diagnostic(diagnostic: &Diagnostic) -> String {
    let (script, line) = match &diagnostic.error.location {
        Some(location) => (location.script_name.as_str(), location.line_index + 1),
        None => ("?", 0),
    };
    format!(
        "DIAGNOSTIC:{}:{}:{}:{}",
        script, line, diagnostic.error.code, diagnostic.error.message
    )
}
