use std::collections::BTreeMap;

use ns_compiler::compile_script;
pub use ns_compiler::{CompiledScript, Diagnostic};
use ns_core::{ContextSnapshot, NarrativeError};
use ns_runtime::{CommandRegistry, InterpreterOptions, ScriptRunner, ServiceRegistry};

pub struct CreateRunnerFromTextOptions {
    /// Script sources keyed by script name.
    pub scripts_text: BTreeMap<String, String>,
    pub entry_script: Option<String>,
    pub interpreter: InterpreterOptions,
    pub services: ServiceRegistry,
    /// Defaults to the built-in commands.
    pub registry: Option<CommandRegistry>,
    /// Refuse scripts with fatal diagnostics instead of skipping those lines.
    pub strict: bool,
}

pub struct ResumeRunnerFromTextOptions {
    pub scripts_text: BTreeMap<String, String>,
    pub snapshot: ContextSnapshot,
    pub interpreter: InterpreterOptions,
    pub services: ServiceRegistry,
    pub registry: Option<CommandRegistry>,
    pub strict: bool,
}

pub fn compile_scripts_from_text_map(
    scripts_text: &BTreeMap<String, String>,
    registry: &CommandRegistry,
    options: &InterpreterOptions,
) -> BTreeMap<String, CompiledScript> {
    let compile_options = options.compile_options();
    scripts_text
        .iter()
        .map(|(name, source)| {
            (
                name.clone(),
                compile_script(name, source, registry.table(), &compile_options),
            )
        })
        .collect()
}

/// All diagnostics of every script, in script-name then line order.
pub fn check_scripts_from_text_map(
    scripts_text: &BTreeMap<String, String>,
) -> Result<Vec<Diagnostic>, NarrativeError> {
    let registry = CommandRegistry::with_builtins()?;
    let compiled =
        compile_scripts_from_text_map(scripts_text, &registry, &InterpreterOptions::default());
    Ok(compiled
        .into_values()
        .flat_map(|script| script.diagnostics)
        .collect())
}

pub fn create_runner_from_text(
    options: CreateRunnerFromTextOptions,
) -> Result<ScriptRunner, NarrativeError> {
    let entry = resolve_entry_script(&options.scripts_text, options.entry_script)?;
    let registry = match options.registry {
        Some(registry) => registry,
        None => CommandRegistry::with_builtins()?,
    };
    let script = compile_entry(
        &entry,
        &options.scripts_text,
        &registry,
        &options.interpreter,
        options.strict,
    )?;
    ScriptRunner::new(script, &registry, options.services, options.interpreter)
}

pub fn resume_runner_from_text(
    options: ResumeRunnerFromTextOptions,
) -> Result<ScriptRunner, NarrativeError> {
    let entry = options.snapshot.script_name.clone().ok_or_else(|| {
        NarrativeError::new(
            "API_SNAPSHOT_WITHOUT_SCRIPT",
            "Snapshot does not name the script it was taken from.",
        )
    })?;
    let registry = match options.registry {
        Some(registry) => registry,
        None => CommandRegistry::with_builtins()?,
    };
    let script = compile_entry(
        &entry,
        &options.scripts_text,
        &registry,
        &options.interpreter,
        options.strict,
    )?;
    let mut runner = ScriptRunner::new(script, &registry, options.services, options.interpreter)?;
    runner.restore(options.snapshot)?;
    Ok(runner)
}

fn compile_entry(
    entry: &str,
    scripts_text: &BTreeMap<String, String>,
    registry: &CommandRegistry,
    options: &InterpreterOptions,
    strict: bool,
) -> Result<CompiledScript, NarrativeError> {
    let source = scripts_text.get(entry).ok_or_else(|| {
        NarrativeError::new(
            "API_ENTRY_SCRIPT_NOT_FOUND",
            format!("Entry script \"{}\" is not registered.", entry),
        )
    })?;
    let script = compile_script(entry, source, registry.table(), &options.compile_options());

    for diagnostic in &script.diagnostics {
        tracing::warn!(
            script = entry,
            fatal = diagnostic.fatal,
            error = %diagnostic.error,
            "script diagnostic"
        );
    }
    if strict {
        if let Some(diagnostic) = script.diagnostics.iter().find(|diagnostic| diagnostic.fatal) {
            let mut error = NarrativeError::new(
                "API_COMPILE_FAILED",
                format!(
                    "Script \"{}\" has fatal diagnostics: {}",
                    entry, diagnostic.error
                ),
            );
            error.location = diagnostic.error.location.clone();
            return Err(error);
        }
    }
    Ok(script)
}

fn resolve_entry_script(
    scripts_text: &BTreeMap<String, String>,
    explicit: Option<String>,
) -> Result<String, NarrativeError> {
    if let Some(entry) = explicit {
        if !scripts_text.contains_key(&entry) {
            return Err(NarrativeError::new(
                "API_ENTRY_SCRIPT_NOT_FOUND",
                format!("Entry script \"{}\" is not registered.", entry),
            ));
        }
        return Ok(entry);
    }

    if scripts_text.contains_key("main") {
        return Ok("main".to_string());
    }
    if scripts_text.len() == 1 {
        if let Some(name) = scripts_text.keys().next() {
            return Ok(name.clone());
        }
    }

    Err(NarrativeError::new(
        "API_ENTRY_MAIN_NOT_FOUND",
        "Expected a script named \"main\" as the default entry.",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use ns_core::{NsValue, PlaybackState};
    use ns_runtime::{NarrationService, RecordingNarration, RunStop, NARRATION_CAPABILITY};
    use tokio_util::sync::CancellationToken;

    fn map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn narrated() -> (ServiceRegistry, Arc<RecordingNarration>) {
        let narration = Arc::new(RecordingNarration::new());
        let mut services = ServiceRegistry::new();
        services.register::<dyn NarrationService>(NARRATION_CAPABILITY, narration.clone());
        (services, narration)
    }

    fn create(scripts: BTreeMap<String, String>, entry: Option<&str>, strict: bool) -> Result<ScriptRunner, NarrativeError> {
        create_runner_from_text(CreateRunnerFromTextOptions {
            scripts_text: scripts,
            entry_script: entry.map(str::to_string),
            interpreter: InterpreterOptions::default(),
            services: ServiceRegistry::new(),
            registry: None,
            strict,
        })
    }

    #[test]
    fn entry_defaults_to_main_or_single_script() {
        let runner = create(map(&[("main", "Hi"), ("alt", "Alt")]), None, true).expect("main");
        assert_eq!(runner.script().name, "main");
        let runner = create(map(&[("intro", "Hi")]), None, true).expect("single");
        assert_eq!(runner.script().name, "intro");
        let runner = create(map(&[("main", "Hi"), ("alt", "Alt")]), Some("alt"), true).expect("explicit");
        assert_eq!(runner.script().name, "alt");
    }

    #[test]
    fn missing_entries_are_reported() {
        let error = create(map(&[("intro", "Hi")]), Some("missing"), true)
            .err()
            .expect("missing entry");
        assert_eq!(error.code, "API_ENTRY_SCRIPT_NOT_FOUND");
        let error = create(map(&[("a", "A"), ("b", "B")]), None, true)
            .err()
            .expect("no main");
        assert_eq!(error.code, "API_ENTRY_MAIN_NOT_FOUND");
    }

    #[test]
    fn strict_mode_rejects_fatal_diagnostics() {
        let scripts = map(&[("main", "Hi\n@dance")]);
        let error = create(scripts.clone(), None, true).err().expect("strict");
        assert_eq!(error.code, "API_COMPILE_FAILED");
        assert_eq!(error.location.map(|location| location.line_index), Some(1));
        assert!(create(scripts, None, false).is_ok());
    }

    #[test]
    fn check_collects_diagnostics_across_scripts() {
        let diagnostics =
            check_scripts_from_text_map(&map(&[("a", "@dance"), ("b", "@wait")])).expect("check");
        let codes: Vec<&str> = diagnostics
            .iter()
            .map(|diagnostic| diagnostic.error.code.as_str())
            .collect();
        assert_eq!(codes, vec!["BIND_UNKNOWN_ALIAS", "BIND_REQUIRED_MISSING"]);
    }

    #[tokio::test]
    async fn resume_continues_from_snapshot() {
        let scripts = map(&[("main", "@set var:gold val:2\n@pause\nGold {gold}")]);
        let mut runner = create(scripts.clone(), None, true).expect("runner");
        let summary = runner.run(&CancellationToken::new()).await.expect("run");
        assert_eq!(summary.stop, RunStop::Paused);
        let snapshot = runner.snapshot();

        let (services, narration) = narrated();
        let mut resumed = resume_runner_from_text(ResumeRunnerFromTextOptions {
            scripts_text: scripts,
            snapshot,
            interpreter: InterpreterOptions::default(),
            services,
            registry: None,
            strict: true,
        })
        .expect("resume");
        assert_eq!(resumed.context().variable("gold"), Some(&NsValue::Int(2)));
        let summary = resumed.run(&CancellationToken::new()).await.expect("run");
        assert_eq!(summary.state, PlaybackState::Completed);
        assert_eq!(narration.texts(), vec!["Gold 2"]);
    }

    #[test]
    fn resume_requires_script_identity() {
        let runner = create(map(&[("main", "Hi")]), None, true).expect("runner");
        let mut snapshot = runner.snapshot();
        snapshot.script_name = None;
        let error = resume_runner_from_text(ResumeRunnerFromTextOptions {
            scripts_text: map(&[("main", "Hi")]),
            snapshot,
            interpreter: InterpreterOptions::default(),
            services: ServiceRegistry::new(),
            registry: None,
            strict: true,
        })
        .err()
        .expect("no script");
        assert_eq!(error.code, "API_SNAPSHOT_WITHOUT_SCRIPT");
    }
}
