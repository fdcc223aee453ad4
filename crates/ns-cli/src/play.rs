use std::path::Path;
use std::sync::Arc;

use ns_api::{
    create_runner_from_text, resume_runner_from_text, CreateRunnerFromTextOptions,
    ResumeRunnerFromTextOptions,
};
use ns_core::NarrativeError;
use ns_runtime::{
    InterpreterOptions, MemoryVariableStore, NarrationService, PersistentVariableService,
    RecordingNarration, ScriptRunner, ServiceRegistry, NARRATION_CAPABILITY,
    PERSISTENT_VARIABLES_CAPABILITY,
};
use tokio_util::sync::CancellationToken;

use crate::{
    emit_run_report, load_interpreter_options, load_player_state, load_source_by_ref,
    load_sources, map_cli_runtime, save_player_state, PlayerState, RunArgs, RunReport,
    PLAYER_STATE_SCHEMA,
};

pub(crate) fn run_play(args: RunArgs) -> Result<i32, NarrativeError> {
    let options = load_interpreter_options(&args)?;
    let narration = Arc::new(RecordingNarration::new());
    let store = Arc::new(MemoryVariableStore::new());
    let services = make_services(&narration, &store);

    let (mut runner, source_id) = prepare_runner(&args, options, services)?;
    for line in &args.breakpoints {
        if *line > 0 {
            runner.context_mut().add_breakpoint(line - 1);
        }
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(map_cli_runtime)?;
    let summary = runtime.block_on(runner.run(&CancellationToken::new()))?;
    tracing::info!(
        state = summary.state.as_str(),
        lines = summary.lines_executed,
        commands = summary.commands_executed,
        "run finished"
    );

    let state_out = match &args.state_out {
        Some(path) if !summary.state.is_terminal() => {
            save_player_state(
                Path::new(path),
                &PlayerState {
                    schema_version: PLAYER_STATE_SCHEMA.to_string(),
                    source_id,
                    snapshot: runner.snapshot(),
                },
            )?;
            Some(path.clone())
        }
        _ => None,
    };

    emit_run_report(&RunReport {
        summary,
        lines: narration.lines(),
        persisted: store.entries(),
        state_out,
    });
    Ok(0)
}

fn prepare_runner(
    args: &RunArgs,
    options: InterpreterOptions,
    services: ServiceRegistry,
) -> Result<(ScriptRunner, String), NarrativeError> {
    if let Some(state_in) = &args.state_in {
        let state = load_player_state(Path::new(state_in))?;
        let source = load_source_by_ref(&state.source_id)?;
        let runner = resume_runner_from_text(ResumeRunnerFromTextOptions {
            scripts_text: source.scripts_text,
            snapshot: state.snapshot,
            interpreter: options,
            services,
            registry: None,
            strict: args.strict,
        })?;
        return Ok((runner, state.source_id));
    }

    let Some(script) = &args.script else {
        return Err(NarrativeError::new(
            "CLI_SCRIPT_REQUIRED",
            "Either --script or --state-in is required.",
        ));
    };
    let source = load_sources(script, args.entry_script.as_deref())?;
    let runner = create_runner_from_text(CreateRunnerFromTextOptions {
        scripts_text: source.scripts_text,
        entry_script: source.entry_script,
        interpreter: options,
        services,
        registry: None,
        strict: args.strict,
    })?;
    Ok((runner, source.id))
}

fn make_services(
    narration: &Arc<RecordingNarration>,
    store: &Arc<MemoryVariableStore>,
) -> ServiceRegistry {
    let mut services = ServiceRegistry::new();
    services.register::<dyn NarrationService>(NARRATION_CAPABILITY, narration.clone());
    services.register::<dyn PersistentVariableService>(
        PERSISTENT_VARIABLES_CAPABILITY,
        store.clone(),
    );
    services
}
