use super::*;
use crate::cli_test_support::*;
use ns_core::{ContextSnapshot, PlaybackState};
use std::fs;
use std::path::Path;

fn run_args(script: Option<String>) -> RunArgs {
    RunArgs {
        script,
        entry_script: None,
        state_in: None,
        state_out: None,
        config: None,
        breakpoints: Vec::new(),
        speed: None,
        strict: false,
    }
}

#[test]
fn save_and_load_player_state_roundtrip_and_schema_validation() {
    let state_path = temp_path("player-state").join("save.json");
    let state = PlayerState {
        schema_version: PLAYER_STATE_SCHEMA.to_string(),
        source_id: "script-path:/tmp/demo.nss".to_string(),
        snapshot: ContextSnapshot {
            schema_version: "context-snapshot.v1".to_string(),
            script_name: Some("demo".to_string()),
            current_line_index: 2,
            playback_speed: 1.0,
            variables: Default::default(),
            breakpoints: Default::default(),
            labels: Default::default(),
            call_stack: Vec::new(),
            loop_counters: Default::default(),
            metrics: Default::default(),
        },
    };
    save_player_state(&state_path, &state).expect("save should pass");
    let loaded = load_player_state(&state_path).expect("load should pass");
    assert_eq!(loaded.schema_version, PLAYER_STATE_SCHEMA);
    assert_eq!(loaded.source_id, state.source_id);
    assert_eq!(loaded.snapshot.current_line_index, 2);

    let bad_path = temp_path("bad-player-state.json");
    let mut bad_json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&state_path).expect("read state"))
            .expect("state json should parse");
    bad_json["schemaVersion"] = serde_json::Value::String("player-state.bad".to_string());
    write_file(
        &bad_path,
        &serde_json::to_string(&bad_json).expect("json should serialize"),
    );
    let error = load_player_state(&bad_path).expect_err("bad schema should fail");
    assert_eq!(error.code, "CLI_STATE_SCHEMA");

    let broken_path = temp_path("broken-player-state.json");
    write_file(&broken_path, "{");
    let error = load_player_state(&broken_path).expect_err("broken json should fail");
    assert_eq!(error.code, "CLI_STATE_INVALID");

    let not_found = temp_path("missing-player-state.json");
    let error = load_player_state(&not_found).expect_err("missing file should fail");
    assert_eq!(error.code, "CLI_STATE_NOT_FOUND");

    let write_root_error =
        save_player_state(Path::new("/"), &state).expect_err("writing root should fail");
    assert_eq!(write_root_error.code, "CLI_STATE_WRITE");
}

#[test]
fn check_passes_on_demos() {
    for demo in ["01-intro.nss", "02-branching.nss", "03-timing.nss"] {
        let code = run(Cli {
            log_level: None,
            command: Mode::Check(CheckArgs {
                script: demo_script(demo),
            }),
        })
        .expect("check should pass");
        assert_eq!(code, 0, "{}", demo);
    }
}

#[test]
fn check_fails_on_fatal_diagnostics() {
    let script = temp_path("check-fatal").join("broken.nss");
    write_file(&script, "Hello.\n@dance wildly\n");
    let error = run_check(CheckArgs {
        script: script.to_string_lossy().to_string(),
    })
    .expect_err("unknown command is fatal");
    assert_eq!(error.code, "CLI_CHECK_FAILED");
}

#[test]
fn run_plays_a_demo_to_the_end() {
    let code = run_play(run_args(Some(demo_script("02-branching.nss")))).expect("run");
    assert_eq!(code, 0);
}

#[test]
fn run_requires_script_or_state() {
    let error = run_play(run_args(None)).expect_err("nothing to run");
    assert_eq!(error.code, "CLI_SCRIPT_REQUIRED");
}

#[test]
fn strict_run_refuses_fatal_diagnostics() {
    let script = temp_path("strict-run").join("broken.nss");
    write_file(&script, "Hello.\n@goto\n");
    let mut args = run_args(Some(script.to_string_lossy().to_string()));
    args.strict = true;
    let error = run_play(args).expect_err("strict");
    assert_eq!(error.code, "API_COMPILE_FAILED");
}

#[test]
fn breakpoint_state_resumes_in_a_second_run() {
    let root = temp_path("resume");
    let script = root.join("story.nss");
    write_file(
        &script,
        "@set var:gold val:4\nFirst.\n@add var:gold amount:1\nGold {gold}.\n",
    );
    let state_path = root.join("state").join("save.json");

    let mut first = run_args(Some(script.to_string_lossy().to_string()));
    first.breakpoints = vec![3];
    first.state_out = Some(state_path.to_string_lossy().to_string());
    assert_eq!(run_play(first).expect("first run"), 0);

    let saved = load_player_state(&state_path).expect("state saved");
    assert_eq!(saved.snapshot.current_line_index, 2);
    assert_eq!(saved.snapshot.script_name.as_deref(), Some("story"));
    assert!(saved.source_id.starts_with(SOURCE_REF_PREFIX));

    let resumed_path = root.join("state").join("after.json");
    let mut second = run_args(None);
    second.state_in = Some(state_path.to_string_lossy().to_string());
    second.state_out = Some(resumed_path.to_string_lossy().to_string());
    assert_eq!(run_play(second).expect("second run"), 0);
    assert!(!resumed_path.exists(), "completed runs do not save state");
}

#[test]
fn directory_runs_pick_main_or_the_named_entry() {
    let root = temp_path("dir-run");
    write_file(&root.join("main.nss"), "Main scene.\n");
    write_file(&root.join("side.nss"), "Side scene.\n");

    let code = run_play(run_args(Some(root.to_string_lossy().to_string()))).expect("main");
    assert_eq!(code, 0);

    let mut args = run_args(Some(root.to_string_lossy().to_string()));
    args.entry_script = Some("missing".to_string());
    let error = run_play(args).expect_err("unknown entry");
    assert_eq!(error.code, "API_ENTRY_SCRIPT_NOT_FOUND");
}

#[test]
fn abort_policy_from_config_fails_the_run() {
    let root = temp_path("abort-config");
    let script = root.join("story.nss");
    write_file(&script, "@add var:gold amount:5 min:low\nDone.\n");
    let config = root.join("options.json");
    write_file(&config, r#"{"bindingErrorPolicy":"abort"}"#);

    let mut args = run_args(Some(script.to_string_lossy().to_string()));
    args.config = Some(config.to_string_lossy().to_string());
    let error = run_play(args).expect_err("abort");
    assert_eq!(error.code, "RUNNER_BINDING");
}

#[test]
fn playback_state_names_are_stable() {
    assert_eq!(PlaybackState::Paused.as_str(), "paused");
}

#[test]
fn parse_errors_return_non_zero() {
    let parse_code = run_cli_from_args(["narrascript", "dance"]);
    assert_ne!(parse_code, 0);

    let missing = run_cli_from_args(["narrascript", "check"]);
    assert_ne!(missing, 0);
}
