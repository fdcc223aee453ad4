use ns_runtime::RunStop;

use crate::RunReport;

pub(crate) fn stop_label(stop: &RunStop) -> String {
    match stop {
        RunStop::Completed => "completed".to_string(),
        RunStop::Breakpoint(index) => format!("breakpoint:{}", index + 1),
        RunStop::Paused => "paused".to_string(),
        RunStop::Cancelled => "cancelled".to_string(),
        RunStop::Stepped => "stepped".to_string(),
        RunStop::StepLimit => "step-limit".to_string(),
    }
}

pub(crate) fn emit_run_report(report: &RunReport) {
    for line in render_run_report(report) {
        println!("{}", line);
    }
}

pub(crate) fn render_run_report(report: &RunReport) -> Vec<String> {
    let mut lines = vec![
        "RESULT:OK".to_string(),
        format!("STOP:{}", stop_label(&report.summary.stop)),
        format!("STATE:{}", report.summary.state.as_str()),
        format!("LINES_EXECUTED:{}", report.summary.lines_executed),
        format!("COMMANDS_EXECUTED:{}", report.summary.commands_executed),
    ];
    for presented in &report.lines {
        lines.push(format!(
            "TEXT_JSON:{}",
            serde_json::to_string(presented).unwrap_or_else(|_| "{}".to_string())
        ));
    }
    if !report.persisted.is_empty() {
        lines.push(format!(
            "PERSIST_JSON:{}",
            serde_json::to_string(&report.persisted).unwrap_or_else(|_| "{}".to_string())
        ));
    }
    lines.push(format!(
        "STATE_OUT:{}",
        report.state_out.as_deref().unwrap_or("NONE")
    ));
    lines
}
