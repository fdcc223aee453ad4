use std::collections::{BTreeMap, BTreeSet};

use ns_core::{ExecutionFrame, ExecutionMetrics, NarrativeError, NsValue, PlaybackState};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MAX_CALL_STACK_DEPTH: usize = 10;

/// Live interpreter state for one script.
///
/// A context is owned by exactly one driver; it is `Send` so a run can move
/// between tasks, but it is never shared between concurrent callers.
#[derive(Debug)]
pub struct ExecutionContext {
    pub(crate) script_name: Option<String>,
    pub(crate) total_lines: usize,
    pub(crate) current_line_index: usize,
    pub(crate) playback_speed: f32,
    pub(crate) state: PlaybackState,
    pub(crate) variables: BTreeMap<String, NsValue>,
    pub(crate) call_stack: Vec<ExecutionFrame>,
    pub(crate) max_call_stack_depth: usize,
    pub(crate) labels: BTreeMap<String, usize>,
    pub(crate) breakpoints: BTreeSet<usize>,
    pub(crate) loop_counters: BTreeMap<usize, u32>,
    pub(crate) metrics: ExecutionMetrics,
    run_token: Option<CancellationToken>,
    pause_requested: bool,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CALL_STACK_DEPTH)
    }
}

impl ExecutionContext {
    pub fn new(max_call_stack_depth: usize) -> Self {
        Self {
            script_name: None,
            total_lines: 0,
            current_line_index: 0,
            playback_speed: 1.0,
            state: PlaybackState::Idle,
            variables: BTreeMap::new(),
            call_stack: Vec::new(),
            max_call_stack_depth,
            labels: BTreeMap::new(),
            breakpoints: BTreeSet::new(),
            loop_counters: BTreeMap::new(),
            metrics: ExecutionMetrics::default(),
            run_token: None,
            pause_requested: false,
        }
    }

    /// Attaches a script and resets execution-derived state.
    pub fn load_script(&mut self, name: &str, total_lines: usize) {
        self.reset();
        self.script_name = Some(name.to_string());
        self.total_lines = total_lines;
    }

    pub fn script_name(&self) -> Option<&str> {
        self.script_name.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        self.script_name.is_some()
    }

    pub fn total_lines(&self) -> usize {
        self.total_lines
    }

    /// Clears variables, call stack, labels, counters and metrics and returns
    /// to `Idle`. Breakpoints are kept.
    pub fn reset(&mut self) {
        self.end_run();
        self.current_line_index = 0;
        self.state = PlaybackState::Idle;
        self.variables.clear();
        self.call_stack.clear();
        self.labels.clear();
        self.loop_counters.clear();
        self.metrics = ExecutionMetrics::default();
        self.pause_requested = false;
    }

    // State machine.

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn transition_to(&mut self, next: PlaybackState) -> Result<(), NarrativeError> {
        if self.state == next {
            return Ok(());
        }
        if !self.state.can_transition_to(next) {
            return Err(NarrativeError::new(
                "CONTEXT_INVALID_TRANSITION",
                format!(
                    "Cannot change playback state from {} to {}.",
                    self.state.as_str(),
                    next.as_str()
                ),
            ));
        }
        tracing::debug!(
            script = self.script_name.as_deref().unwrap_or_default(),
            from = self.state.as_str(),
            to = next.as_str(),
            "playback state changed"
        );
        self.state = next;
        Ok(())
    }

    pub fn can_continue(&self) -> bool {
        self.is_loaded()
            && self.current_line_index < self.total_lines
            && !self.state.is_terminal()
            && !self.is_cancellation_requested()
    }

    // Line position.

    pub fn current_line_index(&self) -> usize {
        self.current_line_index
    }

    /// Moves to `index`; `total_lines` itself is the end-of-script position.
    pub fn set_current_line(&mut self, index: usize) -> Result<(), NarrativeError> {
        if index > self.total_lines {
            return Err(NarrativeError::new(
                "CONTEXT_LINE_OUT_OF_RANGE",
                format!(
                    "Line {} is outside the script ({} lines).",
                    index, self.total_lines
                ),
            ));
        }
        self.current_line_index = index;
        Ok(())
    }

    pub fn advance(&mut self) {
        if self.current_line_index < self.total_lines {
            self.current_line_index += 1;
        }
    }

    pub fn progress(&self) -> f32 {
        if !self.is_loaded() || self.total_lines == 0 {
            return 0.0;
        }
        (self.current_line_index as f32 / self.total_lines as f32).clamp(0.0, 1.0)
    }

    pub fn playback_speed(&self) -> f32 {
        self.playback_speed
    }

    pub fn set_playback_speed(&mut self, speed: f32) {
        if speed.is_finite() && speed > 0.0 {
            self.playback_speed = speed;
        }
    }

    // Variables.

    pub fn variable(&self, name: &str) -> Option<&NsValue> {
        self.variables.get(name)
    }

    pub fn set_variable(&mut self, name: &str, value: NsValue) {
        self.variables.insert(name.to_string(), value);
    }

    pub fn remove_variable(&mut self, name: &str) -> Option<NsValue> {
        self.variables.remove(name)
    }

    pub fn variables(&self) -> &BTreeMap<String, NsValue> {
        &self.variables
    }

    // Call stack.

    pub fn push_frame(&mut self, frame: ExecutionFrame) -> Result<(), NarrativeError> {
        if self.call_stack.len() >= self.max_call_stack_depth {
            return Err(NarrativeError::new(
                "CONTEXT_CALL_STACK_OVERFLOW",
                format!(
                    "Call stack depth limit {} reached.",
                    self.max_call_stack_depth
                ),
            ));
        }
        self.call_stack.push(frame);
        Ok(())
    }

    pub fn pop_frame(&mut self) -> Option<ExecutionFrame> {
        self.call_stack.pop()
    }

    pub fn call_stack(&self) -> &[ExecutionFrame] {
        &self.call_stack
    }

    pub fn call_depth(&self) -> usize {
        self.call_stack.len()
    }

    pub fn max_call_stack_depth(&self) -> usize {
        self.max_call_stack_depth
    }

    // Labels.

    /// Re-registering a name moves it to the new line.
    pub fn register_label(&mut self, name: &str, line_index: i64) -> Result<(), NarrativeError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(NarrativeError::new(
                "CONTEXT_LABEL_EMPTY",
                "Label name is empty.",
            ));
        }
        let index = usize::try_from(line_index).map_err(|_| {
            NarrativeError::new(
                "CONTEXT_LABEL_INDEX",
                format!("Label \"{}\" has negative line index {}.", name, line_index),
            )
        })?;
        if self.is_loaded() && index >= self.total_lines {
            return Err(NarrativeError::new(
                "CONTEXT_LABEL_INDEX",
                format!(
                    "Label \"{}\" points past the end of the script (line {}).",
                    name, index
                ),
            ));
        }
        self.labels.insert(name.to_string(), index);
        Ok(())
    }

    pub fn find_label(&self, name: &str) -> Option<usize> {
        self.labels.get(name.trim()).copied()
    }

    /// Line index of `name`, or -1 when it is not registered.
    pub fn label_line_index(&self, name: &str) -> i64 {
        self.find_label(name)
            .and_then(|index| i64::try_from(index).ok())
            .unwrap_or(-1)
    }

    pub fn labels(&self) -> &BTreeMap<String, usize> {
        &self.labels
    }

    // Breakpoints.

    pub fn add_breakpoint(&mut self, line_index: usize) -> bool {
        self.breakpoints.insert(line_index)
    }

    pub fn remove_breakpoint(&mut self, line_index: usize) -> bool {
        self.breakpoints.remove(&line_index)
    }

    pub fn has_breakpoint(&self, line_index: usize) -> bool {
        self.breakpoints.contains(&line_index)
    }

    pub fn breakpoints(&self) -> &BTreeSet<usize> {
        &self.breakpoints
    }

    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    // Loops.

    pub fn increment_loop_counter(&mut self, line_index: usize) -> u32 {
        let counter = self.loop_counters.entry(line_index).or_default();
        *counter += 1;
        *counter
    }

    pub fn reset_loop_counter(&mut self, line_index: usize) {
        self.loop_counters.remove(&line_index);
    }

    pub fn loop_counter(&self, line_index: usize) -> u32 {
        self.loop_counters.get(&line_index).copied().unwrap_or(0)
    }

    // Metrics.

    pub fn metrics(&self) -> &ExecutionMetrics {
        &self.metrics
    }

    pub fn metrics_mut(&mut self) -> &mut ExecutionMetrics {
        &mut self.metrics
    }

    // Run lifetime.

    /// Starts a run whose token is a child of `parent`; any previous run token
    /// is released first.
    pub fn begin_run(&mut self, parent: &CancellationToken) -> CancellationToken {
        self.end_run();
        let token = parent.child_token();
        self.run_token = Some(token.clone());
        token
    }

    /// Cancels and drops the current run token, if any.
    pub fn end_run(&mut self) {
        if let Some(token) = self.run_token.take() {
            token.cancel();
        }
    }

    pub fn run_token(&self) -> Option<&CancellationToken> {
        self.run_token.as_ref()
    }

    pub fn is_cancellation_requested(&self) -> bool {
        self.run_token
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    pub fn request_pause(&mut self) {
        self.pause_requested = true;
    }

    pub fn take_pause_request(&mut self) -> bool {
        std::mem::take(&mut self.pause_requested)
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        self.end_run();
    }
}

#[cfg(test)]
mod context_tests {
    use super::*;

    fn frame(call_line: usize) -> ExecutionFrame {
        ExecutionFrame {
            script_name: "intro".to_string(),
            call_line_index: call_line,
            return_line_index: call_line + 1,
            label: None,
        }
    }

    fn loaded(total_lines: usize) -> ExecutionContext {
        let mut context = ExecutionContext::default();
        context.load_script("intro", total_lines);
        context
    }

    #[test]
    fn call_stack_is_bounded() {
        let mut context = loaded(20);
        for index in 0..context.max_call_stack_depth() {
            context.push_frame(frame(index)).expect("push within bound");
        }
        let error = context
            .push_frame(frame(99))
            .expect_err("push beyond bound fails");
        assert_eq!(error.code, "CONTEXT_CALL_STACK_OVERFLOW");
        assert_eq!(context.call_depth(), DEFAULT_MAX_CALL_STACK_DEPTH);
        assert_eq!(
            context.pop_frame().map(|frame| frame.call_line_index),
            Some(9)
        );
    }

    #[test]
    fn labels_register_and_resolve() {
        let mut context = loaded(10);
        context.register_label("intro", 4).expect("register");
        assert_eq!(context.label_line_index("intro"), 4);
        assert_eq!(context.label_line_index("missing"), -1);
        assert_eq!(context.find_label("missing"), None);

        context.register_label("intro", 6).expect("re-register");
        assert_eq!(context.find_label("intro"), Some(6));

        let error = context.register_label("", 1).expect_err("empty name");
        assert_eq!(error.code, "CONTEXT_LABEL_EMPTY");
        let error = context.register_label("bad", -1).expect_err("negative");
        assert_eq!(error.code, "CONTEXT_LABEL_INDEX");
        let error = context.register_label("far", 10).expect_err("past end");
        assert_eq!(error.code, "CONTEXT_LABEL_INDEX");
    }

    #[test]
    fn transitions_follow_state_machine() {
        let mut context = loaded(3);
        context
            .transition_to(PlaybackState::Playing)
            .expect("idle to playing");
        context
            .transition_to(PlaybackState::Paused)
            .expect("playing to paused");
        context
            .transition_to(PlaybackState::Playing)
            .expect("paused to playing");
        context
            .transition_to(PlaybackState::Completed)
            .expect("playing to completed");
        let error = context
            .transition_to(PlaybackState::Playing)
            .expect_err("terminal");
        assert_eq!(error.code, "CONTEXT_INVALID_TRANSITION");
        assert!(!context.can_continue());
    }

    #[test]
    fn reset_keeps_breakpoints_only() {
        let mut context = loaded(5);
        context.set_variable("gold", NsValue::Int(3));
        context.register_label("end", 4).expect("label");
        context.push_frame(frame(1)).expect("frame");
        context.add_breakpoint(2);
        context.increment_loop_counter(3);
        context.set_current_line(3).expect("line");
        context
            .transition_to(PlaybackState::Playing)
            .expect("playing");

        context.reset();
        assert_eq!(context.state(), PlaybackState::Idle);
        assert!(context.variables().is_empty());
        assert!(context.call_stack().is_empty());
        assert!(context.labels().is_empty());
        assert_eq!(context.loop_counter(3), 0);
        assert_eq!(context.current_line_index(), 0);
        assert!(context.has_breakpoint(2));
        assert_eq!(context.script_name(), Some("intro"));
    }

    #[test]
    fn progress_and_can_continue() {
        let context = ExecutionContext::default();
        assert_eq!(context.progress(), 0.0);
        assert!(!context.can_continue());

        let mut context = loaded(4);
        assert!(context.can_continue());
        context.set_current_line(2).expect("line");
        assert_eq!(context.progress(), 0.5);
        context.set_current_line(4).expect("end position");
        assert_eq!(context.progress(), 1.0);
        assert!(!context.can_continue());
        assert!(context.set_current_line(5).is_err());
    }

    #[test]
    fn run_token_is_released_on_end_and_reset() {
        let parent = CancellationToken::new();
        let mut context = loaded(4);
        let token = context.begin_run(&parent);
        assert!(!context.is_cancellation_requested());

        parent.cancel();
        assert!(context.is_cancellation_requested());
        assert!(!context.can_continue());

        context.end_run();
        assert!(token.is_cancelled());
        assert!(context.run_token().is_none());

        let second_parent = CancellationToken::new();
        let second = context.begin_run(&second_parent);
        context.reset();
        assert!(second.is_cancelled());
        assert!(!second_parent.is_cancelled());
    }
}
