use ns_core::{ContextSnapshot, NarrativeError, PlaybackState, SNAPSHOT_SCHEMA_V1};

use crate::context::ExecutionContext;

impl ExecutionContext {
    pub fn create_snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            schema_version: SNAPSHOT_SCHEMA_V1.to_string(),
            script_name: self.script_name.clone(),
            current_line_index: self.current_line_index,
            playback_speed: self.playback_speed,
            variables: self.variables.clone(),
            breakpoints: self.breakpoints.clone(),
            labels: self.labels.clone(),
            call_stack: self.call_stack.clone(),
            loop_counters: self.loop_counters.clone(),
            metrics: self.metrics.clone(),
        }
    }

    /// Replaces all data state with the snapshot's. The run token is left
    /// alone; a terminal playback state falls back to `Idle`.
    pub fn restore_from_snapshot(&mut self, snapshot: ContextSnapshot) -> Result<(), NarrativeError> {
        if snapshot.schema_version != SNAPSHOT_SCHEMA_V1 {
            return Err(NarrativeError::new(
                "SNAPSHOT_SCHEMA",
                format!(
                    "Unsupported snapshot schema \"{}\".",
                    snapshot.schema_version
                ),
            ));
        }

        if let (Some(loaded), Some(saved)) = (&self.script_name, &snapshot.script_name) {
            if loaded != saved {
                return Err(NarrativeError::new(
                    "SNAPSHOT_SCRIPT_MISMATCH",
                    format!(
                        "Snapshot belongs to script \"{}\" but \"{}\" is loaded.",
                        saved, loaded
                    ),
                ));
            }
        }

        if snapshot.call_stack.len() > self.max_call_stack_depth {
            return Err(NarrativeError::new(
                "SNAPSHOT_CALL_STACK",
                format!(
                    "Snapshot call stack depth {} exceeds the limit {}.",
                    snapshot.call_stack.len(),
                    self.max_call_stack_depth
                ),
            ));
        }

        if self.is_loaded() {
            if snapshot.current_line_index > self.total_lines {
                return Err(NarrativeError::new(
                    "SNAPSHOT_LINE_RANGE",
                    format!(
                        "Snapshot line {} is outside the script ({} lines).",
                        snapshot.current_line_index, self.total_lines
                    ),
                ));
            }
            if let Some((name, index)) = snapshot
                .labels
                .iter()
                .find(|(_, index)| **index >= self.total_lines)
            {
                return Err(NarrativeError::new(
                    "SNAPSHOT_LABEL_RANGE",
                    format!("Snapshot label \"{}\" points at missing line {}.", name, index),
                ));
            }
        }

        if self.script_name.is_none() {
            self.script_name = snapshot.script_name;
        }
        self.current_line_index = snapshot.current_line_index;
        self.playback_speed = snapshot.playback_speed;
        self.variables = snapshot.variables;
        self.breakpoints = snapshot.breakpoints;
        self.labels = snapshot.labels;
        self.call_stack = snapshot.call_stack;
        self.loop_counters = snapshot.loop_counters;
        self.metrics = snapshot.metrics;
        if self.state.is_terminal() {
            self.state = PlaybackState::Idle;
        }
        Ok(())
    }
}
