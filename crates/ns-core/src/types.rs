use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::value::NsValue;

pub const SNAPSHOT_SCHEMA_V1: &str = "context-snapshot.v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentType {
    Narration,
    CharacterSpeech,
    CharacterThought,
    Comment,
    Label,
    Empty,
}

/// Classification of one raw script line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineMetadata {
    pub content_type: ContentType,
    pub speaker_id: Option<String>,
    pub processed_text: String,
    pub label_name: Option<String>,
    pub has_variables: bool,
    /// Referenced `{name}` variables in order of first appearance, no duplicates.
    pub variable_names: Vec<String>,
    pub should_skip: bool,
    pub attributes: BTreeMap<String, String>,
}

impl LineMetadata {
    pub fn new(content_type: ContentType, processed_text: impl Into<String>) -> Self {
        Self {
            content_type,
            speaker_id: None,
            processed_text: processed_text.into(),
            label_name: None,
            has_variables: false,
            variable_names: Vec::new(),
            should_skip: matches!(
                content_type,
                ContentType::Comment | ContentType::Label | ContentType::Empty
            ),
            attributes: BTreeMap::new(),
        }
    }

    pub fn is_dialogue(&self) -> bool {
        matches!(
            self.content_type,
            ContentType::Narration | ContentType::CharacterSpeech | ContentType::CharacterThought
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
    Stopped,
    Completed,
    Failed,
}

impl PlaybackState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(self, next: PlaybackState) -> bool {
        use PlaybackState::*;
        matches!(
            (self, next),
            (Idle, Playing)
                | (Idle, Stopped)
                | (Playing, Paused)
                | (Paused, Playing)
                | (Paused, Stopped)
                | (Playing, Completed)
                | (Playing, Stopped)
                | (Playing, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RetryStrategy {
    #[default]
    None,
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FallbackAction {
    #[default]
    Abort,
    Continue,
    Retry,
    UseDefault,
}

/// One suspended caller on the call stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionFrame {
    pub script_name: String,
    pub call_line_index: usize,
    pub return_line_index: usize,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutionMetrics {
    pub lines_executed: u64,
    pub commands_executed: u64,
    pub commands_failed: u64,
    pub commands_recovered: u64,
    pub retries: u64,
    pub execution_time_ms: u64,
    pub commands_by_category: BTreeMap<String, u64>,
}

impl ExecutionMetrics {
    pub fn record_line(&mut self) {
        self.lines_executed += 1;
    }

    pub fn record_command(&mut self, category: &str, elapsed: Duration, attempts: u32) {
        self.commands_executed += 1;
        self.retries += u64::from(attempts.saturating_sub(1));
        self.execution_time_ms += elapsed.as_millis() as u64;
        *self
            .commands_by_category
            .entry(category.to_string())
            .or_default() += 1;
    }

    pub fn execution_time(&self) -> Duration {
        Duration::from_millis(self.execution_time_ms)
    }

    pub fn average_command_time(&self) -> Duration {
        if self.commands_executed == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.execution_time_ms / self.commands_executed)
    }
}

/// Persisted copy of an execution context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    pub schema_version: String,
    pub script_name: Option<String>,
    pub current_line_index: usize,
    #[serde(default = "default_playback_speed")]
    pub playback_speed: f32,
    #[serde(default)]
    pub variables: BTreeMap<String, NsValue>,
    #[serde(default)]
    pub breakpoints: BTreeSet<usize>,
    #[serde(default)]
    pub labels: BTreeMap<String, usize>,
    /// Bottom of the stack first.
    #[serde(default)]
    pub call_stack: Vec<ExecutionFrame>,
    #[serde(default)]
    pub loop_counters: BTreeMap<usize, u32>,
    #[serde(default)]
    pub metrics: ExecutionMetrics,
}

fn default_playback_speed() -> f32 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NamedString {
    pub name: String,
    pub value: String,
}
