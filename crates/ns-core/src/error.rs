use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineLocation {
    pub script_name: String,
    pub line_index: usize,
}

impl LineLocation {
    pub fn new(script_name: impl Into<String>, line_index: usize) -> Self {
        Self {
            script_name: script_name.into(),
            line_index,
        }
    }
}

impl fmt::Display for LineLocation {
    // 1-based for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.script_name, self.line_index + 1)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
#[error("{code}: {message}")]
pub struct NarrativeError {
    pub code: String,
    pub message: String,
    pub location: Option<LineLocation>,
}

impl NarrativeError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            location: None,
        }
    }

    pub fn at_line(
        code: impl Into<String>,
        message: impl Into<String>,
        location: LineLocation,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            location: Some(location),
        }
    }

    pub fn with_location(mut self, location: LineLocation) -> Self {
        self.location = Some(location);
        self
    }
}
