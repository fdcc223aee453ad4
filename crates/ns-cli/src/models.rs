use std::collections::BTreeMap;

use ns_core::{ContextSnapshot, NsValue};
use ns_runtime::{PresentedLine, RunSummary};
use serde::{Deserialize, Serialize};

pub(crate) const PLAYER_STATE_SCHEMA: &str = "player-state.v1";
pub(crate) const SOURCE_REF_PREFIX: &str = "script-path:";

#[derive(Debug, Clone)]
pub(crate) struct LoadedSource {
    /// `script-path:<absolute path>`, stored in player state.
    pub(crate) id: String,
    pub(crate) scripts_text: BTreeMap<String, String>,
    pub(crate) entry_script: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlayerState {
    pub(crate) schema_version: String,
    pub(crate) source_id: String,
    pub(crate) snapshot: ContextSnapshot,
}

#[derive(Debug, Clone)]
pub(crate) struct RunReport {
    pub(crate) summary: RunSummary,
    pub(crate) lines: Vec<PresentedLine>,
    pub(crate) persisted: BTreeMap<String, NsValue>,
    pub(crate) state_out: Option<String>,
}
