use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ns_core::{ContentType, NarrativeError, NsValue};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// One line handed to the narration capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentedLine {
    pub script: String,
    pub line_index: usize,
    pub content_type: ContentType,
    pub speaker: Option<String>,
    pub text: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

#[async_trait]
pub trait NarrationService: Send + Sync {
    async fn present(
        &self,
        line: &PresentedLine,
        cancel: &CancellationToken,
    ) -> Result<(), NarrativeError>;
}

pub trait PersistentVariableService: Send + Sync {
    fn store(&self, key: &str, value: &NsValue) -> Result<(), NarrativeError>;
    fn load(&self, key: &str) -> Result<Option<NsValue>, NarrativeError>;
}

struct ServiceEntry {
    capability: String,
    service: Box<dyn Any + Send + Sync>,
}

/// Capability lookup keyed by the trait-object type a service implements.
#[derive(Default)]
pub struct ServiceRegistry {
    entries: HashMap<TypeId, ServiceEntry>,
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `service` as the provider of capability `T`, replacing any
    /// earlier provider.
    pub fn register<T>(&mut self, capability: &str, service: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.entries.insert(
            TypeId::of::<T>(),
            ServiceEntry {
                capability: capability.to_string(),
                service: Box::new(service),
            },
        );
    }

    pub fn get<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.service.downcast_ref::<Arc<T>>())
            .cloned()
    }

    pub fn require<T>(&self, capability: &str) -> Result<Arc<T>, NarrativeError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.get::<T>().ok_or_else(|| {
            NarrativeError::new(
                "COMMAND_CAPABILITY_MISSING",
                format!("No service provides the \"{}\" capability.", capability),
            )
        })
    }

    pub fn capabilities(&self) -> Vec<&str> {
        let mut names = self
            .entries
            .values()
            .map(|entry| entry.capability.as_str())
            .collect::<Vec<_>>();
        names.sort_unstable();
        names
    }
}

pub const NARRATION_CAPABILITY: &str = "narration";
pub const PERSISTENT_VARIABLES_CAPABILITY: &str = "persistent-variables";

/// Narration sink that keeps every presented line.
#[derive(Debug, Default)]
pub struct RecordingNarration {
    lines: Mutex<Vec<PresentedLine>>,
}

impl RecordingNarration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<PresentedLine> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    pub fn texts(&self) -> Vec<String> {
        self.lines().into_iter().map(|line| line.text).collect()
    }
}

#[async_trait]
impl NarrationService for RecordingNarration {
    async fn present(
        &self,
        line: &PresentedLine,
        _cancel: &CancellationToken,
    ) -> Result<(), NarrativeError> {
        let mut lines = self.lines.lock().map_err(|_| {
            NarrativeError::new("COMMAND_SERVICE_POISONED", "Narration log lock poisoned.")
        })?;
        lines.push(line.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryVariableStore {
    values: Mutex<BTreeMap<String, NsValue>>,
}

impl MemoryVariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> BTreeMap<String, NsValue> {
        self.values
            .lock()
            .map(|values| values.clone())
            .unwrap_or_default()
    }
}

impl PersistentVariableService for MemoryVariableStore {
    fn store(&self, key: &str, value: &NsValue) -> Result<(), NarrativeError> {
        let mut values = self.values.lock().map_err(|_| {
            NarrativeError::new("COMMAND_SERVICE_POISONED", "Variable store lock poisoned.")
        })?;
        values.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<NsValue>, NarrativeError> {
        let values = self.values.lock().map_err(|_| {
            NarrativeError::new("COMMAND_SERVICE_POISONED", "Variable store lock poisoned.")
        })?;
        Ok(values.get(key).cloned())
    }
}
