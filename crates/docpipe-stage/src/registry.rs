use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use docpipe_core::{CapabilityKind, ModelConfig, ModelInstance, ModelLoader, PipelineError, Result};

/// A resident model: the single source of truth that `name` is loaded.
///
/// Exclusively owned by the registry; callers only ever see it through the
/// `process` closure, under the slot's read lock.
pub struct ModelHandle {
    pub name: String,
    pub instance: ModelInstance,
}

impl ModelHandle {
    pub fn kind(&self) -> CapabilityKind {
        self.instance.kind()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    AlreadyLoaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnloadOutcome {
    Unloaded,
    NotFound,
}

type Slot = Arc<RwLock<Option<ModelHandle>>>;

/// Which models are resident in this stage process.
///
/// Locking is two-level: a short-lived map lock to find or create the
/// per-name slot, then the slot's own `RwLock` for the actual work. Load and
/// unload take the slot write lock, `process` takes it read — so the triple
/// behaves as serialized per name, concurrent reads of one resident model are
/// allowed, and a slow load of model A never stalls `process` of model B.
///
/// Slots are never removed once created: unload just empties the slot, so the
/// per-name lock identity stays stable for the life of the process and two
/// slots can never exist for one name.
pub struct ModelRegistry {
    loader: Arc<dyn ModelLoader>,
    slots: RwLock<HashMap<String, Slot>>,
}

impl ModelRegistry {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            slots: RwLock::new(HashMap::new()),
        }
    }

    fn slot(&self, name: &str) -> Option<Slot> {
        self.slots.read().get(name).cloned()
    }

    fn slot_or_create(&self, name: &str) -> Slot {
        if let Some(slot) = self.slot(name) {
            return slot;
        }
        let mut slots = self.slots.write();
        slots
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(None)))
            .clone()
    }

    /// Idempotent load. Initialization runs at most once per name: racing
    /// callers serialize on the slot write lock, the loser sees the handle
    /// and reports `AlreadyLoaded`. A failed initialization leaves the slot
    /// empty — no partially-installed handle is ever visible.
    pub fn load(&self, name: &str, config: &ModelConfig) -> Result<LoadOutcome> {
        let slot = self.slot_or_create(name);
        let mut guard = slot.write();

        if guard.is_some() {
            tracing::debug!(model = name, "load: already resident");
            return Ok(LoadOutcome::AlreadyLoaded);
        }

        let instance = self.loader.build(name, config)?;
        let kind = instance.kind();
        *guard = Some(ModelHandle {
            name: name.to_string(),
            instance,
        });

        tracing::info!(model = name, kind = kind.as_str(), "model loaded");
        Ok(LoadOutcome::Loaded)
    }

    /// Run `op` against the resident handle. Never loads implicitly.
    ///
    /// Holds the slot read lock across the call, so an unload cannot pull the
    /// instance out from under an in-flight inference.
    pub fn process<R>(&self, name: &str, op: impl FnOnce(&ModelHandle) -> Result<R>) -> Result<R> {
        let slot = self
            .slot(name)
            .ok_or_else(|| PipelineError::ModelNotLoaded(name.to_string()))?;
        let guard = slot.read();
        match guard.as_ref() {
            Some(handle) => op(handle),
            None => Err(PipelineError::ModelNotLoaded(name.to_string())),
        }
    }

    /// Idempotent unload: absent names are a no-op, not an error.
    pub fn unload(&self, name: &str) -> UnloadOutcome {
        let Some(slot) = self.slot(name) else {
            return UnloadOutcome::NotFound;
        };
        let mut guard = slot.write();
        match guard.take() {
            Some(handle) => {
                handle.instance.release();
                tracing::info!(model = name, "model unloaded");
                UnloadOutcome::Unloaded
            }
            None => UnloadOutcome::NotFound,
        }
    }

    pub fn is_resident(&self, name: &str) -> bool {
        self.slot(name).is_some_and(|slot| slot.read().is_some())
    }

    /// Names of all resident models, for diagnostics.
    pub fn resident(&self) -> Vec<String> {
        self.slots
            .read()
            .iter()
            .filter(|(_, slot)| slot.read().is_some())
            .map(|(name, _)| name.clone())
            .collect()
    }
}
