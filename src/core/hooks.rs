//! Purpose: Registry of reserved mapping keys with custom reconstruction.
//! Exports: `ContainerHook`, `ContainerHooks`, `FLASH_CONTAINER_KEY`.
//! Role: Decode-time dispatch table consulted before ordinary unmarshal.
//! Invariants: A reserved key whose collaborator is absent reports
//! `Unavailable`; the decoder downgrades that to a pass-through.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::core::error::{Error, ErrorKind};
use crate::core::value::Value;

/// Reserved key recognized out of the box. The matching container shape
/// belongs to an external web layer, so the default entry has no
/// collaborator and passes values through.
pub const FLASH_CONTAINER_KEY: &str = "flash";

/// Reconstructs one special container shape from its raw decoded mapping
/// value. Returning an `Unavailable` error means the collaborator that
/// owns the shape is not present in this process.
pub trait ContainerHook: Send + Sync {
    fn reconstruct(&self, value: Value) -> Result<Value, Error>;
}

#[derive(Clone, Default)]
pub struct ContainerHooks {
    entries: HashMap<String, Arc<dyn ContainerHook>>,
}

impl ContainerHooks {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registry matching the stock decoder: the flash container key is
    /// reserved but its collaborator is absent.
    pub fn standard() -> Self {
        let mut hooks = Self::new();
        hooks.reserve(FLASH_CONTAINER_KEY);
        hooks
    }

    pub fn register(&mut self, key: impl Into<String>, hook: Arc<dyn ContainerHook>) {
        self.entries.insert(key.into(), hook);
    }

    /// Marks a key as special without installing a reconstructor. Values
    /// under it survive decode unchanged.
    pub fn reserve(&mut self, key: impl Into<String>) {
        let key = key.into();
        let hook = MissingCollaborator { key: key.clone() };
        self.entries.insert(key, Arc::new(hook));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn get(&self, key: &str) -> Option<&Arc<dyn ContainerHook>> {
        self.entries.get(key)
    }
}

impl fmt::Debug for ContainerHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys = self.entries.keys().collect::<Vec<_>>();
        keys.sort();
        f.debug_struct("ContainerHooks").field("keys", &keys).finish()
    }
}

struct MissingCollaborator {
    key: String,
}

impl ContainerHook for MissingCollaborator {
    fn reconstruct(&self, _value: Value) -> Result<Value, Error> {
        Err(Error::new(ErrorKind::Unavailable).with_message(format!(
            "no reconstructor installed for container key {:?}",
            self.key
        )))
    }
}
