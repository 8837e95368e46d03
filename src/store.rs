//! Key-value persistence and the owned-quantity store built on it

use std::collections::BTreeMap;
#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use crate::error::StoreError;

/// Context used for the shared material pool
pub const GLOBAL_CONTEXT: &str = "global";

/// Minimal persistent string store the tracker writes through
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
    /// All entries whose key starts with `prefix`, sorted by key
    fn scan(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError>;
    /// Whether another process changed the store since the last call
    fn external_change(&mut self) -> Result<bool, StoreError> {
        Ok(false)
    }
}

/// Store handle shared by the quantity store and the project set
pub type SharedStore = Arc<Mutex<Box<dyn KeyValueStore + Send>>>;

pub fn shared(store: impl KeyValueStore + Send + 'static) -> SharedStore {
    let boxed: Box<dyn KeyValueStore + Send> = Box::new(store);
    Arc::new(Mutex::new(boxed))
}

/// Lock a shared store; a poisoned lock still holds consistent string data
pub fn lock(store: &SharedStore) -> MutexGuard<'_, Box<dyn KeyValueStore + Send>> {
    store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Failure switches for a [`MemoryStore`], usable after the store is shared
#[cfg(test)]
#[derive(Debug, Default)]
pub struct Faults {
    pub reads: AtomicBool,
    pub writes: AtomicBool,
}

#[cfg(test)]
impl Faults {
    pub fn fail_reads(&self, on: bool) {
        self.reads.store(on, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, on: bool) {
        self.writes.store(on, Ordering::SeqCst);
    }
}

/// In-memory store with switchable failures
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
    faults: Arc<Faults>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> Arc<Faults> {
        Arc::clone(&self.faults)
    }

    fn check_read(&self) -> Result<(), StoreError> {
        if self.faults.reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("read failure".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), StoreError> {
        if self.faults.writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("write failure".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_read()?;
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check_write()?;
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.check_write()?;
        self.entries.remove(key);
        Ok(())
    }

    fn scan(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError> {
        self.check_read()?;
        Ok(self
            .entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// Applied change to one owned quantity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantityChange {
    pub material: String,
    pub context: String,
    pub old: u64,
    pub new: u64,
}

/// Owned counts keyed by (material, context)
pub struct QuantityStore {
    kv: SharedStore,
}

impl QuantityStore {
    pub fn new(kv: SharedStore) -> Self {
        Self { kv }
    }

    fn key(material: &str, context: &str) -> String {
        format!("qty:{}:{}", context, material)
    }

    /// Owned count; absent, unreadable or malformed values read as 0
    pub fn get(&self, material: &str, context: &str) -> u64 {
        let result = lock(&self.kv).get(&Self::key(material, context));
        match result {
            Ok(Some(raw)) => raw.trim().parse().unwrap_or_else(|_| {
                warn!("Ignoring malformed quantity '{}' for {}", raw, material);
                0
            }),
            Ok(None) => 0,
            Err(e) => {
                warn!("Quantity read for {} failed, treating as 0: {}", material, e);
                0
            }
        }
    }

    /// Store a count; returns None when the value was already stored
    pub fn set(
        &mut self,
        material: &str,
        context: &str,
        quantity: u64,
    ) -> Result<Option<QuantityChange>, StoreError> {
        let key = Self::key(material, context);
        let mut kv = lock(&self.kv);
        // Only a cleanly read value can short-circuit the write
        let (old, known) = match kv.get(&key) {
            Ok(Some(raw)) => match raw.trim().parse::<u64>() {
                Ok(value) => (value, true),
                Err(_) => (0, false),
            },
            Ok(None) => (0, true),
            Err(e) => {
                warn!("Quantity read for {} failed, writing anyway: {}", material, e);
                (0, false)
            }
        };
        if known && old == quantity {
            return Ok(None);
        }
        if quantity == 0 {
            kv.remove(&key)?;
        } else {
            kv.set(&key, &quantity.to_string())?;
        }
        Ok(Some(QuantityChange {
            material: material.to_string(),
            context: context.to_string(),
            old,
            new: quantity,
        }))
    }

    /// Every nonzero count in a context
    pub fn all(&self, context: &str) -> Result<BTreeMap<String, u64>, StoreError> {
        let prefix = format!("qty:{}:", context);
        let mut out = BTreeMap::new();
        let entries = lock(&self.kv).scan(&prefix)?;
        for (key, raw) in entries {
            let material = &key[prefix.len()..];
            if let Ok(quantity) = raw.trim().parse::<u64>() {
                if quantity > 0 {
                    out.insert(material.to_string(), quantity);
                }
            }
        }
        Ok(out)
    }
}
