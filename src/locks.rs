use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// One mutex per key, created on first use and dropped when idle.
///
/// Callers that read a record, modify it and write it back must hold the
/// key for the whole sequence.
#[derive(Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn with_key<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.entry(key.to_string()).or_default().clone()
        };
        let out = {
            let _held = slot.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // Map entry plus our clone means nobody else is waiting.
        if Arc::strong_count(&slot) == 2 {
            slots.remove(key);
        }
        out
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
