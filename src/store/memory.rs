//! In-memory store.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::error::{MinerError, Result};
use crate::store::{CompletionStore, ItemStore};

/// Thread-safe in-memory implementation of the store traits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    completed: Mutex<Vec<String>>,
    items: Mutex<HashMap<String, HashSet<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with completed project names.
    pub fn with_completed<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        if let Ok(mut completed) = store.completed.lock() {
            completed.extend(names.into_iter().map(Into::into));
        }
        store
    }

    /// Completion markers in the order they were written, without duplicates.
    pub fn completion_log(&self) -> Vec<String> {
        self.completed.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> MinerError {
    MinerError::Storage(e.to_string())
}

impl CompletionStore for MemoryStore {
    fn completed_project_names(&self) -> Result<HashSet<String>> {
        Ok(self.completed.lock().map_err(poisoned)?.iter().cloned().collect())
    }

    fn mark_project_completed(&self, name: &str) -> Result<bool> {
        let mut completed = self.completed.lock().map_err(poisoned)?;
        if completed.iter().any(|c| c == name) {
            return Ok(false);
        }
        completed.push(name.to_string());
        Ok(true)
    }
}

impl ItemStore for MemoryStore {
    fn existing_item_ids(&self, project: &str) -> Result<HashSet<String>> {
        Ok(self
            .items
            .lock()
            .map_err(poisoned)?
            .get(project)
            .cloned()
            .unwrap_or_default())
    }

    fn save_items(&self, project: &str, ids: &[String]) -> Result<usize> {
        let mut items = self.items.lock().map_err(poisoned)?;
        let entry = items.entry(project.to_string()).or_default();
        Ok(ids.iter().filter(|id| entry.insert((*id).clone())).count())
    }
}
