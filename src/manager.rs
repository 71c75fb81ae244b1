//! The task registry. Grounded on `sources::manager::SourceManager` — a
//! process-wide `DashMap` keyed by an opaque id, with thin methods that look
//! up an entry and delegate to it (spec §6/§7).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use uuid::Uuid;

use crate::config::{Config, TaskDefaults};
use crate::error::ManagerError;
use crate::safety::{DnsSafetyFilter, UrlSafety};
use crate::task::{Task, TaskOptions, TaskOptionsInput, TaskSnapshot};

/// Owns every live [`Task`] for the lifetime of the process. Cheaply
/// cloneable (`Arc`-backed internals) so a binary can hand it to multiple
/// callers without wrapping it again.
#[derive(Clone)]
pub struct TaskManager {
    tasks: Arc<DashMap<String, Arc<Task>>>,
    download_dir: PathBuf,
    safety: Arc<dyn UrlSafety>,
    client: reqwest::Client,
    /// Per-task defaults (retry count, timeout, headers) threaded into every
    /// [`TaskOptionsInput`] that doesn't set its own value — SPEC_FULL.md §2
    /// item 8.
    defaults: TaskDefaults,
}

impl TaskManager {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = crate::http::build_client(Duration::from_secs(config.defaults.timeout_secs))?;
        let mut manager = Self::with_safety(config, Arc::new(DnsSafetyFilter));
        manager.client = client;
        Ok(manager)
    }

    /// Constructs a manager with an explicit [`UrlSafety`] implementation —
    /// used by tests to swap in [`crate::safety::AllowAllSafety`] against a
    /// mock server that only ever binds to loopback.
    pub fn with_safety(config: &Config, safety: Arc<dyn UrlSafety>) -> Self {
        let client = crate::http::build_client(Duration::from_secs(config.defaults.timeout_secs))
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            tasks: Arc::new(DashMap::new()),
            download_dir: PathBuf::from(&config.download_dir),
            safety,
            client,
            defaults: config.defaults.clone(),
        }
    }

    /// Creates a new task in the `ready` state and registers it. Does not
    /// start it — the caller decides when via [`TaskManager::start`].
    ///
    /// `input.max_retries` falls back to `config.defaults.max_retries` when
    /// unset, and `config.defaults.headers` is merged underneath whatever
    /// headers the caller supplied (caller entries win on a key collision).
    pub fn create(&self, mut input: TaskOptionsInput) -> Result<String, ManagerError> {
        if input.max_retries.is_none() {
            input.max_retries = Some(self.defaults.max_retries);
        }
        if !self.defaults.headers.is_empty() {
            let mut headers = self.defaults.headers.clone();
            headers.extend(input.headers);
            input.headers = headers;
        }

        let options =
            TaskOptions::new(input).map_err(|e| ManagerError::Validation(e.to_string()))?;
        let id = Uuid::new_v4().to_string();
        let task = Task::new(
            id.clone(),
            options,
            &self.download_dir,
            Arc::clone(&self.safety),
            self.client.clone(),
        );
        self.tasks.insert(id.clone(), Arc::new(task));
        Ok(id)
    }

    pub fn start(&self, id: &str) -> Result<(), ManagerError> {
        let task = self.get_task(id)?;
        std::fs::create_dir_all(&self.download_dir)
            .map_err(|e| ManagerError::Validation(e.to_string()))?;
        task.start(self.download_dir.clone());
        Ok(())
    }

    pub fn pause(&self, id: &str) -> Result<(), ManagerError> {
        self.get_task(id)?.pause();
        Ok(())
    }

    pub fn resume(&self, id: &str) -> Result<(), ManagerError> {
        self.get_task(id)?.resume();
        Ok(())
    }

    pub fn cancel(&self, id: &str) -> Result<(), ManagerError> {
        self.get_task(id)?.cancel();
        Ok(())
    }

    pub fn force_save(&self, id: &str) -> Result<(), ManagerError> {
        self.get_task(id)?.force_save();
        Ok(())
    }

    pub fn retry_segment(&self, id: &str, index: usize) -> Result<(), ManagerError> {
        self.get_task(id)?
            .retry_segment(index)
            .map_err(|_| ManagerError::OutOfRange(index))
    }

    pub fn snapshot(&self, id: &str) -> Result<TaskSnapshot, ManagerError> {
        Ok(self.get_task(id)?.snapshot())
    }

    pub fn list(&self) -> Vec<TaskSnapshot> {
        self.tasks.iter().map(|e| e.value().snapshot()).collect()
    }

    /// Removes a task from the registry. When `remove_files` is set, also
    /// deletes its output/partial file and any still-live temp file, waiting
    /// briefly for its worker to wind down first.
    pub async fn delete(&self, id: &str, remove_files: bool) -> Result<(), ManagerError> {
        let task = self.get_task(id)?;
        task.cancel();
        task.join_worker(Duration::from_secs(5)).await;

        if remove_files {
            let snap = task.snapshot();
            if let Some(path) = snap.output_path {
                let _ = tokio::fs::remove_file(path).await;
            }
        }

        self.tasks.remove(id);
        Ok(())
    }

    fn get_task(&self, id: &str) -> Result<Arc<Task>, ManagerError> {
        self.tasks
            .get(id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| ManagerError::NotFound(id.to_string()))
    }
}
