//! Knowledge-base index lifecycle.
//!
//! Creates, verifies, configures, and drops the index backing each
//! knowledge base. Creation and deletion are idempotent: "already exists"
//! and "not found" from the index service are absorbed here.

use std::sync::Arc;

use minerag_core::index::IndexError;
use minerag_core::models::IndexDescriptor;
use tracing::{debug, info};

use crate::config::IndexConfig;
use crate::index_client::{IndexClient, IndexSettings, IndexStats, TaskInfo};

/// Existence and size of one knowledge-base index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStatus {
    pub name: String,
    pub exists: bool,
    pub documents: u64,
    pub indexing: bool,
}

pub struct IndexManager {
    client: Arc<IndexClient>,
    config: IndexConfig,
}

impl IndexManager {
    pub fn new(client: Arc<IndexClient>, config: IndexConfig) -> Self {
        Self { client, config }
    }

    pub fn client(&self) -> &Arc<IndexClient> {
        &self.client
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Index name for knowledge base `kb`.
    pub fn index_name(&self, kb: &str) -> String {
        self.config.index_name(kb)
    }

    pub fn descriptor(&self, kb: &str) -> IndexDescriptor {
        IndexDescriptor::for_knowledge_base(
            self.index_name(kb),
            self.config.pagination_max_total_hits,
        )
    }

    /// Wait for `task` with the configured poll interval and deadline.
    pub async fn wait(&self, task: TaskInfo) -> Result<(), IndexError> {
        self.client
            .wait_for_task(
                task,
                self.config.task_poll_interval(),
                self.config.task_timeout(),
            )
            .await
            .map(|_| ())
    }

    /// Create `name`. Succeeds when the index already exists.
    pub async fn ensure_index(&self, name: &str) -> Result<(), IndexError> {
        let created = match self.client.create_index(name).await {
            Ok(task) => self.wait(task).await,
            Err(e) => Err(e),
        };
        match created {
            Ok(()) => {
                info!(index = name, "index created");
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                debug!(index = name, "index already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Delete `name`. Returns false when there was nothing to delete.
    pub async fn drop_index(&self, name: &str) -> Result<bool, IndexError> {
        let deleted = match self.client.delete_index(name).await {
            Ok(task) => self.wait(task).await,
            Err(e) => Err(e),
        };
        match deleted {
            Ok(()) => {
                info!(index = name, "index dropped");
                Ok(true)
            }
            Err(e) if e.is_not_found() => {
                debug!(index = name, "index already absent");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Push the descriptor's settings, then its pagination cap.
    ///
    /// Each task is polled to completion; a failed settings task is an
    /// error and documents must not be written to the index.
    pub async fn apply_settings(&self, descriptor: &IndexDescriptor) -> Result<(), IndexError> {
        let name = descriptor.name.as_str();
        let task = self
            .client
            .update_settings(name, &IndexSettings::from(descriptor))
            .await?;
        self.wait(task).await?;

        let task = self
            .client
            .update_pagination(name, descriptor.pagination_cap)
            .await?;
        self.wait(task).await?;
        info!(index = name, max_total_hits = descriptor.pagination_cap, "index settings applied");
        Ok(())
    }

    /// Whether `name` exists. Only "not found" maps to false.
    pub async fn is_ready(&self, name: &str) -> Result<bool, IndexError> {
        match self.client.get_index(name).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Ensure the index for `kb` exists and carries current settings.
    pub async fn prepare(&self, kb: &str) -> Result<String, IndexError> {
        let descriptor = self.descriptor(kb);
        self.ensure_index(&descriptor.name).await?;
        self.apply_settings(&descriptor).await?;
        Ok(descriptor.name)
    }

    pub async fn status(&self, kb: &str) -> Result<IndexStatus, IndexError> {
        let name = self.index_name(kb);
        if !self.is_ready(&name).await? {
            return Ok(IndexStatus {
                name,
                exists: false,
                documents: 0,
                indexing: false,
            });
        }
        let IndexStats {
            number_of_documents,
            is_indexing,
        } = self.client.index_stats(&name).await?;
        Ok(IndexStatus {
            name,
            exists: true,
            documents: number_of_documents,
            indexing: is_indexing,
        })
    }
}
