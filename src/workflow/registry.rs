/// Hot-reload workflow registry using ArcSwap
///
/// Lock-free, atomic updates to the in-memory definition map: every change
/// swaps the whole registry pointer, so concurrent runs keep the definition
/// they started with while new triggers see the fresh one. Structural
/// validation happens at run time in the coordinator, so the registry is a
/// plain cache with no compile step.

use crate::workflow::{storage::WorkflowStorage, types::WorkflowDefinition};
use anyhow::Result;
use arc_swap::ArcSwap;
use std::{collections::HashMap, sync::Arc};

#[derive(Debug)]
pub struct WorkflowRegistry {
    /// Atomic pointer to the definition map, keyed by workflow id
    workflows: ArcSwap<HashMap<String, WorkflowDefinition>>,
    storage: WorkflowStorage,
}

impl WorkflowRegistry {
    pub fn new(storage: WorkflowStorage) -> Self {
        Self {
            workflows: ArcSwap::new(Arc::new(HashMap::new())),
            storage,
        }
    }

    /// Populate the registry from storage at startup
    pub async fn init_from_storage(&self) -> Result<()> {
        let stored = self.storage.load_all_workflows().await?;
        let count = stored.len();
        self.workflows.store(Arc::new(stored));

        tracing::info!("📚 Workflow registry initialized with {} definitions", count);
        Ok(())
    }

    /// Hot-reload one definition from storage (after create or update)
    pub async fn reload_workflow(&self, workflow_id: &str) -> Result<()> {
        let definition = self
            .storage
            .get_workflow(workflow_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("workflow not found: {}", workflow_id))?;

        let current = self.workflows.load();
        let mut updated = (**current).clone();
        updated.insert(workflow_id.to_string(), definition);
        self.workflows.store(Arc::new(updated));

        tracing::info!("🔄 Hot-reloaded workflow: {}", workflow_id);
        Ok(())
    }

    pub fn remove_workflow(&self, workflow_id: &str) {
        let current = self.workflows.load();
        let mut updated = (**current).clone();
        if updated.remove(workflow_id).is_some() {
            self.workflows.store(Arc::new(updated));
            tracing::info!("🗑️ Removed workflow from registry: {}", workflow_id);
        }
    }

    /// Backing store, for callers that also need variables or metadata
    pub fn storage(&self) -> &WorkflowStorage {
        &self.storage
    }

    /// Lock-free definition lookup
    pub fn get_workflow(&self, workflow_id: &str) -> Option<WorkflowDefinition> {
        self.workflows.load().get(workflow_id).cloned()
    }

    pub fn list_workflow_ids(&self) -> Vec<String> {
        self.workflows.load().keys().cloned().collect()
    }

    /// Definitions carrying a cron schedule, for the scheduler service
    pub fn scheduled_workflows(&self) -> Vec<WorkflowDefinition> {
        self.workflows
            .load()
            .values()
            .filter(|d| d.schedule.is_some())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::NodeSpec;
    use serde_json::json;
    use sqlx::sqlite::SqlitePool;

    async fn registry() -> WorkflowRegistry {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let storage = WorkflowStorage::new(pool);
        storage.init_schema().await.unwrap();
        WorkflowRegistry::new(storage)
    }

    fn definition(id: &str, schedule: Option<&str>) -> WorkflowDefinition {
        WorkflowDefinition {
            id: id.to_string(),
            name: id.to_string(),
            nodes: vec![NodeSpec {
                id: "n1".to_string(),
                name: String::new(),
                node_type: "script".to_string(),
                config: json!({"script": "return input"}),
                retry_override: None,
            }],
            edges: vec![],
            timeout_seconds: 300,
            max_retries: 3,
            retry_delay_seconds: 0,
            schedule: schedule.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn reload_makes_definition_visible() {
        let registry = registry().await;
        registry.init_from_storage().await.unwrap();
        assert!(registry.get_workflow("wf-1").is_none());

        registry.storage.save_workflow(&definition("wf-1", None)).await.unwrap();
        registry.reload_workflow("wf-1").await.unwrap();

        assert!(registry.get_workflow("wf-1").is_some());
        registry.remove_workflow("wf-1");
        assert!(registry.get_workflow("wf-1").is_none());
    }

    #[tokio::test]
    async fn scheduled_workflows_are_filtered() {
        let registry = registry().await;
        registry.storage.save_workflow(&definition("wf-cron", Some("0 * * * * *"))).await.unwrap();
        registry.storage.save_workflow(&definition("wf-plain", None)).await.unwrap();
        registry.init_from_storage().await.unwrap();

        let scheduled = registry.scheduled_workflows();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].id, "wf-cron");
    }
}
