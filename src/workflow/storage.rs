/// SQLite persistence for workflow definitions and variables
///
/// Definitions are stored as one JSON column with indexed lookup fields, so
/// the definition shape can evolve without migrations. Variables live in
/// their own table and are resolved once per run at trigger time.

use crate::workflow::types::{WorkflowDefinition, WorkflowVariable};
use anyhow::Result;
use serde_json::Value;
use sqlx::{sqlite::SqlitePool, Row};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct WorkflowStorage {
    pool: SqlitePool,
}

impl WorkflowStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the workflows / workflow_variables tables. Safe to call
    /// repeatedly (IF NOT EXISTS).
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflows (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                definition JSON NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflow_variables (
                workflow_id TEXT NOT NULL,
                name TEXT NOT NULL,
                value JSON NOT NULL,
                PRIMARY KEY (workflow_id, name)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_workflows_name ON workflows(name)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Store a new definition or replace an existing one (UPSERT)
    pub async fn save_workflow(&self, definition: &WorkflowDefinition) -> Result<()> {
        let definition_json = serde_json::to_string(definition)?;

        sqlx::query(
            r#"
            INSERT INTO workflows (id, name, definition, updated_at)
            VALUES (?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                definition = excluded.definition,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&definition.id)
        .bind(&definition.name)
        .bind(&definition_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_workflow(&self, id: &str) -> Result<Option<WorkflowDefinition>> {
        let row = sqlx::query("SELECT definition FROM workflows WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let definition_json: String = row.get("definition");
                Ok(Some(serde_json::from_str(&definition_json)?))
            }
            None => Ok(None),
        }
    }

    /// List definitions with basic metadata, newest update first
    pub async fn list_workflows(&self) -> Result<Vec<WorkflowMetadata>> {
        let rows = sqlx::query(
            "SELECT id, name, created_at, updated_at FROM workflows ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| WorkflowMetadata {
                id: row.get("id"),
                name: row.get("name"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            })
            .collect())
    }

    /// Load every definition, for registry initialization and hot reloads
    pub async fn load_all_workflows(&self) -> Result<HashMap<String, WorkflowDefinition>> {
        let rows = sqlx::query("SELECT id, definition FROM workflows")
            .fetch_all(&self.pool)
            .await?;

        let mut workflows = HashMap::new();
        for row in rows {
            let id: String = row.get("id");
            let definition_json: String = row.get("definition");
            workflows.insert(id, serde_json::from_str(&definition_json)?);
        }

        Ok(workflows)
    }

    /// Delete a definition and its variables. Returns false if unknown.
    pub async fn delete_workflow(&self, id: &str) -> Result<bool> {
        sqlx::query("DELETE FROM workflow_variables WHERE workflow_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_variable(&self, variable: &WorkflowVariable) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_variables (workflow_id, name, value)
            VALUES (?, ?, ?)
            ON CONFLICT(workflow_id, name) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(&variable.workflow_id)
        .bind(&variable.name)
        .bind(variable.value.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete_variable(&self, workflow_id: &str, name: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM workflow_variables WHERE workflow_id = ? AND name = ?")
                .bind(workflow_id)
                .bind(name)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Variables of one workflow as the name → value map handed to runs
    pub async fn load_variables(&self, workflow_id: &str) -> Result<HashMap<String, Value>> {
        let rows = sqlx::query("SELECT name, value FROM workflow_variables WHERE workflow_id = ?")
            .bind(workflow_id)
            .fetch_all(&self.pool)
            .await?;

        let mut variables = HashMap::new();
        for row in rows {
            let name: String = row.get("name");
            let value: String = row.get("value");
            variables.insert(name, serde_json::from_str(&value).unwrap_or(Value::Null));
        }

        Ok(variables)
    }
}

/// Basic definition metadata for listing operations
#[derive(Debug, serde::Serialize)]
pub struct WorkflowMetadata {
    pub id: String,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::NodeSpec;
    use serde_json::json;

    async fn storage() -> WorkflowStorage {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let storage = WorkflowStorage::new(pool);
        storage.init_schema().await.unwrap();
        storage
    }

    fn definition(id: &str) -> WorkflowDefinition {
        WorkflowDefinition {
            id: id.to_string(),
            name: format!("{id} name"),
            nodes: vec![NodeSpec {
                id: "n1".to_string(),
                name: "first".to_string(),
                node_type: "script".to_string(),
                config: json!({"script": "return input"}),
                retry_override: None,
            }],
            edges: vec![],
            timeout_seconds: 300,
            max_retries: 3,
            retry_delay_seconds: 0,
            schedule: None,
        }
    }

    #[tokio::test]
    async fn save_get_delete_round_trip() {
        let storage = storage().await;
        storage.save_workflow(&definition("wf-1")).await.unwrap();

        let loaded = storage.get_workflow("wf-1").await.unwrap().unwrap();
        assert_eq!(loaded.name, "wf-1 name");
        assert_eq!(loaded.nodes.len(), 1);

        assert!(storage.delete_workflow("wf-1").await.unwrap());
        assert!(storage.get_workflow("wf-1").await.unwrap().is_none());
        assert!(!storage.delete_workflow("wf-1").await.unwrap());
    }

    #[tokio::test]
    async fn upsert_replaces_definition() {
        let storage = storage().await;
        storage.save_workflow(&definition("wf-1")).await.unwrap();

        let mut updated = definition("wf-1");
        updated.name = "renamed".to_string();
        storage.save_workflow(&updated).await.unwrap();

        let loaded = storage.get_workflow("wf-1").await.unwrap().unwrap();
        assert_eq!(loaded.name, "renamed");
        assert_eq!(storage.list_workflows().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn variables_round_trip() {
        let storage = storage().await;
        storage
            .set_variable(&WorkflowVariable {
                workflow_id: "wf-1".to_string(),
                name: "region".to_string(),
                value: json!("eu-west"),
            })
            .await
            .unwrap();
        storage
            .set_variable(&WorkflowVariable {
                workflow_id: "wf-1".to_string(),
                name: "region".to_string(),
                value: json!("us-east"),
            })
            .await
            .unwrap();

        let variables = storage.load_variables("wf-1").await.unwrap();
        assert_eq!(variables.len(), 1);
        assert_eq!(variables["region"], json!("us-east"));

        assert!(storage.delete_variable("wf-1", "region").await.unwrap());
        assert!(storage.load_variables("wf-1").await.unwrap().is_empty());
    }
}
