/// Background cron scheduler service
///
/// Fires scheduled runs for definitions carrying a cron expression, using
/// tokio-cron-scheduler. Jobs are hot-reloadable: updating a definition swaps
/// its job without restarting the scheduler, and a job whose definition was
/// deleted skips silently on its next tick.

use crate::{
    runtime::coordinator::RunCoordinator,
    workflow::{registry::WorkflowRegistry, types::WorkflowDefinition},
};
use anyhow::Result;
use serde_json::json;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

pub struct CronSchedulerService {
    scheduler: Arc<RwLock<JobScheduler>>,
    /// Job UUIDs by workflow id, for removal on reload/delete
    job_uuid_map: Arc<RwLock<HashMap<String, Uuid>>>,
    registry: Arc<WorkflowRegistry>,
    coordinator: Arc<RunCoordinator>,
}

impl CronSchedulerService {
    pub async fn new(
        registry: Arc<WorkflowRegistry>,
        coordinator: Arc<RunCoordinator>,
    ) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler: Arc::new(RwLock::new(scheduler)),
            job_uuid_map: Arc::new(RwLock::new(HashMap::new())),
            registry,
            coordinator,
        })
    }

    /// Register every scheduled definition and start ticking
    pub async fn start(&self) -> Result<()> {
        tracing::info!("⏰ Starting cron scheduler service");

        let scheduled = self.registry.scheduled_workflows();
        let count = scheduled.len();
        for definition in scheduled {
            self.add_or_update_schedule(&definition).await?;
        }

        {
            let scheduler = self.scheduler.read().await;
            scheduler.start().await?;
        }

        tracing::info!("✅ Cron scheduler started with {} scheduled workflows", count);
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        tracing::info!("⏹️ Stopping cron scheduler service");

        self.job_uuid_map.write().await.clear();
        {
            let mut scheduler = self.scheduler.write().await;
            scheduler.shutdown().await?;
        }

        Ok(())
    }

    /// Add or replace the cron job of one definition (hot reload)
    ///
    /// Definitions without a schedule drop any job they previously had.
    pub async fn add_or_update_schedule(&self, definition: &WorkflowDefinition) -> Result<()> {
        self.remove_schedule(&definition.id).await;

        let Some(schedule) = definition.schedule.as_deref() else {
            return Ok(());
        };

        tracing::info!(
            "⏰ Scheduling workflow '{}' with cron expression '{}'",
            definition.id,
            schedule
        );

        let workflow_id = definition.id.clone();
        let registry = Arc::clone(&self.registry);
        let coordinator = Arc::clone(&self.coordinator);

        let job = Job::new_async(schedule, move |_uuid, _l| {
            let workflow_id = workflow_id.clone();
            let registry = Arc::clone(&registry);
            let coordinator = Arc::clone(&coordinator);

            Box::pin(async move {
                tracing::debug!("🔔 Cron tick for workflow: {}", workflow_id);

                // The definition may have been deleted since scheduling;
                // the job then skips without touching the scheduler.
                let Some(definition) = registry.get_workflow(&workflow_id) else {
                    tracing::debug!("⏭️ Skipping cron tick for deleted workflow: {}", workflow_id);
                    return;
                };

                let variables = match registry.storage().load_variables(&workflow_id).await {
                    Ok(variables) => variables,
                    Err(e) => {
                        tracing::warn!("⚠️ Failed to load variables for '{}': {}", workflow_id, e);
                        HashMap::new()
                    }
                };

                let run = coordinator
                    .run(&definition, json!({}), variables, "schedule")
                    .await;
                tracing::info!(
                    "🏁 Scheduled run {} of '{}' finished: {}",
                    run.id,
                    workflow_id,
                    run.status.as_str()
                );
            })
        })?;

        let job_uuid = {
            let scheduler = self.scheduler.write().await;
            scheduler.add(job).await?
        };
        self.job_uuid_map
            .write()
            .await
            .insert(definition.id.clone(), job_uuid);

        Ok(())
    }

    /// Drop the cron job of a workflow, if it has one
    pub async fn remove_schedule(&self, workflow_id: &str) {
        let removed = self.job_uuid_map.write().await.remove(workflow_id);
        if let Some(job_uuid) = removed {
            let scheduler = self.scheduler.read().await;
            if let Err(e) = scheduler.remove(&job_uuid).await {
                tracing::warn!("⚠️ Failed to remove cron job for '{}': {}", workflow_id, e);
            } else {
                tracing::debug!("🛑 Removed cron job for workflow: {}", workflow_id);
            }
        }
    }
}
