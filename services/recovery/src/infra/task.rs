use anyhow::Context as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::repository::{TaskClient, TaskFactory};
use crate::domain::types::{CausingEvent, FailureRecord, TaskDescriptor};
use crate::error::TaskError;

// ── Task system client ───────────────────────────────────────────────────────

/// REST client for the human-workflow system.
#[derive(Clone)]
pub struct GatewayTaskClient {
    client: Client,
    base_url: String,
}

impl GatewayTaskClient {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }
}

#[derive(Serialize)]
struct CreateTaskBody<'a> {
    /// Lets the task system deduplicate retried creations.
    reference_id: Uuid,
    title: &'a str,
    details: &'a str,
}

#[derive(Deserialize)]
struct CreatedTask {
    task_id: Uuid,
}

impl TaskClient for GatewayTaskClient {
    async fn create_task(&self, descriptor: &TaskDescriptor) -> Result<Uuid, TaskError> {
        let response = self
            .client
            .post(format!("{}/tasks", self.base_url))
            .json(&CreateTaskBody {
                reference_id: descriptor.failure_record_id,
                title: &descriptor.title,
                details: &descriptor.details,
            })
            .send()
            .await
            .context("send create-task request")?
            .error_for_status()
            .context("create-task response status")?;
        let created: CreatedTask = response
            .json()
            .await
            .context("decode create-task response")?;
        Ok(created.task_id)
    }

    async fn close_task(&self, task_id: Uuid) -> Result<(), TaskError> {
        self.client
            .post(format!("{}/tasks/{task_id}/close", self.base_url))
            .send()
            .await
            .context("send close-task request")?
            .error_for_status()
            .context("close-task response status")?;
        Ok(())
    }
}

// ── Task text ────────────────────────────────────────────────────────────────

/// Renders the operator-facing task text for a failure.
#[derive(Clone)]
pub struct DefaultTaskFactory {
    pub service_name: String,
}

impl TaskFactory for DefaultTaskFactory {
    fn describe(&self, record: &FailureRecord, event: &CausingEvent) -> TaskDescriptor {
        let title = format!(
            "{} failed processing {}",
            record.reporter_service, event.event_name
        );
        let mut details = format!(
            "Service {} reported {} while processing message {} from {} (topic {}).\n\nError: {}",
            record.reporter_service,
            record.error_code,
            event.event_id.as_deref().unwrap_or("<unknown>"),
            event.publisher_service,
            event.topic,
            record.error_message,
        );
        if let Some(description) = &record.error_description {
            details.push_str("\n\n");
            details.push_str(description);
        }
        details.push_str(&format!(
            "\n\nRecorded by {} as failure {}.",
            self.service_name, record.id
        ));
        TaskDescriptor {
            failure_record_id: record.id,
            title,
            details,
        }
    }
}
