//! Maps an object-created notification onto a single workflow execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::workflow::{WorkflowError, WorkflowStarter};

pub const RUN_ID_FORMAT: &str = "%Y%m%dT%H%M%S";

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("notification did not contain any records")]
    NoRecords,
    #[error("failed to decode notification: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("failed to encode workflow payload: {0}")]
    Encode(#[source] serde_json::Error),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageNotification {
    #[serde(rename = "Records", default)]
    pub records: Vec<NotificationRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationRecord {
    pub s3: StorageEntity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageEntity {
    #[serde(default)]
    pub bucket: Option<BucketEntity>,
    pub object: ObjectEntity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BucketEntity {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectEntity {
    pub key: String,
}

impl StorageNotification {
    pub fn from_json(content: &str) -> Result<Self, TriggerError> {
        serde_json::from_str(content).map_err(TriggerError::Decode)
    }

    /// Key of the first record. Later records are ignored.
    pub fn first_key(&self) -> Result<&str, TriggerError> {
        self.records
            .first()
            .map(|record| record.s3.object.key.as_str())
            .ok_or(TriggerError::NoRecords)
    }
}

/// Input document handed to the workflow execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInput {
    pub uid: String,
    pub fileuri: String,
    pub resource_tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    pub name: String,
    pub input: WorkflowInput,
}

pub fn run_identifier(now: DateTime<Utc>) -> String {
    now.format(RUN_ID_FORMAT).to_string()
}

pub fn build_start_request(
    notification: &StorageNotification,
    now: DateTime<Utc>,
    resource_prefix: &str,
) -> Result<StartRequest, TriggerError> {
    let key = notification.first_key()?;
    let uid = run_identifier(now);
    Ok(StartRequest {
        name: uid.clone(),
        input: WorkflowInput {
            resource_tag: format!("{resource_prefix}-{uid}"),
            fileuri: key.to_string(),
            uid,
        },
    })
}

/// Starts exactly one execution and returns its handle as JSON text.
pub async fn dispatch(
    starter: &dyn WorkflowStarter,
    notification: &StorageNotification,
    now: DateTime<Utc>,
    resource_prefix: &str,
) -> Result<String, TriggerError> {
    let request = build_start_request(notification, now, resource_prefix)?;
    let input = serde_json::to_string(&request.input).map_err(TriggerError::Encode)?;

    let execution = starter.start_execution(&request.name, &input).await?;
    info!(
        name = %request.name,
        fileuri = %request.input.fileuri,
        execution_arn = %execution.execution_arn,
        "started workflow execution"
    );

    serde_json::to_string(&execution).map_err(TriggerError::Encode)
}
