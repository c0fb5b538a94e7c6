//! Workflow-engine collaborator: starts one execution of the forecasting state machine.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("sdk error: {0}")]
    Sdk(String),
}

/// Handle for a started execution. Dates are carried as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    pub execution_arn: String,
    pub start_date: String,
}

#[async_trait]
pub trait WorkflowStarter: Send + Sync {
    async fn start_execution(&self, name: &str, input: &str)
        -> Result<WorkflowExecution, WorkflowError>;
}

#[cfg(feature = "runtime")]
pub use step_functions::StepFunctionsStarter;

#[cfg(feature = "runtime")]
mod step_functions {
    use async_trait::async_trait;
    use aws_config::BehaviorVersion;
    use aws_sdk_sfn::primitives::DateTimeFormat;
    use aws_sdk_sfn::Client;

    use super::{WorkflowError, WorkflowExecution, WorkflowStarter};

    #[derive(Clone)]
    pub struct StepFunctionsStarter {
        client: Client,
        state_machine_arn: String,
    }

    impl StepFunctionsStarter {
        pub async fn new(state_machine_arn: impl Into<String>) -> Result<Self, WorkflowError> {
            let state_machine_arn = state_machine_arn.into();
            if state_machine_arn.trim().is_empty() {
                return Err(WorkflowError::Configuration(
                    "state machine ARN cannot be empty".into(),
                ));
            }
            let shared_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
            Ok(Self {
                client: Client::new(&shared_config),
                state_machine_arn,
            })
        }

        /// Reads the state machine ARN from `STEP_FUNCTIONS_ARN`.
        pub async fn from_env() -> Result<Self, WorkflowError> {
            let arn = std::env::var("STEP_FUNCTIONS_ARN").map_err(|_| {
                WorkflowError::Configuration("STEP_FUNCTIONS_ARN must be set".into())
            })?;
            Self::new(arn).await
        }
    }

    #[async_trait]
    impl WorkflowStarter for StepFunctionsStarter {
        async fn start_execution(
            &self,
            name: &str,
            input: &str,
        ) -> Result<WorkflowExecution, WorkflowError> {
            let output = self
                .client
                .start_execution()
                .state_machine_arn(&self.state_machine_arn)
                .name(name)
                .input(input)
                .send()
                .await
                .map_err(|err| WorkflowError::Sdk(err.to_string()))?;

            let start_date = output
                .start_date()
                .fmt(DateTimeFormat::DateTime)
                .map_err(|err| WorkflowError::Sdk(err.to_string()))?;

            Ok(WorkflowExecution {
                execution_arn: output.execution_arn().to_string(),
                start_date,
            })
        }
    }
}
