use anyhow::Result;
use log::{error, info};
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;

use crate::base::WorkflowRunRepository;
use crate::models::WorkflowRunStatus;

/// Records a workflow execution in the run history.
///
/// The run is `completed` when the result's `error_message` is null or absent and `failed`
/// otherwise. A workflow error marks the run `error` and is passed back to the caller.
pub async fn run_workflow_with_history<T, F>(
    runs: &dyn WorkflowRunRepository,
    workflow_name: &str,
    input_data: &Value,
    workflow: F,
) -> Result<T>
where
    T: Serialize,
    F: Future<Output = Result<T>>,
{
    let run_id = runs.start_run(workflow_name, &input_data.to_string())?;
    info!("Started workflow run ID: {}", run_id);

    match workflow.await {
        Ok(result) => {
            let output = serde_json::to_value(&result)?;
            let status = match output.get("error_message") {
                None | Some(Value::Null) => WorkflowRunStatus::Completed,
                Some(_) => WorkflowRunStatus::Failed,
            };
            runs.finish_run(run_id, status, &output.to_string())?;

            info!("Workflow result:\n{}", serde_json::to_string_pretty(&output)?);
            info!("Workflow completed with status: {}", status);
            Ok(result)
        }
        Err(e) => {
            error!("Unhandled error in workflow {}: {:#}", workflow_name, e);
            let output = json!({ "error_message": format!("{:#}", e) });
            if let Err(db_error) = runs.finish_run(run_id, WorkflowRunStatus::Error, &output.to_string()) {
                error!("Failed to update workflow history: {}", db_error);
            }
            Err(e)
        }
    }
}
