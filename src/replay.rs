//! Loads a previously saved counterexample plan and drives a single
//! orchestrator run against it, instead of the search loop.

use crate::entities::{FailurePlan, ScheduledFailure};
use std::path::Path;

pub async fn load_plan(path: impl AsRef<Path>) -> anyhow::Result<FailurePlan> {
    let contents = tokio::fs::read_to_string(path).await?;
    let entries: Vec<ScheduledFailure> = serde_json::from_str(&contents)?;
    Ok(FailurePlan::new(entries))
}
