//! Shared test fixtures for node executor unit tests.

#![cfg(test)]

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use pyspur_core::error::Result;
use pyspur_core::node::{CancellationToken, ExecutionContext, SubrunDispatch};
use pyspur_store::WorkflowDefinition;

pub struct NoopSubrun;

#[async_trait]
impl SubrunDispatch for NoopSubrun {
    async fn run_subworkflow(
        &self,
        _parent_run_id: Uuid,
        _definition: WorkflowDefinition,
        _inputs: Value,
    ) -> Result<std::collections::HashMap<String, Value>> {
        Ok(Default::default())
    }
}

pub fn noop_context() -> ExecutionContext {
    ExecutionContext::new(Uuid::new_v4(), "node", None, CancellationToken::new(), Arc::new(NoopSubrun))
}
