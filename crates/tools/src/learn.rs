//! Teaching tools — let the model write facts and procedures into memory.
//!
//! Both tools take two comma-separated arguments and return the store's
//! confirmation text. A procedure taught this way always has exactly one
//! step: the whole second argument. Multi-step procedures are taught
//! through the coordinator instead.

use async_trait::async_trait;
use keepsake_core::error::{StoreError, ToolError};
use keepsake_core::memory::MemoryStore;
use keepsake_core::tool::{Arity, Tool, ToolArgs};
use std::sync::Arc;
use tracing::info;

fn pair(tool: &str, args: ToolArgs) -> Result<(String, String), ToolError> {
    match args {
        ToolArgs::Pair(a, b) if !a.is_empty() => Ok((a, b)),
        ToolArgs::Pair(..) => Err(ToolError::InvalidArguments(format!(
            "{tool} needs a non-empty first argument"
        ))),
        ToolArgs::Single(_) => Err(ToolError::InvalidArguments(
            "expected two comma-separated arguments".into(),
        )),
    }
}

fn store_failure(tool: &str, e: StoreError) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: tool.to_string(),
        reason: e.to_string(),
    }
}

/// Stores `topic → fact`, overwriting any previous fact for the topic.
pub struct LearnFactTool {
    store: Arc<dyn MemoryStore>,
}

impl LearnFactTool {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for LearnFactTool {
    fn name(&self) -> &str {
        "learn_fact"
    }

    fn description(&self) -> &str {
        "Remember a fact about a topic"
    }

    fn usage(&self) -> String {
        "learn_fact(topic, fact)".into()
    }

    fn arity(&self) -> Arity {
        Arity::Pair
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ToolError> {
        let (topic, fact) = pair(self.name(), args)?;
        info!(topic = %topic, "Learning fact");
        self.store
            .learn_fact(&topic, &fact)
            .await
            .map_err(|e| store_failure(self.name(), e))
    }
}

/// Stores a single-step procedure under `name`.
pub struct LearnProcedureTool {
    store: Arc<dyn MemoryStore>,
}

impl LearnProcedureTool {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for LearnProcedureTool {
    fn name(&self) -> &str {
        "learn_procedure"
    }

    fn description(&self) -> &str {
        "Remember how to do something"
    }

    fn usage(&self) -> String {
        "learn_procedure(name, steps)".into()
    }

    fn arity(&self) -> Arity {
        Arity::Pair
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ToolError> {
        let (name, step) = pair(self.name(), args)?;
        info!(procedure = %name, "Learning procedure");
        self.store
            .learn_procedure(&name, &[step])
            .await
            .map_err(|e| store_failure(self.name(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keepsake_memory::SqliteStore;

    async fn store() -> Arc<dyn MemoryStore> {
        Arc::new(SqliteStore::open_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn learn_fact_writes_through() {
        let store = store().await;
        let tool = LearnFactTool::new(store.clone());
        let out = tool
            .execute(ToolArgs::Pair("color".into(), "blue".into()))
            .await
            .unwrap();
        assert!(out.contains("color"));
        assert_eq!(store.get_fact("color").await.unwrap().as_deref(), Some("blue"));
    }

    #[tokio::test]
    async fn learn_procedure_records_one_step() {
        let store = store().await;
        let tool = LearnProcedureTool::new(store.clone());
        let out = tool
            .execute(ToolArgs::Pair("make tea".into(), "boil water, steep, pour".into()))
            .await
            .unwrap();
        assert!(out.contains("make tea"));
        assert_eq!(
            store.get_procedure("make tea").await.unwrap(),
            Some(vec!["boil water, steep, pour".to_string()])
        );
    }

    #[tokio::test]
    async fn single_argument_is_rejected() {
        let tool = LearnFactTool::new(store().await);
        let err = tool
            .execute(ToolArgs::Single("color".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn empty_topic_is_rejected() {
        let tool = LearnFactTool::new(store().await);
        let err = tool
            .execute(ToolArgs::Pair(String::new(), "blue".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn closed_store_is_an_execution_failure() {
        let store = store().await;
        store.close().await;
        let tool = LearnFactTool::new(store);
        let err = tool
            .execute(ToolArgs::Pair("a".into(), "b".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn both_tools_take_pairs() {
        let store = store().await;
        assert_eq!(LearnFactTool::new(store.clone()).arity(), Arity::Pair);
        assert_eq!(LearnProcedureTool::new(store).arity(), Arity::Pair);
    }
}
