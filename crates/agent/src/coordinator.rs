//! The turn coordinator.
//!
//! One [`Coordinator::chat`] call is one turn:
//!
//! 1. Record the user message and bump the interaction counter.
//! 2. Summarize memory and ask the backend for a reply (the only slow step,
//!    bounded by the generation timeout).
//! 3. Run any `TOOL[...]` calls in the reply against the live store.
//! 4. Record the assistant reply and prune the conversation log.
//!
//! If generation fails the turn ends with an apology. The user message and
//! the counter bump are already committed and stay that way.

use keepsake_config::{AppConfig, PersonaConfig};
use keepsake_core::agent::{MemoryStats, Reply, TurnState};
use keepsake_core::error::{GenerationError, Result, StoreError};
use keepsake_core::generator::Generator;
use keepsake_core::memory::{DEFAULT_HISTORY_KEEP_LAST, MemorySnapshot, MemoryStore};
use keepsake_core::message::Role;
use keepsake_core::tool::{Tool, ToolRegistry};
use keepsake_tools::{SandboxLimits, default_registry, protocol};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::prompt;
use crate::summary::{self, ContextBuilder};

const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_CODE_TIMEOUT: Duration = Duration::from_secs(2);

/// A procedure as returned by the teaching interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureRecall {
    pub name: String,
    pub steps: Vec<String>,
}

/// Drives conversation turns against one store and one generation backend.
pub struct Coordinator {
    store: Arc<dyn MemoryStore>,
    generator: Arc<dyn Generator>,
    tools: ToolRegistry,
    persona: PersonaConfig,
    context: ContextBuilder,
    online: bool,
    keep_last: usize,
    generation_timeout: Duration,
    state: TurnState,
}

impl Coordinator {
    /// Start building a coordinator with default settings.
    pub fn builder(store: Arc<dyn MemoryStore>, generator: Arc<dyn Generator>) -> CoordinatorBuilder {
        CoordinatorBuilder::new(store, generator)
    }

    /// Build a coordinator from application configuration.
    pub fn from_config(
        config: &AppConfig,
        store: Arc<dyn MemoryStore>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self::builder(store, generator)
            .persona(config.persona.clone())
            .online(config.online)
            .history_keep_last(config.memory.history_keep_last)
            .context_window(config.memory.context_window)
            .generation_timeout(Duration::from_secs(config.backend.timeout_secs))
            .sandbox(
                SandboxLimits {
                    max_steps: config.sandbox.max_steps,
                    max_collection_len: config.sandbox.max_collection_len,
                },
                Duration::from_millis(config.sandbox.timeout_ms),
            )
            .build()
    }

    /// Run one turn.
    ///
    /// Store write failures are returned as errors. Generation failures
    /// are not: they produce an apology [`Reply`].
    pub async fn chat(&mut self, message: &str) -> Result<Reply> {
        let outcome = self.run_turn(message).await;
        self.enter(TurnState::Idle);
        outcome
    }

    async fn run_turn(&mut self, message: &str) -> Result<Reply> {
        self.store.append_conversation(Role::User, message).await?;
        let count = self.store.increment_interaction_count().await?;
        info!(interaction = count, "Turn started");
        self.enter(TurnState::AwaitingGeneration);

        let summary = self.context.summarize(self.store.as_ref(), self.online).await;
        let prompt = prompt::assemble(&self.persona, &self.tools.describe(), &summary, message);
        debug!(prompt_len = prompt.len(), "Prompt assembled");

        let raw = match self.generate(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, backend = self.generator.name(), "Generation failed");
                return Ok(Reply::apology(e));
            }
        };

        self.enter(TurnState::ProcessingTools);
        let text = protocol::process(&raw, &self.tools).await;

        self.enter(TurnState::Persisted);
        self.store.append_conversation(Role::Assistant, &text).await?;
        let pruned = self.store.prune_conversation(self.keep_last).await?;
        if pruned > 0 {
            debug!(pruned, "Pruned conversation log");
        }

        info!(interaction = count, reply_len = text.len(), "Turn finished");
        Ok(Reply::completed(text))
    }

    async fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationError> {
        match tokio::time::timeout(self.generation_timeout, self.generator.generate(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout {
                timeout_secs: self.generation_timeout.as_secs(),
            }),
        }
    }

    fn enter(&mut self, next: TurnState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Turn state");
            self.state = next;
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    // ── Teaching interface ───────────────────────────────────────────────

    /// Store a multi-step procedure, bypassing the tool protocol.
    pub async fn teach_procedure(
        &self,
        name: &str,
        steps: &[String],
    ) -> std::result::Result<String, StoreError> {
        self.store.learn_procedure(name, steps).await
    }

    pub async fn recall_procedure(
        &self,
        name: &str,
    ) -> std::result::Result<Option<ProcedureRecall>, StoreError> {
        Ok(self
            .store
            .get_procedure(name)
            .await?
            .map(|steps| ProcedureRecall {
                name: name.to_string(),
                steps,
            }))
    }

    pub async fn list_procedures(&self) -> std::result::Result<Vec<String>, StoreError> {
        self.store.list_procedure_names().await
    }

    // ── Front-end helpers ────────────────────────────────────────────────

    /// First-run introduction, or a welcome back with the chat count.
    pub async fn greeting(&self) -> String {
        match summary::read_interaction_count(self.store.as_ref()).await {
            0 => format!("Hiii! I'm {}! What should I call you?", self.persona.name),
            n => format!("Welcome back! We've chatted {n} times before!"),
        }
    }

    pub async fn stats(&self) -> MemoryStats {
        let store = self.store.as_ref();
        MemoryStats {
            interaction_count: summary::read_interaction_count(store).await,
            facts_count: store.count_facts().await.unwrap_or_else(|e| {
                warn!(error = %e, "Could not count facts");
                0
            }),
            procedures: store.list_procedure_names().await.unwrap_or_else(|e| {
                warn!(error = %e, "Could not list procedures");
                Vec::new()
            }),
            online: self.online,
        }
    }

    pub async fn export_memory(&self) -> std::result::Result<MemorySnapshot, StoreError> {
        self.store.export_all().await
    }

    /// Add or replace a caller-supplied tool.
    pub fn register_tool(&mut self, tool: Box<dyn Tool>) {
        info!(tool = tool.name(), "Registering tool");
        self.tools.register(tool);
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn set_online(&mut self, online: bool) {
        self.online = online;
    }

    pub fn persona(&self) -> &PersonaConfig {
        &self.persona
    }

    /// Close the store. The coordinator cannot be used afterwards.
    pub async fn shutdown(self) {
        info!("Shutting down");
        self.store.close().await;
    }
}

/// Builder for [`Coordinator`].
pub struct CoordinatorBuilder {
    store: Arc<dyn MemoryStore>,
    generator: Arc<dyn Generator>,
    tools: Option<ToolRegistry>,
    persona: PersonaConfig,
    window: usize,
    online: bool,
    keep_last: usize,
    generation_timeout: Duration,
    sandbox_limits: SandboxLimits,
    code_timeout: Duration,
}

impl CoordinatorBuilder {
    fn new(store: Arc<dyn MemoryStore>, generator: Arc<dyn Generator>) -> Self {
        Self {
            store,
            generator,
            tools: None,
            persona: PersonaConfig::default(),
            window: summary::DEFAULT_WINDOW,
            online: true,
            keep_last: DEFAULT_HISTORY_KEEP_LAST,
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
            sandbox_limits: SandboxLimits::default(),
            code_timeout: DEFAULT_CODE_TIMEOUT,
        }
    }

    pub fn persona(mut self, persona: PersonaConfig) -> Self {
        self.persona = persona;
        self
    }

    pub fn online(mut self, online: bool) -> Self {
        self.online = online;
        self
    }

    pub fn history_keep_last(mut self, keep_last: usize) -> Self {
        self.keep_last = keep_last;
        self
    }

    pub fn context_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    /// Limits for the built-in `execute_code` tool.
    pub fn sandbox(mut self, limits: SandboxLimits, timeout: Duration) -> Self {
        self.sandbox_limits = limits;
        self.code_timeout = timeout;
        self
    }

    /// Use `tools` instead of the built-in registry.
    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn build(self) -> Coordinator {
        let tools = self.tools.unwrap_or_else(|| {
            default_registry(self.store.clone(), self.sandbox_limits, self.code_timeout)
        });
        Coordinator {
            store: self.store,
            generator: self.generator,
            tools,
            persona: self.persona,
            context: ContextBuilder::new(self.window),
            online: self.online,
            keep_last: self.keep_last,
            generation_timeout: self.generation_timeout,
            state: TurnState::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use keepsake_memory::SqliteStore;
    use std::sync::Mutex;

    /// Returns a fixed reply and remembers every prompt it saw.
    struct Echo {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl Echo {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.into(),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Generator for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    async fn store() -> Arc<dyn MemoryStore> {
        Arc::new(SqliteStore::open_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn prompt_includes_memory_and_message() {
        let echo = Echo::new("Hello!");
        let mut coordinator = Coordinator::builder(store().await, echo.clone())
            .persona(PersonaConfig {
                name: "Kit".into(),
                system_prompt: "You are Kit.".into(),
            })
            .build();

        let reply = coordinator.chat("hi there").await.unwrap();
        assert!(reply.is_completed());
        assert_eq!(reply.text, "Hello!");

        let prompt = echo.prompts.lock().unwrap().pop().unwrap();
        assert!(prompt.starts_with("You are Kit.\nTOOLS AVAILABLE:"));
        assert!(prompt.contains("[MEMORY]\nChats: 1 | Online: Yes\nRecent:\n["));
        assert!(prompt.contains("] U: hi there\n\nUser: hi there\nKit:"));
        assert_eq!(coordinator.state(), TurnState::Idle);
    }

    #[tokio::test]
    async fn greeting_changes_after_first_turn() {
        let mut coordinator = Coordinator::builder(store().await, Echo::new("ok")).build();
        assert!(coordinator.greeting().await.starts_with("Hiii! I'm Assistant!"));

        coordinator.chat("one").await.unwrap();
        coordinator.chat("two").await.unwrap();
        assert_eq!(
            coordinator.greeting().await,
            "Welcome back! We've chatted 2 times before!"
        );
    }

    #[tokio::test]
    async fn teach_and_recall_multi_step() {
        let coordinator = Coordinator::builder(store().await, Echo::new("ok")).build();
        let steps = vec!["boil water".to_string(), "steep 3 minutes".to_string()];
        let msg = coordinator.teach_procedure("make tea", &steps).await.unwrap();
        assert_eq!(msg, "Yay! I learned how to make tea!");

        let recall = coordinator.recall_procedure("make tea").await.unwrap().unwrap();
        assert_eq!(recall.name, "make tea");
        assert_eq!(recall.steps, steps);
        assert!(coordinator.recall_procedure("juggle").await.unwrap().is_none());
        assert_eq!(coordinator.list_procedures().await.unwrap(), vec!["make tea"]);
    }

    #[tokio::test]
    async fn stats_reflect_memory() {
        let mut coordinator = Coordinator::builder(store().await, Echo::new("TOOL[learn_fact](color, blue)"))
            .online(false)
            .build();
        coordinator.chat("remember my color").await.unwrap();

        let stats = coordinator.stats().await;
        assert_eq!(stats.interaction_count, 1);
        assert_eq!(stats.facts_count, 1);
        assert!(stats.procedures.is_empty());
        assert!(!stats.online);
    }

    #[tokio::test]
    async fn store_write_failure_is_an_error() {
        let db = store().await;
        let mut coordinator = Coordinator::builder(db.clone(), Echo::new("ok")).build();
        db.close().await;

        let err = coordinator.chat("hello").await.unwrap_err();
        assert!(matches!(
            err,
            keepsake_core::Error::Store(StoreError::Closed)
        ));
        assert_eq!(coordinator.state(), TurnState::Idle);
    }

    #[tokio::test]
    async fn from_config_uses_persona_and_window() {
        let mut config = AppConfig::default();
        config.persona.name = "Pip".into();
        config.memory.context_window = 0;
        let echo = Echo::new("ok");
        let mut coordinator = Coordinator::from_config(&config, store().await, echo.clone());

        coordinator.chat("hi").await.unwrap();
        let prompt = echo.prompts.lock().unwrap().pop().unwrap();
        assert!(prompt.ends_with("User: hi\nPip:"));
        assert!(!prompt.contains("Recent:"));
    }
}
