//! Model Router
//!
//! Maps each agent role to the provider that serves it and applies the
//! per-call timeout. Generators may each carry their own credentials, so the
//! router holds one provider per generator plus one per shared agent.

use super::{LLMError, LLMProvider, Message};
use crate::config::Config;
use crate::llm::ollama::OllamaProvider;
use crate::llm::openai::OpenAIProvider;
use crate::secrets::SecretResolver;
use sdk::errors::EngineError;
use sdk::types::{GeneratorIndex, GENERATOR_COUNT};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// The agents the orchestrator talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentRole {
    Generator(GeneratorIndex),
    Critic,
    Editor,
    Prompter,
}

impl AgentRole {
    /// Index into per-generator credentials, `None` for shared agents
    pub fn generator(self) -> Option<GeneratorIndex> {
        match self {
            AgentRole::Generator(index) => Some(index),
            _ => None,
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentRole::Generator(index) => write!(f, "generator_{}", index),
            AgentRole::Critic => write!(f, "critic"),
            AgentRole::Editor => write!(f, "editor"),
            AgentRole::Prompter => write!(f, "prompter"),
        }
    }
}

/// Routes agent calls to providers with a per-call timeout
#[derive(Clone)]
pub struct ModelRouter {
    generators: [Arc<dyn LLMProvider>; GENERATOR_COUNT],
    critic: Arc<dyn LLMProvider>,
    editor: Arc<dyn LLMProvider>,
    prompter: Arc<dyn LLMProvider>,
    timeout: Duration,
}

impl ModelRouter {
    /// Route every role to the same provider
    pub fn uniform(provider: Arc<dyn LLMProvider>, timeout: Duration) -> Self {
        Self {
            generators: [provider.clone(), provider.clone(), provider.clone()],
            critic: provider.clone(),
            editor: provider.clone(),
            prompter: provider,
            timeout,
        }
    }

    /// Replace the provider serving one role
    pub fn with_role(mut self, role: AgentRole, provider: Arc<dyn LLMProvider>) -> Self {
        match role {
            AgentRole::Generator(index) => self.generators[index.slot()] = provider,
            AgentRole::Critic => self.critic = provider,
            AgentRole::Editor => self.editor = provider,
            AgentRole::Prompter => self.prompter = provider,
        }
        self
    }

    /// Build the router described by the configuration
    ///
    /// # Errors
    /// Returns `EngineError::MissingCredential` if a cloud provider is
    /// selected and some agent has no API key.
    pub fn from_config(config: &Config, secrets: &SecretResolver) -> Result<Self, EngineError> {
        let timeout = config.orchestration.call_timeout();

        match config.llm.default_provider.as_str() {
            "ollama" => {
                let ollama = &config.llm.ollama;
                let provider = OllamaProvider::new(&ollama.base_url, &ollama.model);
                Ok(Self::uniform(Arc::new(provider), timeout))
            }
            "openai" => {
                let openai = &config.llm.openai;
                let shared: Arc<dyn LLMProvider> = Arc::new(OpenAIProvider::new(
                    openai.clone(),
                    secrets.resolve(None)?,
                ));

                let mut router = Self::uniform(shared, timeout);
                for index in GeneratorIndex::ALL {
                    let key = secrets.resolve(Some(index))?;
                    router = router.with_role(
                        AgentRole::Generator(index),
                        Arc::new(OpenAIProvider::new(openai.clone(), key)),
                    );
                }
                Ok(router)
            }
            other => Err(EngineError::Config(format!(
                "Unsupported provider '{}'",
                other
            ))),
        }
    }

    /// Provider serving a role
    pub fn provider(&self, role: AgentRole) -> &Arc<dyn LLMProvider> {
        match role {
            AgentRole::Generator(index) => &self.generators[index.slot()],
            AgentRole::Critic => &self.critic,
            AgentRole::Editor => &self.editor,
            AgentRole::Prompter => &self.prompter,
        }
    }

    /// Per-call timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Call the provider for a role, bounded by the per-call timeout
    pub async fn call(&self, role: AgentRole, messages: &[Message]) -> super::Result<String> {
        let provider = self.provider(role);
        tracing::debug!(
            "Calling {} for {} ({} messages, timeout {}s)",
            provider.name(),
            role,
            messages.len(),
            self.timeout.as_secs()
        );

        match tokio::time::timeout(self.timeout, provider.generate(messages)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    "Provider {} timed out after {}s serving {}",
                    provider.name(),
                    self.timeout.as_secs(),
                    role
                );
                Err(LLMError::Timeout)
            }
        }
    }

    /// Check the health of the provider behind every role
    /// Returns a list of (role, provider_name, is_healthy)
    pub async fn check_health(&self) -> Vec<(AgentRole, String, bool)> {
        let mut roles: Vec<AgentRole> = GeneratorIndex::ALL
            .into_iter()
            .map(AgentRole::Generator)
            .collect();
        roles.extend([AgentRole::Critic, AgentRole::Editor, AgentRole::Prompter]);

        let mut results = Vec::with_capacity(roles.len());
        for role in roles {
            let provider = self.provider(role);
            let healthy = provider.check_health().await;
            results.push((role, provider.name().to_string(), healthy));
        }
        results
    }
}
