//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - run: Start a new run
//! - answer: Resume a run waiting for the user
//! - history: Show the last N runs
//! - replay: Show all messages of a run
//! - doctor: Validate configuration, credentials and providers
//!
//! The run lifecycle itself lives in [`RunContext`] so it can be driven
//! without a terminal.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

use crate::conductor::prompter::{Prompter, RefinementOutcome};
use crate::conductor::prompts::PromptSet;
use crate::conductor::step_log::{JsonlStepLog, StepLog};
use crate::conductor::Orchestrator;
use crate::config::Config;
use crate::db::{Author, ChatRepository, ChatStatus, Database};
use crate::llm::router::ModelRouter;
use crate::secrets::SecretResolver;
use sdk::errors::{EngineError, TriptychErrorExt};
use sdk::types::{GeneratorIndex, RunOutcome, RunState};

/// Reported when a run ends without a document
pub const EXHAUSTED_MESSAGE: &str = "The agents could not produce a document for this request.";

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Result of one invocation of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub iteration_count: u32,
    #[serde(flatten)]
    pub outcome: RunOutcome,
}

/// Everything needed to drive runs and record them
pub struct RunContext {
    database: Database,
    orchestrator: Orchestrator,
    prompter: Option<Prompter>,
    transcript: Option<Arc<JsonlStepLog>>,
}

impl RunContext {
    /// Build the context described by the configuration
    pub async fn from_config(config: &Config) -> Result<Self> {
        let router = ModelRouter::from_config(config, &SecretResolver::new())?;
        let database = Database::new(&config.database_path())
            .await
            .context("Failed to open database")?;
        let transcript = Arc::new(JsonlStepLog::spawn(config.logs_dir()));

        let mut context = Self::new(config, router, database, Arc::clone(&transcript) as Arc<dyn StepLog>)?;
        context.transcript = Some(transcript);
        Ok(context)
    }

    /// Build a context around an existing router, database and step log
    pub fn new(
        config: &Config,
        router: ModelRouter,
        database: Database,
        step_log: Arc<dyn StepLog>,
    ) -> Result<Self> {
        let prompts = Arc::new(
            PromptSet::load(&config.orchestration.prompts_dir)
                .context("Failed to load prompt templates")?,
        );
        let router = Arc::new(router);

        let prompter = config.orchestration.refine_request.then(|| {
            Prompter::new(
                Arc::clone(&router),
                Arc::clone(&prompts),
                Arc::clone(&step_log),
            )
        });
        let orchestrator = Orchestrator::from_config(config, router, prompts, step_log);

        Ok(Self {
            database,
            orchestrator,
            prompter,
            transcript: None,
        })
    }

    pub fn chats(&self) -> ChatRepository {
        self.database.chats()
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Start a new run for a request
    pub async fn start(&self, topic: &str, attached_content: Option<String>) -> Result<RunReport> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let chats = self.chats();

        chats.create_chat(&run_id, topic).await?;
        chats.add_message(&run_id, Author::User, topic, None).await?;

        tracing::info!(run_id = %run_id, "Starting run");

        let mut state = RunState::fresh(&run_id, topic, attached_content);

        if let Some(prompter) = &self.prompter {
            let outcome = prompter.refine(&state).await;
            let needs_answer = matches!(outcome, RefinementOutcome::NeedsClarification(_));
            state = state.apply(outcome.into_patch());
            if needs_answer {
                return self.finish(state).await;
            }
        }

        let result = self.orchestrator.run_once(state).await;
        self.settle(&run_id, result).await
    }

    /// Resume a suspended run with the user's answer
    pub async fn answer(&self, run_id: &str, response: &str) -> Result<RunReport> {
        let chats = self.chats();

        let chat = chats
            .get_chat(run_id)
            .await?
            .ok_or_else(|| EngineError::RunNotFound(run_id.to_string()))?;
        if chat.status != ChatStatus::AwaitingUser {
            return Err(EngineError::NotAwaitingUser(run_id.to_string()).into());
        }
        let state = chats
            .load_pending_state(run_id)
            .await?
            .ok_or_else(|| EngineError::InvalidState(format!("run {} has no saved state", run_id)))?;

        chats.add_message(run_id, Author::User, response, None).await?;
        chats.set_status(run_id, ChatStatus::Running).await?;

        tracing::info!(run_id = %run_id, iteration = state.iteration_count, "Resuming run");

        // Questions asked before the first generator cycle came from request refinement
        if state.iteration_count == 0 {
            if let Some(prompter) = &self.prompter {
                let mut answered = state;
                answered.user_response = Some(response.to_string());

                let outcome = prompter.refine(&answered).await;
                let needs_answer = matches!(outcome, RefinementOutcome::NeedsClarification(_));
                let refined = answered.apply(outcome.into_patch());
                if needs_answer {
                    return self.finish(refined).await;
                }

                let result = self.orchestrator.run_once(refined).await;
                return self.settle(run_id, result).await;
            }
        }

        let result = self.orchestrator.resume(state, response).await;
        self.settle(run_id, result).await
    }

    async fn settle(&self, run_id: &str, result: Result<RunState, EngineError>) -> Result<RunReport> {
        match result {
            Ok(state) => self.finish(state).await,
            Err(e) => {
                tracing::error!(run_id = %run_id, "Run failed: {}", e);
                let chats = self.chats();
                chats.clear_pending_state(run_id).await?;
                chats.set_status(run_id, ChatStatus::Failed).await?;
                chats
                    .add_message(run_id, Author::System, &e.to_string(), None)
                    .await?;
                self.flush_transcript().await;
                Err(e.into())
            }
        }
    }

    /// Record the state returned by the graph and classify it
    async fn finish(&self, state: RunState) -> Result<RunReport> {
        let chats = self.chats();
        let run_id = state.run_id.clone();
        let outcome = RunOutcome::from_state(&state);

        match &outcome {
            RunOutcome::AwaitingUser(questions) => {
                chats.save_pending_state(&run_id, &state).await?;
                chats
                    .add_message(&run_id, Author::System, &questions.join("\n"), None)
                    .await?;
                chats.set_status(&run_id, ChatStatus::AwaitingUser).await?;
                tracing::info!(run_id = %run_id, "Run is waiting for the user");
            }
            RunOutcome::Completed(summary) => {
                let steps = agent_steps(&state)?;
                chats.clear_pending_state(&run_id).await?;
                chats
                    .add_message(&run_id, Author::System, summary, Some(&steps))
                    .await?;
                chats.set_status(&run_id, ChatStatus::Completed).await?;
                tracing::info!(run_id = %run_id, "Run completed after {} iterations", state.iteration_count);
            }
            RunOutcome::Exhausted => {
                let steps = agent_steps(&state)?;
                chats.clear_pending_state(&run_id).await?;
                chats
                    .add_message(&run_id, Author::System, EXHAUSTED_MESSAGE, Some(&steps))
                    .await?;
                chats.set_status(&run_id, ChatStatus::Failed).await?;
                tracing::warn!(run_id = %run_id, "Run ended without a document");
            }
        }

        self.flush_transcript().await;

        Ok(RunReport {
            run_id,
            iteration_count: state.iteration_count,
            outcome,
        })
    }

    async fn flush_transcript(&self) {
        if let Some(transcript) = &self.transcript {
            transcript.flush().await;
        }
    }

    /// Flush and close the database
    pub async fn close(self) -> Result<()> {
        self.flush_transcript().await;
        self.database.close().await
    }
}

/// Snapshot of the final state stored with the answer, without the topic
pub fn agent_steps(state: &RunState) -> Result<serde_json::Value> {
    let mut value = serde_json::to_value(state).context("Failed to serialize run state")?;
    if let Some(object) = value.as_object_mut() {
        object.remove("topic");
    }
    Ok(value)
}

fn print_report(report: &RunReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => match &report.outcome {
            RunOutcome::AwaitingUser(questions) => {
                println!("The critic needs more information:");
                println!();
                for (i, question) in questions.iter().enumerate() {
                    println!("  {}. {}", i + 1, question);
                }
                println!();
                println!("Answer with: triptych answer {} \"<your answer>\"", report.run_id);
            }
            RunOutcome::Completed(summary) => {
                println!("{}", summary);
                println!();
                println!(
                    "Run {} completed after {} iteration(s)",
                    report.run_id, report.iteration_count
                );
            }
            RunOutcome::Exhausted => {
                println!("{}", EXHAUSTED_MESSAGE);
                println!("Run ID: {}", report.run_id);
            }
        },
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
    }
    Ok(())
}

/// Start a new run
pub async fn handle_run(
    topic: String,
    file: Option<PathBuf>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let attached_content = match file {
        Some(path) => Some(
            tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read attachment {}", path.display()))?,
        ),
        None => None,
    };

    let context = RunContext::from_config(config).await?;
    let result = context.start(&topic, attached_content).await;
    context.close().await?;

    print_report(&result?, format)
}

/// Resume a suspended run
pub async fn handle_answer(
    run_id: String,
    response: String,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let context = RunContext::from_config(config).await?;
    let result = context.answer(&run_id, &response).await;
    context.close().await?;

    print_report(&result?, format)
}

/// Show recent runs
pub async fn handle_history(limit: usize, config: &Config, format: OutputFormat) -> Result<()> {
    let database = Database::new(&config.database_path())
        .await
        .context("Failed to open database")?;

    let chats = database
        .chats()
        .list_chats(limit as i64)
        .await
        .context("Failed to fetch run history")?;

    match format {
        OutputFormat::Text => {
            if chats.is_empty() {
                println!("No runs in history");
            } else {
                println!("Run History (last {} runs):", limit);
                println!();

                for chat in &chats {
                    println!("Run ID: {}", chat.id);
                    println!("  Title: {}", chat.title);
                    println!("  Status: {}", chat.status.as_str());

                    let created = chrono::DateTime::from_timestamp(chat.created_at, 0)
                        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "Unknown".to_string());
                    println!("  Created: {}", created);
                    println!();
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "runs": chats,
                "count": chats.len(),
                "limit": limit
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await
}

/// Show all messages of a run
pub async fn handle_replay(run_id: String, config: &Config, format: OutputFormat) -> Result<()> {
    let database = Database::new(&config.database_path())
        .await
        .context("Failed to open database")?;
    let repo = database.chats();

    let chat = repo
        .get_chat(&run_id)
        .await?
        .ok_or_else(|| EngineError::RunNotFound(run_id.clone()))?;
    let messages = repo
        .get_messages(&run_id)
        .await
        .context("Failed to fetch messages")?;

    match format {
        OutputFormat::Text => {
            println!("Run Replay: {}", run_id);
            println!();
            println!("Title: {}", chat.title);
            println!("Status: {}", chat.status.as_str());
            println!();
            println!("Messages ({} total):", messages.len());
            println!();

            for message in &messages {
                println!("[{}]", message.author.as_str());
                println!("{}", message.content);
                if let Some(iterations) = message
                    .agent_steps
                    .as_ref()
                    .and_then(|steps| steps.get("iteration_count"))
                {
                    println!("  (iterations: {})", iterations);
                }
                println!();
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "run": chat,
                "messages": messages,
                "message_count": messages.len()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await
}

/// Validate configuration, credentials and provider health
pub async fn handle_doctor(config: &Config, format: OutputFormat) -> Result<()> {
    let mut issues = Vec::new();
    let mut checks: Vec<(String, String)> = Vec::new();

    // Config is already validated when loaded
    checks.push(("Configuration".to_string(), "Valid".to_string()));

    let data_dir = &config.core.data_dir;
    if data_dir.exists() {
        checks.push(("Data directory".to_string(), "Exists".to_string()));
    } else {
        checks.push(("Data directory".to_string(), "Missing".to_string()));
        issues.push(format!("Data directory does not exist: {:?}", data_dir));
    }

    match Database::new(&config.database_path()).await {
        Ok(database) => {
            checks.push(("Database".to_string(), "OK".to_string()));
            database.close().await.ok();
        }
        Err(e) => {
            checks.push(("Database".to_string(), "Failed".to_string()));
            issues.push(format!("Cannot open database: {}", e));
        }
    }

    match PromptSet::load(&config.orchestration.prompts_dir) {
        Ok(prompts) => {
            let overridden = crate::conductor::PromptKind::ALL
                .into_iter()
                .filter(|kind| !prompts.is_default(*kind))
                .count();
            checks.push((
                "Prompt templates".to_string(),
                format!("OK ({} overridden)", overridden),
            ));
        }
        Err(e) => {
            checks.push(("Prompt templates".to_string(), "Invalid".to_string()));
            issues.push(e.to_string());
        }
    }

    let secrets = SecretResolver::new();
    if config.llm.default_provider == "openai" {
        let shared = secrets.has_credential(None);
        checks.push((
            "API key (critic/editor)".to_string(),
            if shared { "Found" } else { "Missing" }.to_string(),
        ));
        for index in GeneratorIndex::ALL {
            let found = secrets.has_credential(Some(index));
            checks.push((
                format!("API key (generator {})", index),
                if found { "Found" } else { "Missing" }.to_string(),
            ));
        }
    }

    match ModelRouter::from_config(config, &secrets) {
        Ok(router) => {
            for (role, provider, healthy) in router.check_health().await {
                checks.push((
                    format!("Provider for {}", role),
                    format!(
                        "{} ({})",
                        provider,
                        if healthy { "reachable" } else { "unreachable" }
                    ),
                ));
                if !healthy {
                    issues.push(format!("Provider {} serving {} is unreachable", provider, role));
                }
            }
        }
        Err(e) => {
            checks.push(("Providers".to_string(), "Not configured".to_string()));
            issues.push(format!("{} ({})", e, e.user_hint()));
        }
    }

    match format {
        OutputFormat::Text => {
            println!("Triptych System Diagnostics");
            println!("============================");
            println!();
            println!(
                "Version: {} ({} - {})",
                env!("CARGO_PKG_VERSION"),
                env!("GIT_COMMIT_HASH"),
                env!("BUILD_TIMESTAMP")
            );
            println!();

            println!("System Checks:");
            for (check, status) in &checks {
                println!("  {:<28} {}", format!("{}:", check), status);
            }

            println!();

            if issues.is_empty() {
                println!("✓ All checks passed!");
            } else {
                println!("⚠ Issues found:");
                println!();
                for (i, issue) in issues.iter().enumerate() {
                    println!("  {}. {}", i + 1, issue);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "checks": checks.iter().map(|(name, status)| {
                    json!({
                        "name": name,
                        "status": status
                    })
                }).collect::<Vec<_>>(),
                "issues": issues,
                "healthy": issues.is_empty()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
