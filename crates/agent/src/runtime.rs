use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use taskpilot_core::config::AppConfig;
use taskpilot_core::domain::command::CommandOutcome;
use taskpilot_core::domain::intent::{ClassificationResult, IntentKind};
use taskpilot_core::domain::session::{SessionId, Turn, UserId};
use taskpilot_core::errors::{ApplicationError, DomainError, GENERIC_FAILURE_MESSAGE};
use taskpilot_core::flows::{PipelineEvent, PipelineMachine, PipelineState};
use taskpilot_db::repositories::{SessionRepository, TaskRepository};

use crate::classifier::{IntentClassifier, DEFAULT_CLASSIFY_TIMEOUT};
use crate::composer::{ResponseComposer, DEFAULT_COMPOSE_TIMEOUT};
use crate::context::{
    ContextAssembler, ConversationContext, DEFAULT_HISTORY_WINDOW, DEFAULT_RECENT_TASK_LIMIT,
};
use crate::executor::{persistence_error, TaskExecutor};
use crate::guardrails::{ClarificationGate, GateDecision, DEFAULT_CONFIDENCE_THRESHOLD};
use crate::llm::{CompletionService, RetryPolicy, RetryingCompletion};
use crate::resolver::CommandResolver;

/// Answer to one inbound message. The session id is always set, also on
/// failure, so the caller can keep the conversation going.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub success: bool,
    pub message: String,
    pub intent: Option<IntentKind>,
    pub data: Option<Value>,
    pub session_id: SessionId,
    pub requires_clarification: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeSettings {
    pub confidence_threshold: f64,
    pub history_window: usize,
    pub recent_task_limit: usize,
    pub classify_timeout: Duration,
    pub compose_timeout: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            history_window: DEFAULT_HISTORY_WINDOW,
            recent_task_limit: DEFAULT_RECENT_TASK_LIMIT,
            classify_timeout: DEFAULT_CLASSIFY_TIMEOUT,
            compose_timeout: DEFAULT_COMPOSE_TIMEOUT,
        }
    }
}

impl RuntimeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let timeout = Duration::from_secs(config.completion.timeout_secs);
        Self {
            confidence_threshold: config.pipeline.confidence_threshold,
            history_window: config.pipeline.history_window,
            recent_task_limit: config.pipeline.recent_task_limit,
            classify_timeout: timeout,
            compose_timeout: timeout,
        }
    }
}

/// Pipeline position for one message, with every transition checked and logged.
struct PipelineRun {
    machine: PipelineMachine,
    state: PipelineState,
    session_id: SessionId,
    user_id: UserId,
    session_ready: bool,
}

impl PipelineRun {
    fn new(session_id: SessionId, user_id: UserId) -> Self {
        let machine = PipelineMachine;
        let state = machine.initial_state();
        Self { machine, state, session_id, user_id, session_ready: false }
    }

    fn advance(&mut self, event: PipelineEvent) -> Result<(), ApplicationError> {
        let outcome =
            self.machine.apply(self.state, event).map_err(DomainError::PipelineTransition)?;
        info!(
            event_name = "agent.pipeline.transition",
            session_id = %self.session_id.0,
            user_id = %self.user_id.0,
            from = outcome.from.as_str(),
            to = outcome.to.as_str(),
            trigger = ?outcome.event,
            "pipeline transition"
        );
        self.state = outcome.to;
        Ok(())
    }

    fn fail(&mut self) {
        if !self.state.is_terminal() {
            let _ = self.advance(PipelineEvent::StepFailed);
        }
    }
}

/// Message pipeline: context, classification, clarification gate, command
/// resolution, execution, reply, history.
pub struct AgentRuntime {
    sessions: Arc<dyn SessionRepository>,
    assembler: ContextAssembler,
    classifier: IntentClassifier,
    gate: ClarificationGate,
    resolver: CommandResolver,
    executor: TaskExecutor,
    composer: ResponseComposer,
}

impl AgentRuntime {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        tasks: Arc<dyn TaskRepository>,
        sessions: Arc<dyn SessionRepository>,
        settings: RuntimeSettings,
    ) -> Self {
        Self {
            assembler: ContextAssembler::new(sessions.clone(), tasks.clone())
                .with_limits(settings.history_window, settings.recent_task_limit),
            classifier: IntentClassifier::new(completion.clone())
                .with_timeout(settings.classify_timeout),
            gate: ClarificationGate::new(settings.confidence_threshold),
            resolver: CommandResolver::new(tasks.clone()),
            executor: TaskExecutor::new(tasks),
            composer: ResponseComposer::new(completion).with_timeout(settings.compose_timeout),
            sessions,
        }
    }

    /// Builds the runtime from loaded configuration, wrapping the completion
    /// service in a retry decorator when retries are enabled.
    pub fn from_config(
        config: &AppConfig,
        completion: Arc<dyn CompletionService>,
        tasks: Arc<dyn TaskRepository>,
        sessions: Arc<dyn SessionRepository>,
    ) -> Self {
        let completion: Arc<dyn CompletionService> = if config.completion.max_retries > 0 {
            Arc::new(RetryingCompletion::new(
                completion,
                RetryPolicy::new(config.completion.max_retries, config.completion.retry_backoff_ms),
            ))
        } else {
            completion
        };
        Self::new(completion, tasks, sessions, RuntimeSettings::from_config(config))
    }

    pub async fn process(
        &self,
        user_id: &UserId,
        session_id: Option<SessionId>,
        message: &str,
    ) -> ChatReply {
        self.process_at(user_id, session_id, message, Utc::now()).await
    }

    /// Same as [`AgentRuntime::process`] with an explicit clock.
    pub async fn process_at(
        &self,
        user_id: &UserId,
        session_id: Option<SessionId>,
        message: &str,
        now: DateTime<Utc>,
    ) -> ChatReply {
        let session_id = session_id.unwrap_or_else(SessionId::generate);
        let mut run = PipelineRun::new(session_id.clone(), user_id.clone());

        match self.drive(&mut run, message, now).await {
            Ok(reply) => reply,
            Err(failure) => {
                error!(
                    event_name = "agent.pipeline.failed",
                    session_id = %session_id.0,
                    user_id = %user_id.0,
                    state = run.state.as_str(),
                    error = %failure,
                    "message pipeline failed"
                );
                run.fail();
                if run.session_ready {
                    let turn = Turn::assistant(session_id.clone(), GENERIC_FAILURE_MESSAGE, now);
                    if let Err(store_error) = self.sessions.append_turn(turn).await {
                        warn!(
                            event_name = "agent.pipeline.failure_turn_lost",
                            session_id = %session_id.0,
                            error = %store_error,
                            "could not record failure reply"
                        );
                    }
                }
                ChatReply {
                    success: false,
                    message: GENERIC_FAILURE_MESSAGE.to_owned(),
                    intent: None,
                    data: None,
                    session_id,
                    requires_clarification: false,
                }
            }
        }
    }

    async fn drive(
        &self,
        run: &mut PipelineRun,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<ChatReply, ApplicationError> {
        let session_id = run.session_id.clone();
        let user_id = run.user_id.clone();

        self.sessions.ensure_session(&session_id, &user_id, now).await.map_err(persistence_error)?;
        run.session_ready = true;
        let context = self.assembler.assemble(&session_id, &user_id).await.map_err(persistence_error)?;
        self.sessions
            .append_turn(Turn::user(session_id.clone(), message, now))
            .await
            .map_err(persistence_error)?;
        run.advance(PipelineEvent::ContextLoaded)?;

        let classification = self.classifier.classify(message, &context).await;
        run.advance(PipelineEvent::IntentClassified)?;

        let classification = match self.gate.evaluate(message, classification, &context) {
            GateDecision::Proceed(classification) => classification,
            GateDecision::Clarify { reason_code, intent, question } => {
                info!(
                    event_name = "agent.pipeline.clarification",
                    session_id = %session_id.0,
                    reason_code,
                    "asking the user to clarify"
                );
                return self.clarify(run, intent, question, now).await;
            }
        };
        run.advance(PipelineEvent::CommandAccepted)?;

        let kind = classification.kind();
        let entities = classification.intent.entities_snapshot();
        let outcome = match self.resolve_and_execute(&user_id, classification, &context, now).await
        {
            Ok(outcome) => outcome,
            Err(failure) if failure.needs_clarification() => {
                return self.clarify(run, kind, failure.user_message(), now).await;
            }
            Err(failure) if failure.is_validation() => {
                return self.reject(run, kind, failure.user_message(), now).await;
            }
            Err(failure) => return Err(failure),
        };
        run.advance(PipelineEvent::CommandExecuted)?;

        let text = self.composer.compose(message, kind, &outcome).await;
        run.advance(PipelineEvent::ResponseComposed)?;

        let mut turn = Turn::assistant(session_id.clone(), text.clone(), now).with_intent(kind);
        if let Some(entities) = entities {
            turn = turn.with_entities(entities);
        }
        self.sessions.append_turn(turn).await.map_err(persistence_error)?;
        run.advance(PipelineEvent::TurnPersisted)?;

        Ok(ChatReply {
            success: true,
            message: text,
            intent: Some(kind),
            data: outcome_data(&outcome),
            session_id,
            requires_clarification: false,
        })
    }

    async fn resolve_and_execute(
        &self,
        user_id: &UserId,
        classification: ClassificationResult,
        context: &ConversationContext,
        now: DateTime<Utc>,
    ) -> Result<CommandOutcome, ApplicationError> {
        let command = self.resolver.resolve(user_id, classification.intent, context, now).await?;
        self.executor.execute(user_id, command, now).await
    }

    async fn clarify(
        &self,
        run: &mut PipelineRun,
        intent: IntentKind,
        question: String,
        now: DateTime<Utc>,
    ) -> Result<ChatReply, ApplicationError> {
        let turn = Turn::assistant(run.session_id.clone(), question.clone(), now).with_intent(intent);
        self.sessions.append_turn(turn).await.map_err(persistence_error)?;
        run.advance(PipelineEvent::ClarificationRequired)?;

        Ok(ChatReply {
            success: true,
            message: question,
            intent: Some(intent),
            data: None,
            session_id: run.session_id.clone(),
            requires_clarification: true,
        })
    }

    /// A command that failed validation: the user hears why, nothing changes.
    async fn reject(
        &self,
        run: &mut PipelineRun,
        intent: IntentKind,
        message: String,
        now: DateTime<Utc>,
    ) -> Result<ChatReply, ApplicationError> {
        run.advance(PipelineEvent::CommandRejected)?;
        let turn = Turn::assistant(run.session_id.clone(), message.clone(), now).with_intent(intent);
        self.sessions.append_turn(turn).await.map_err(persistence_error)?;
        run.advance(PipelineEvent::TurnPersisted)?;

        Ok(ChatReply {
            success: false,
            message,
            intent: Some(intent),
            data: None,
            session_id: run.session_id.clone(),
            requires_clarification: false,
        })
    }
}

fn outcome_data(outcome: &CommandOutcome) -> Option<Value> {
    serde_json::to_value(outcome).ok()
}
