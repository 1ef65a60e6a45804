//! The per-(task, rollout) conversation state machine.
//!
//! `INIT → AWAITING_MODEL ⇄ AWAITING_TOOL → TERMINATED`. A session owns its
//! transcript exclusively and suspends only while awaiting the model or the
//! tool server. Tool failures are fed back as observations so the model can
//! self-correct; only model-plane failures and a second consecutive
//! unparseable response terminate the session with an error.

use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::action::{parse_action, Action};
use crate::model::{ModelClient, PromptMessage};
use crate::prompt;
use crate::rollout::RolloutResult;
use crate::server::ToolDispatch;
use crate::task::Task;
use crate::transcript::{Observation, Transcript, Turn};

/// Lifecycle of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Init,
    AwaitingModel,
    AwaitingTool,
    Terminated(SessionStatus),
}

/// Terminal outcome of a session. `RoundLimit` is a defined outcome, not an
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Success,
    RoundLimit,
    Error,
}

/// Per-session knobs, shared by every session of a run.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum model-call/tool-call cycles before the session stops
    pub max_rounds: usize,
    /// System prompt seeding every conversation
    pub system_prompt: String,
}

const DEFAULT_MAX_ROUNDS: usize = 15;

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            system_prompt: String::new(),
        }
    }
}

/// One bounded conversation attempting one task.
pub struct Session {
    task: Task,
    rollout_index: usize,
    state: SessionState,
    round_count: usize,
    transcript: Transcript,
}

impl Session {
    pub fn new(task: Task, rollout_index: usize) -> Self {
        Self {
            task,
            rollout_index,
            state: SessionState::Init,
            round_count: 0,
            transcript: Transcript::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn round_count(&self) -> usize {
        self.round_count
    }

    /// Drive the conversation to a terminal state and emit its result.
    ///
    /// Consumes the session: `TERMINATED` is absorbing and exactly one
    /// result exists per session.
    pub async fn run(
        mut self,
        model: &dyn ModelClient,
        tools: &dyn ToolDispatch,
        config: &SessionConfig,
    ) -> RolloutResult {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut consecutive_parse_failures = 0usize;
        let mut final_answer = None;
        let mut error = None;

        let status = loop {
            self.state = SessionState::AwaitingModel;
            let messages = self.render_messages(config);

            let content = match model.complete(&messages).await {
                Ok(content) => content,
                Err(err) => {
                    log::warn!("[{}#{}] model call failed: {err}", self.task.id, self.rollout_index);
                    error = Some(err.to_string());
                    break SessionStatus::Error;
                }
            };

            match parse_action(&content) {
                Err(err) => {
                    consecutive_parse_failures += 1;
                    self.transcript.push_model(content, None);
                    if consecutive_parse_failures >= 2 {
                        error = Some(err.to_string());
                        break SessionStatus::Error;
                    }
                    log::debug!(
                        "[{}#{}] unparseable response, reprompting",
                        self.task.id,
                        self.rollout_index
                    );
                    self.transcript
                        .push_observation(Observation::error(prompt::REPROMPT));
                }
                Ok(Action::Finish { answer }) => {
                    self.transcript.push_model(content, None);
                    final_answer = Some(answer);
                    break SessionStatus::Success;
                }
                Ok(Action::Call(invocation)) => {
                    consecutive_parse_failures = 0;
                    if self.round_count >= config.max_rounds {
                        // The would-be call is recorded but never dispatched.
                        self.transcript.push_model(content, Some(invocation));
                        break SessionStatus::RoundLimit;
                    }
                    self.round_count += 1;
                    self.transcript.push_model(content, Some(invocation.clone()));

                    self.state = SessionState::AwaitingTool;
                    match tools.execute(&invocation).await {
                        Ok(observation) => self.transcript.push_observation(observation),
                        Err(err) => {
                            log::warn!(
                                "[{}#{}] tool dispatch failed: {err}",
                                self.task.id,
                                self.rollout_index
                            );
                            error = Some(err.to_string());
                            break SessionStatus::Error;
                        }
                    }
                }
            }
        };

        self.state = SessionState::Terminated(status);
        RolloutResult {
            task_id: self.task.id,
            rollout_index: self.rollout_index,
            status,
            final_answer,
            error,
            rounds: self.round_count,
            transcript: self.transcript,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Serialize the conversation for one model request: system prompt, the
    /// task question, then the transcript replayed verbatim.
    fn render_messages(&self, config: &SessionConfig) -> Vec<PromptMessage> {
        let mut messages = Vec::with_capacity(self.transcript.len() + 2);
        messages.push(PromptMessage::system(config.system_prompt.as_str()));
        messages.push(PromptMessage::user(self.question_text()));
        for turn in self.transcript.turns() {
            match turn {
                Turn::Model { content, .. } => {
                    messages.push(PromptMessage::assistant(content.as_str()))
                }
                Turn::Tool { observation } => {
                    messages.push(PromptMessage::user(observation.text.as_str()))
                }
            }
        }
        messages
    }

    fn question_text(&self) -> String {
        match &self.task.database {
            Some(database) => format!("Database: {database}\n\n{}", self.task.question),
            None => self.task.question.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use crate::transcript::{ObservationStatus, ToolInvocation};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const TOOL_CALL: &str = "```action\n{\"tool\": \"execute_sql\", \"arguments\": {\"sql\": \"SELECT 1\"}}\n```";
    const FINISH: &str = "```action\n{\"answer\": \"42\"}\n```";

    /// Pops scripted replies, then repeats the configured fallback.
    struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String, AgentError>>>,
        fallback: Option<String>,
        calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<String, AgentError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                fallback: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn repeating(reply: &str) -> Self {
            Self {
                replies: Mutex::new(VecDeque::new()),
                fallback: Some(reply.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedModel {
        async fn complete(&self, _messages: &[PromptMessage]) -> Result<String, AgentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(reply) = self.replies.lock().unwrap().pop_front() {
                return reply;
            }
            match &self.fallback {
                Some(reply) => Ok(reply.clone()),
                None => Err(AgentError::Provider("script exhausted".to_string())),
            }
        }
    }

    /// Pops scripted observations and records every invocation.
    struct StubDispatch {
        observations: Mutex<VecDeque<Result<Observation, AgentError>>>,
        invocations: Mutex<Vec<ToolInvocation>>,
    }

    impl StubDispatch {
        fn new(observations: Vec<Result<Observation, AgentError>>) -> Self {
            Self {
                observations: Mutex::new(observations.into()),
                invocations: Mutex::new(Vec::new()),
            }
        }

        fn dispatched(&self) -> usize {
            self.invocations.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ToolDispatch for StubDispatch {
        async fn execute(&self, invocation: &ToolInvocation) -> Result<Observation, AgentError> {
            self.invocations.lock().unwrap().push(invocation.clone());
            self.observations
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Observation::ok("stub result")))
        }
    }

    fn task() -> Task {
        Task {
            id: "t1".to_string(),
            database: Some("SALES".to_string()),
            documents: None,
            question: "How many orders?".to_string(),
        }
    }

    fn config(max_rounds: usize) -> SessionConfig {
        SessionConfig {
            max_rounds,
            system_prompt: "be brief".to_string(),
        }
    }

    #[tokio::test]
    async fn immediate_answer_succeeds_without_tool_calls() {
        let model = ScriptedModel::new(vec![Ok(FINISH.to_string())]);
        let tools = StubDispatch::new(vec![]);

        let result = Session::new(task(), 0).run(&model, &tools, &config(5)).await;

        assert_eq!(result.status, SessionStatus::Success);
        assert_eq!(result.final_answer.as_deref(), Some("42"));
        assert_eq!(result.rounds, 0);
        assert_eq!(tools.dispatched(), 0);
    }

    #[tokio::test]
    async fn round_limit_stops_the_fourth_call() {
        let model = ScriptedModel::repeating(TOOL_CALL);
        let tools = StubDispatch::new(vec![]);

        let result = Session::new(task(), 0).run(&model, &tools, &config(3)).await;

        assert_eq!(result.status, SessionStatus::RoundLimit);
        assert_eq!(result.rounds, 3);
        assert_eq!(tools.dispatched(), 3);
        // Three dispatched rounds plus the undispatched fourth request.
        assert_eq!(model.calls(), 4);
    }

    #[tokio::test]
    async fn tool_failure_is_not_fatal() {
        let model = ScriptedModel::new(vec![
            Ok(TOOL_CALL.to_string()),
            Ok(TOOL_CALL.to_string()),
            Ok(FINISH.to_string()),
        ]);
        let tools = StubDispatch::new(vec![
            Ok(Observation::error("EXECUTION RESULT of [execute_sql]:\nSQL Error: bad table")),
            Ok(Observation::ok("EXECUTION RESULT of [execute_sql]:\n1 row")),
        ]);

        let result = Session::new(task(), 0).run(&model, &tools, &config(5)).await;

        assert_eq!(result.status, SessionStatus::Success);
        assert_eq!(tools.dispatched(), 2);
        let error_turns = result
            .transcript
            .turns()
            .iter()
            .filter(|t| matches!(t, Turn::Tool { observation } if observation.status == ObservationStatus::Error))
            .count();
        assert_eq!(error_turns, 1);
    }

    #[tokio::test]
    async fn one_corrective_reprompt_recovers_a_parse_error() {
        let model = ScriptedModel::new(vec![
            Ok("I will think about it.".to_string()),
            Ok(FINISH.to_string()),
        ]);
        let tools = StubDispatch::new(vec![]);

        let result = Session::new(task(), 0).run(&model, &tools, &config(5)).await;

        assert_eq!(result.status, SessionStatus::Success);
        let reprompted = result.transcript.turns().iter().any(
            |t| matches!(t, Turn::Tool { observation } if observation.text == prompt::REPROMPT),
        );
        assert!(reprompted);
    }

    #[tokio::test]
    async fn two_consecutive_parse_errors_terminate_with_error() {
        let model = ScriptedModel::new(vec![
            Ok("no action here".to_string()),
            Ok("still no action".to_string()),
        ]);
        let tools = StubDispatch::new(vec![]);

        let result = Session::new(task(), 0).run(&model, &tools, &config(5)).await;

        assert_eq!(result.status, SessionStatus::Error);
        assert!(result.error.is_some());
        assert_eq!(model.calls(), 2);
        assert_eq!(tools.dispatched(), 0);
    }

    #[tokio::test]
    async fn model_failure_terminates_with_error() {
        let model = ScriptedModel::new(vec![Err(AgentError::RetryExceeded {
            attempts: 3,
            last_error: "rate limited".to_string(),
        })]);
        let tools = StubDispatch::new(vec![]);

        let result = Session::new(task(), 0).run(&model, &tools, &config(5)).await;

        assert_eq!(result.status, SessionStatus::Error);
        assert!(result.error.unwrap().contains("rate limited"));
    }

    #[tokio::test]
    async fn saturated_tool_server_terminates_with_error() {
        let model = ScriptedModel::new(vec![Ok(TOOL_CALL.to_string())]);
        let tools = StubDispatch::new(vec![Err(AgentError::ResourceExhausted(
            "queue full".to_string(),
        ))]);

        let result = Session::new(task(), 0).run(&model, &tools, &config(5)).await;

        assert_eq!(result.status, SessionStatus::Error);
        assert_eq!(result.rounds, 1);
    }
}
