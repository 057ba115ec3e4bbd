use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::warn;

/// Text-completion provider used for intent classification and reply wording.
/// Concrete network adapters live in the embedding application.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Returns raw provider text that should contain one JSON object.
    async fn classify(&self, prompt: &str, system_prompt: &str) -> Result<String>;

    async fn generate(&self, prompt: &str, system_prompt: &str) -> Result<String>;
}

/// Slice from the first `{` to the last `}`; providers like to wrap JSON in prose.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 0, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self { max_retries, base_delay_ms, ..Self::default() }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Retries failed provider calls with exponential backoff. With
/// `max_retries = 0` it behaves exactly like the wrapped service.
pub struct RetryingCompletion {
    inner: Arc<dyn CompletionService>,
    policy: RetryPolicy,
}

impl RetryingCompletion {
    pub fn new(inner: Arc<dyn CompletionService>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn with_retry<F, Fut>(&self, operation: &'static str, mut call: F) -> Result<String>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<String>> + Send,
    {
        let mut attempt = 0_u32;
        loop {
            match call().await {
                Ok(text) => return Ok(text),
                Err(error) if attempt < self.policy.max_retries => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        event_name = "agent.completion.retry",
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "completion call failed; retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[async_trait]
impl CompletionService for RetryingCompletion {
    async fn classify(&self, prompt: &str, system_prompt: &str) -> Result<String> {
        self.with_retry("classify", || self.inner.classify(prompt, system_prompt)).await
    }

    async fn generate(&self, prompt: &str, system_prompt: &str) -> Result<String> {
        self.with_retry("generate", || self.inner.generate(prompt, system_prompt)).await
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    Classify,
    Generate,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub prompt: String,
    pub system_prompt: String,
}

#[derive(Clone, Debug)]
pub enum ScriptedResponse {
    Text(String),
    Fail(String),
    /// Answers with the text after sleeping, for timeout paths.
    Delayed(Duration, String),
}

#[derive(Default)]
struct Script {
    classify: VecDeque<ScriptedResponse>,
    generate: VecDeque<ScriptedResponse>,
    calls: Vec<RecordedCall>,
}

/// Deterministic completion service fed from queues. An empty queue is a
/// provider failure, so unscripted `generate` calls exercise the fallback
/// replies.
#[derive(Default)]
pub struct ScriptedCompletionService {
    script: Mutex<Script>,
}

impl ScriptedCompletionService {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push_classification(&self, text: impl Into<String>) -> &Self {
        self.script().classify.push_back(ScriptedResponse::Text(text.into()));
        self
    }

    pub fn push_classification_response(&self, response: ScriptedResponse) -> &Self {
        self.script().classify.push_back(response);
        self
    }

    pub fn push_generation(&self, text: impl Into<String>) -> &Self {
        self.script().generate.push_back(ScriptedResponse::Text(text.into()));
        self
    }

    pub fn push_generation_response(&self, response: ScriptedResponse) -> &Self {
        self.script().generate.push_back(response);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.script().calls.clone()
    }

    pub fn call_count(&self, kind: CallKind) -> usize {
        self.script().calls.iter().filter(|call| call.kind == kind).count()
    }

    async fn respond(&self, kind: CallKind, prompt: &str, system_prompt: &str) -> Result<String> {
        let next = {
            let mut script = self.script();
            script.calls.push(RecordedCall {
                kind,
                prompt: prompt.to_owned(),
                system_prompt: system_prompt.to_owned(),
            });
            match kind {
                CallKind::Classify => script.classify.pop_front(),
                CallKind::Generate => script.generate.pop_front(),
            }
        };

        match next {
            Some(ScriptedResponse::Text(text)) => Ok(text),
            Some(ScriptedResponse::Fail(message)) => Err(anyhow!(message)),
            Some(ScriptedResponse::Delayed(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            None => Err(anyhow!("no scripted {kind:?} response left")),
        }
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletionService {
    async fn classify(&self, prompt: &str, system_prompt: &str) -> Result<String> {
        self.respond(CallKind::Classify, prompt, system_prompt).await
    }

    async fn generate(&self, prompt: &str, system_prompt: &str) -> Result<String> {
        self.respond(CallKind::Generate, prompt, system_prompt).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{
        extract_json_object, CallKind, CompletionService, RetryPolicy, RetryingCompletion,
        ScriptedCompletionService, ScriptedResponse,
    };

    #[test]
    fn json_object_is_cut_out_of_surrounding_prose() {
        let raw = "Sure! Here you go:\n{\"intent\": \"LIST_TASKS\", \"entities\": {}}\nThanks";
        assert_eq!(
            extract_json_object(raw),
            Some("{\"intent\": \"LIST_TASKS\", \"entities\": {}}")
        );
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy { max_retries: 3, base_delay_ms: 100, max_delay_ms: 300 };
        assert_eq!(policy.backoff(0).as_millis(), 100);
        assert_eq!(policy.backoff(1).as_millis(), 200);
        assert_eq!(policy.backoff(2).as_millis(), 300);
    }

    #[tokio::test]
    async fn retrying_completion_recovers_from_transient_failure() {
        let scripted = Arc::new(ScriptedCompletionService::new());
        scripted
            .push_classification_response(ScriptedResponse::Fail("503".to_owned()))
            .push_classification("{}");

        let retrying = RetryingCompletion::new(scripted.clone(), RetryPolicy::new(2, 1));
        let text = retrying.classify("prompt", "system").await.expect("second attempt");

        assert_eq!(text, "{}");
        assert_eq!(scripted.call_count(CallKind::Classify), 2);
    }

    #[tokio::test]
    async fn zero_retries_is_a_single_attempt() {
        let scripted = Arc::new(ScriptedCompletionService::new());
        scripted
            .push_generation_response(ScriptedResponse::Fail("boom".to_owned()))
            .push_generation("unused");

        let retrying = RetryingCompletion::new(scripted.clone(), RetryPolicy::default());
        assert!(retrying.generate("prompt", "system").await.is_err());
        assert_eq!(scripted.call_count(CallKind::Generate), 1);
    }

    #[tokio::test]
    async fn scripted_service_records_prompts() {
        let scripted = ScriptedCompletionService::new();
        scripted.push_generation("hello");

        assert_eq!(scripted.generate("p1", "s1").await.expect("scripted"), "hello");
        assert!(scripted.generate("p2", "s1").await.is_err());

        let calls = scripted.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].prompt, "p1");
        assert_eq!(calls[1].kind, CallKind::Generate);
    }
}
