//! Mock models for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::LlmError;
use crate::model::{ImageDescriber, LanguageModel};

enum Scripted {
    Text(String),
    Error(fn() -> LlmError),
}

/// Language model that replays a fixed script of outputs.
///
/// Each `complete` call pops the next entry. Once the script is exhausted the
/// fallback output (if any) is returned forever, otherwise an error.
pub struct ScriptedModel {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedModel {
    pub fn new<S: Into<String>>(outputs: impl IntoIterator<Item = S>) -> Self {
        Self {
            script: Mutex::new(
                outputs
                    .into_iter()
                    .map(|s| Scripted::Text(s.into()))
                    .collect(),
            ),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// A model that answers `output` to every prompt.
    pub fn repeating(output: impl Into<String>) -> Self {
        let mut model = Self::new(Vec::<String>::new());
        model.fallback = Some(output.into());
        model
    }

    /// Append an error to the script.
    pub fn then_error(self, make: fn() -> LlmError) -> Self {
        self.push(Scripted::Error(make));
        self
    }

    /// Append a text output to the script.
    pub fn then(self, output: impl Into<String>) -> Self {
        self.push(Scripted::Text(output.into()));
        self
    }

    /// Sleep before every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn push(&self, entry: Scripted) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(entry);
        }
    }

    /// Number of completions requested so far.
    pub fn calls(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Every prompt received, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(Scripted::Text(text)) => Ok(text),
            Some(Scripted::Error(make)) => Err(make()),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| LlmError::Api("script exhausted".to_string())),
        }
    }
}

/// Image describer returning a fixed description.
pub struct MockDescriber {
    description: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockDescriber {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// A describer whose every call fails.
    pub fn failing() -> Self {
        Self {
            description: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageDescriber for MockDescriber {
    async fn describe(&self, image: &[u8]) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if image.is_empty() {
            return Err(LlmError::UnsupportedImage("image is empty".to_string()));
        }

        self.description
            .clone()
            .ok_or_else(|| LlmError::Api("mock describer failure".to_string()))
    }
}
