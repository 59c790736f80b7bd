//! Reasoning agent: an explicit Thinking / ToolCall / FinalAnswer / Failed
//! state machine over a language model.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use insight_llm::LanguageModel;
use insight_types::PipelineSettings;

use crate::context::{Context, SizeMeter};
use crate::error::{AgentError, ErrorKind};
use crate::parser::{parse_output, ModelOutput};
use crate::prompt;
use crate::tools::ToolSet;
use crate::transcript::{AgentStep, StepAction, Transcript};

/// Agent limits.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Upper bound on Thinking cycles per run
    pub max_iterations: usize,
    /// Re-prompts allowed within one cycle after unparseable output
    pub retry_count: u32,
    pub model_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            retry_count: 3,
            model_timeout: Duration::from_secs(60),
        }
    }
}

impl AgentConfig {
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self {
            max_iterations: settings.max_iterations,
            retry_count: settings.retry_count,
            model_timeout: Duration::from_millis(settings.model_timeout_ms),
        }
    }
}

/// Agent states. `FinalAnswer` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentState {
    Thinking,
    ToolCall {
        tool: String,
        input: String,
        output: String,
    },
    FinalAnswer(String),
    Failed { kind: ErrorKind, detail: String },
}

/// Successful run.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub answer: String,
    /// Thinking cycles executed
    pub cycles: usize,
    pub transcript: Transcript,
}

/// Drives a language model through reasoning cycles until it produces a
/// final answer or a terminal failure.
///
/// Every prompt sent to the model is at most `input_limit` as measured by
/// `meter`. Tool observations are budgeted to the room left in the prompt.
///
/// Holds no per-run state; one agent can serve concurrent runs.
pub struct ReasoningAgent {
    model: Arc<dyn LanguageModel>,
    config: AgentConfig,
    meter: SizeMeter,
    input_limit: usize,
}

impl ReasoningAgent {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        config: AgentConfig,
        meter: SizeMeter,
        input_limit: usize,
    ) -> Self {
        Self {
            model,
            config,
            meter,
            input_limit,
        }
    }

    /// Run to a terminal state.
    ///
    /// Terminates in at most `max_iterations` Thinking cycles. Each cycle
    /// makes at most `retry_count + 1` model calls.
    pub async fn run(
        &self,
        context: &Context,
        tools: &ToolSet,
        cancel: &CancellationToken,
    ) -> Result<AgentOutcome, AgentError> {
        let mut transcript = Transcript::new(context.as_str());
        let mut state = AgentState::Thinking;
        let mut cycles = 0;

        loop {
            state = match state {
                AgentState::Thinking => {
                    if cycles >= self.config.max_iterations {
                        AgentState::Failed {
                            kind: ErrorKind::MaxIterationsExceeded,
                            detail: format!(
                                "no final answer after {} cycles",
                                self.config.max_iterations
                            ),
                        }
                    } else {
                        cycles += 1;
                        self.think(cycles, tools, &mut transcript, cancel).await
                    }
                }
                AgentState::ToolCall {
                    tool,
                    input,
                    output,
                } => self.call_tool(cycles, tools, tool, input, output, &mut transcript, cancel).await,
                AgentState::FinalAnswer(answer) => {
                    info!(cycles, tool_calls = transcript.tool_calls(), "Agent reached final answer");
                    return Ok(AgentOutcome {
                        answer,
                        cycles,
                        transcript,
                    });
                }
                AgentState::Failed { kind, detail } => {
                    warn!(%kind, cycles, detail = %detail, "Agent failed");
                    return Err(AgentError {
                        kind,
                        detail,
                        cycles,
                        transcript,
                    });
                }
            };
        }
    }

    /// One Thinking cycle: prompt the model and interpret its output,
    /// re-prompting with a correction when the output is malformed.
    async fn think(
        &self,
        cycle: usize,
        tools: &ToolSet,
        transcript: &mut Transcript,
        cancel: &CancellationToken,
    ) -> AgentState {
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return AgentState::Failed {
                    kind: ErrorKind::Cancelled,
                    detail: "cancelled before model call".to_string(),
                };
            }

            let prompt = prompt::render(tools, transcript);
            let prompt_size = self.meter.measure(&prompt);
            if prompt_size > self.input_limit {
                return AgentState::Failed {
                    kind: ErrorKind::ContextOverflow,
                    detail: format!(
                        "prompt is {} {}, limit is {}",
                        prompt_size,
                        self.meter.unit_name(),
                        self.input_limit
                    ),
                };
            }
            debug!(cycle, attempt, prompt_size, "Prompting model");

            let output = tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    return AgentState::Failed {
                        kind: ErrorKind::Cancelled,
                        detail: "cancelled while waiting for the model".to_string(),
                    };
                }
                result = tokio::time::timeout(self.config.model_timeout, self.model.complete(&prompt)) => result,
            };

            let output = match output {
                Err(_) => {
                    return AgentState::Failed {
                        kind: ErrorKind::ModelInvocationError,
                        detail: format!(
                            "model timed out after {}ms",
                            self.config.model_timeout.as_millis()
                        ),
                    }
                }
                Ok(Err(e)) => {
                    return AgentState::Failed {
                        kind: ErrorKind::ModelInvocationError,
                        detail: e.to_string(),
                    }
                }
                Ok(Ok(text)) => text,
            };

            let reason = match parse_output(&output) {
                ModelOutput::FinalAnswer(answer) => {
                    transcript.push(AgentStep {
                        cycle,
                        output,
                        action: StepAction::FinalAnswer(answer.clone()),
                        observation: None,
                    });
                    return AgentState::FinalAnswer(answer);
                }
                ModelOutput::ToolCall { tool, input } => match tools.get(&tool) {
                    Some(t) => {
                        return AgentState::ToolCall {
                            tool: t.name().to_string(),
                            input,
                            output,
                        }
                    }
                    None => format!(
                        "'{}' is not a valid tool, try one of [{}]",
                        tool,
                        tools.names().join(", ")
                    ),
                },
                ModelOutput::ParseFailure(reason) => reason,
            };

            transcript.push(AgentStep {
                cycle,
                output,
                action: StepAction::Malformed(reason.clone()),
                observation: Some(format!(
                    "Invalid format: {reason}. Reply with either an Action and Action Input, or a Final Answer."
                )),
            });

            if attempt >= self.config.retry_count {
                return AgentState::Failed {
                    kind: ErrorKind::ParseFailure,
                    detail: reason,
                };
            }
            attempt += 1;
            warn!(cycle, attempt, reason = %reason, "Unparseable model output, re-prompting");
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn call_tool(
        &self,
        cycle: usize,
        tools: &ToolSet,
        tool: String,
        input: String,
        output: String,
        transcript: &mut Transcript,
        cancel: &CancellationToken,
    ) -> AgentState {
        let Some(handle) = tools.get(&tool) else {
            return AgentState::Failed {
                kind: ErrorKind::ParseFailure,
                detail: format!("unknown tool '{tool}'"),
            };
        };

        let budget = self.observation_budget(tools, transcript, &output);
        debug!(cycle, tool = %tool, input = %input, budget, "Invoking tool");

        let result = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                return AgentState::Failed {
                    kind: ErrorKind::Cancelled,
                    detail: "cancelled during tool call".to_string(),
                };
            }
            result = handle.invoke(&input, budget) => result,
        };

        match result {
            Ok(observation) => {
                transcript.push(AgentStep {
                    cycle,
                    output,
                    action: StepAction::ToolCall { tool, input },
                    observation: Some(observation.text),
                });
                AgentState::Thinking
            }
            Err(e) => AgentState::Failed {
                kind: e.kind,
                detail: e.message,
            },
        }
    }

    /// Room left for an observation once `output` joins the scratchpad.
    fn observation_budget(&self, tools: &ToolSet, transcript: &Transcript, output: &str) -> usize {
        let used = self.meter.measure(&prompt::render(tools, transcript))
            + self
                .meter
                .measure(&format!(" {}\nObservation: \nThought:", output.trim()));
        self.input_limit.saturating_sub(used)
    }
}
