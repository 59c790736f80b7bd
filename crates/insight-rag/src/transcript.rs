//! Reasoning transcript owned by a single agent run.

/// What the agent decided in one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    ToolCall { tool: String, input: String },
    FinalAnswer(String),
    /// Output that could not be interpreted; holds the reason
    Malformed(String),
}

/// One thought/action/observation cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentStep {
    /// 1-based reasoning cycle this step belongs to
    pub cycle: usize,
    /// Raw model output
    pub output: String,
    pub action: StepAction,
    /// Tool result or format correction fed back to the model
    pub observation: Option<String>,
}

/// Append-only record of a run: the assembled context plus every step.
///
/// Never shared between runs; dropped (or attached to an error) when the run
/// ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    context: String,
    steps: Vec<AgentStep>,
}

impl Transcript {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            steps: Vec::new(),
        }
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn push(&mut self, step: AgentStep) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[AgentStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of tool invocations recorded.
    pub fn tool_calls(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.action, StepAction::ToolCall { .. }))
            .count()
    }

    /// Render prior steps in the Thought/Action/Observation layout the
    /// prompt expects to continue from.
    pub fn scratchpad(&self) -> String {
        let mut out = String::new();
        for step in &self.steps {
            if let Some(observation) = &step.observation {
                out.push(' ');
                out.push_str(step.output.trim());
                out.push_str("\nObservation: ");
                out.push_str(observation.trim());
                out.push_str("\nThought:");
            }
        }
        out
    }
}
