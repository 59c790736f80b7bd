//! Prompt rendering for the reasoning agent.

use crate::tools::ToolSet;
use crate::transcript::Transcript;

/// Stop sequence that keeps the model from inventing tool results.
pub const OBSERVATION_STOP: &str = "\nObservation:";

/// Render the full prompt for the next reasoning cycle.
pub fn render(tools: &ToolSet, transcript: &Transcript) -> String {
    let names = tools.names().join(", ");
    format!(
        "You are an assistant to a radiologist. Below is a description of an MRI image \
followed by reference material retrieved from a medical document collection. \
Give a careful diagnostic assessment: likely findings, a differential diagnosis and \
suggested next steps. Base it on the description and the references.\n\
\n\
You can use these tools:\n\
\n\
{tools}\n\
\n\
Reply in this format:\n\
\n\
Thought: reason about what to do next\n\
Action: the tool to use, one of [{names}]\n\
Action Input: the text to send to the tool\n\
Observation: the tool result (provided to you)\n\
... (Thought/Action/Action Input/Observation may repeat)\n\
Thought: I now know the final answer\n\
Final Answer: the diagnostic assessment\n\
\n\
Never write both an Action and a Final Answer in the same reply.\n\
\n\
Begin!\n\
\n\
Question: {context}\n\
Thought:{scratchpad}",
        tools = tools.describe(),
        context = transcript.context(),
        scratchpad = transcript.scratchpad(),
    )
}
