//! Interpretation of raw model output.
//!
//! Two layouts are accepted: the line-oriented `Action:` / `Action Input:` /
//! `Final Answer:` form, and a JSON object `{"action": ..., "action_input": ...}`
//! optionally wrapped in a markdown code block.

use serde::Deserialize;
use serde_json::Value;

/// The three possible readings of one model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelOutput {
    ToolCall { tool: String, input: String },
    FinalAnswer(String),
    ParseFailure(String),
}

const FINAL_ANSWER: &str = "final answer:";
const ACTION: &str = "action:";
const ACTION_INPUT: &str = "action input:";
const OBSERVATION: &str = "observation:";

/// Classify a model output.
pub fn parse_output(text: &str) -> ModelOutput {
    let text = text.trim();
    if text.is_empty() {
        return ModelOutput::ParseFailure("empty output".to_string());
    }

    if let Some(parsed) = parse_json(text) {
        return parsed;
    }

    parse_text(text)
}

#[derive(Deserialize)]
struct JsonAction {
    action: String,
    #[serde(default)]
    action_input: Value,
}

fn parse_json(text: &str) -> Option<ModelOutput> {
    if !text.contains('{') {
        return None;
    }
    let action: JsonAction = serde_json::from_str(&extract_json(text)).ok()?;

    let input = match action.action_input {
        Value::String(s) => s,
        Value::Null => String::new(),
        Value::Object(ref map) => map
            .get("query")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| action.action_input.to_string()),
        other => other.to_string(),
    };
    let input = input.trim().to_string();
    let name = action.action.trim();

    if name.eq_ignore_ascii_case("final answer") {
        return Some(if input.is_empty() {
            ModelOutput::ParseFailure("final answer is empty".to_string())
        } else {
            ModelOutput::FinalAnswer(input)
        });
    }

    Some(tool_call(name, &input))
}

/// Pull a JSON object out of surrounding prose or a code fence.
fn extract_json(text: &str) -> String {
    if let Some(start) = text.find("```json") {
        if let Some(end) = text[start + 7..].find("```") {
            return text[start + 7..start + 7 + end].trim().to_string();
        }
    }

    if let Some(start) = text.find("```") {
        if let Some(end) = text[start + 3..].find("```") {
            return text[start + 3..start + 3 + end].trim().to_string();
        }
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            return text[start..=end].to_string();
        }
    }

    text.to_string()
}

/// Byte offset just past `label` on the first line that starts with it.
fn find_label(text: &str, label: &str) -> Option<usize> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let indent = line.len() - line.trim_start().len();
        let body = &line[indent..];
        if body.len() >= label.len()
            && body.is_char_boundary(label.len())
            && body[..label.len()].eq_ignore_ascii_case(label)
        {
            return Some(offset + indent + label.len());
        }
        offset += line.len();
    }
    None
}

fn parse_text(text: &str) -> ModelOutput {
    let final_at = find_label(text, FINAL_ANSWER);
    let action_at = find_label(text, ACTION);
    // An "Action:" line only names a tool call when "Action Input:" follows it.
    let call = action_at
        .and_then(|at| find_label(&text[at..], ACTION_INPUT).map(|input| (at, at + input)));

    match (call, final_at) {
        (Some(_), Some(_)) => ModelOutput::ParseFailure(
            "output contains both an action and a final answer".to_string(),
        ),
        (None, Some(at)) => {
            let answer = text[at..].trim();
            if answer.is_empty() {
                ModelOutput::ParseFailure("final answer is empty".to_string())
            } else {
                ModelOutput::FinalAnswer(answer.to_string())
            }
        }
        (Some((action, input_at)), None) => {
            let name = text[action..].lines().next().unwrap_or_default();
            let mut input = &text[input_at..];
            if let Some(obs) = find_label(input, OBSERVATION) {
                input = &input[..obs - OBSERVATION.len()];
            }
            tool_call(name, input)
        }
        (None, None) if action_at.is_some() => {
            ModelOutput::ParseFailure("missing 'Action Input:' after 'Action:'".to_string())
        }
        (None, None) => {
            ModelOutput::ParseFailure("no 'Action:' or 'Final Answer:' found".to_string())
        }
    }
}

fn tool_call(name: &str, input: &str) -> ModelOutput {
    let tool = strip_quotes(name);
    let input = strip_quotes(input);

    if tool.is_empty() {
        return ModelOutput::ParseFailure("action names no tool".to_string());
    }
    if input.is_empty() {
        return ModelOutput::ParseFailure(format!("empty input for tool '{tool}'"));
    }

    ModelOutput::ToolCall {
        tool: tool.to_string(),
        input: input.to_string(),
    }
}

fn strip_quotes(s: &str) -> &str {
    s.trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim()
}
