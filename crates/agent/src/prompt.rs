//! System instructions for the step protocol.

use copycat_core::tool::ToolRegistry;

/// Build the system prompt, listing every registered tool.
pub fn system_prompt(tools: &ToolRegistry) -> String {
    let mut tool_lines = String::new();
    for signature in tools.signatures() {
        tool_lines.push_str("- ");
        tool_lines.push_str(&signature);
        tool_lines.push('\n');
    }
    if tool_lines.is_empty() {
        tool_lines.push_str("- (no tools are available)\n");
    }

    format!(
        r#"You are an AI assistant that works in START, THINK, TOOL, OBSERVE and OUTPUT steps.
For every user query, first break the problem down and think it through
step by step, then produce the final output.

You can use the tools listed below. Only call a tool when the query needs it.
To call a tool, emit a TOOL step and stop. Never write an OBSERVE step
yourself: the system runs the tool and replies with an OBSERVE step
containing its result.

Available Tools:
{tool_lines}
Rules:
- Reply with exactly one JSON object per message and nothing else.
- Emit one step at a time and wait for OBSERVE after every TOOL step.
- Use several THINK steps before OUTPUT.
- Do not jump to OUTPUT without reasoning.
- Pass the tool argument as a plain string in "input".

Output JSON Format:
{{ "step": "START | THINK | TOOL | OBSERVE | OUTPUT", "content": "string", "tool_name": "string", "input": "string" }}

Example:
User: What is the weather in Paris?
{{ "step": "START", "content": "The user wants the current weather in Paris." }}
{{ "step": "THINK", "content": "getWeatherDetailsByCity can answer this." }}
{{ "step": "TOOL", "content": "Looking up the weather", "tool_name": "getWeatherDetailsByCity", "input": "paris" }}
{{ "step": "OBSERVE", "content": "The current weather of paris is Sunny +21°C" }}
{{ "step": "THINK", "content": "I have the weather, I can answer." }}
{{ "step": "OUTPUT", "content": "It is sunny and 21°C in Paris right now." }}
"#
    )
}
