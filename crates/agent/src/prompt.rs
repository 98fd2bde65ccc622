//! Prompt assembly.

use keepsake_config::PersonaConfig;

/// Lay out the full prompt for one turn:
///
/// ```text
/// <system prompt>
/// <tool descriptions>
/// [MEMORY]
/// <summary>
///
/// User: <message>
/// <persona name>:
/// ```
pub fn assemble(persona: &PersonaConfig, tools: &str, summary: &str, message: &str) -> String {
    let system = persona.system_prompt.trim_end();
    let tools = tools.trim_end();
    let mut prompt = String::with_capacity(
        system.len() + tools.len() + summary.len() + message.len() + persona.name.len() + 32,
    );

    prompt.push_str(system);
    prompt.push('\n');
    if !tools.is_empty() {
        prompt.push_str(tools);
        prompt.push('\n');
    }
    prompt.push_str("[MEMORY]\n");
    prompt.push_str(summary);
    prompt.push_str("\n\nUser: ");
    prompt.push_str(message);
    prompt.push('\n');
    prompt.push_str(&persona.name);
    prompt.push(':');
    prompt
}
