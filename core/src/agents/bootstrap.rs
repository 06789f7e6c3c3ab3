//! Single-sourced bootstrap prompt assembly. Every spawn path (creation,
//! any future respawn-on-failure path) must call this function rather than
//! hand-rolling the text — a template and a hand-rolled duplicate drifting
//! apart is a defect class this crate avoids by construction.

/// Embeds the agent's identity and token *as text content only*; the
/// multiplexer adapter never puts either into an environment variable.
pub fn build_bootstrap_prompt(agent_id: &str, token: &str, endpoint: &str, working_directory: &str) -> String {
    format!(
        "You are agent \"{agent_id}\" connecting to the Agent-MCP orchestrator.\n\
         Endpoint: {endpoint}\n\
         Your working directory: {working_directory}\n\
         Authenticate every tool call with this token: {token}\n\
         Do not print this token anywhere other than the tool calls that require it."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeds_token_exactly_once() {
        let prompt = build_bootstrap_prompt("idx-1", "tok-abc123", "http://localhost:3001/mcp", "/work");
        assert_eq!(prompt.matches("tok-abc123").count(), 1);
        assert!(prompt.contains("idx-1"));
    }
}
