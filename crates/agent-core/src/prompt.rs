/// Assemble the system instructions handed to the automation agent for one
/// run. The `BLOCKED:` convention here is what the executor's halt detection
/// matches against.
pub fn build_agent_instructions(allowlist: &[String]) -> String {
    let mut lines = vec![
        "You control a web browser. Respond ONLY with tool actions (click/type/key/scroll/screenshot/wait).".to_string(),
        "Prefer keys over clicks (use Enter to submit).".to_string(),
        "If you see captcha, login wall, or paywall, STOP immediately and output 'BLOCKED:<reason>'.".to_string(),
    ];
    if !allowlist.is_empty() {
        lines.push(format!(
            "Only interact within these domains: {}",
            allowlist.join(", ")
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::build_agent_instructions;

    #[test]
    fn allowlist_line_only_when_non_empty() {
        let bare = build_agent_instructions(&[]);
        assert!(!bare.contains("Only interact"));

        let restricted = build_agent_instructions(&["example.com".into(), "help.example.com".into()]);
        assert!(restricted.contains("Only interact within these domains: example.com, help.example.com"));
    }
}
