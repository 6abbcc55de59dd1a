//! Compact rendering for log lines and agent-facing instructions.

/// Collapse whitespace and bound length.
pub fn compact_line(input: &str, max_chars: usize) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let preview: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", preview)
    } else {
        preview
    }
}

/// Numbered list of plan steps, one per line, marking those already done.
pub fn render_plan(plan: &[String], current_step: usize) -> String {
    plan.iter()
        .enumerate()
        .map(|(i, step)| {
            let mark = if i < current_step { "x" } else { " " };
            format!("  [{}] {}. {}", mark, i + 1, step)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
