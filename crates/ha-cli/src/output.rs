use ha_coordinator::StatusReport;

/// Render a queue status summary as human-readable text.
pub fn render_status(report: &StatusReport) -> String {
    if report.counts.is_empty() {
        return "No work items.".to_string();
    }
    let mut out = String::new();
    for c in &report.counts {
        out.push_str(&format!("{:<12} {:<14} {}\n", c.work_type, c.step, c.count));
    }
    out.push_str(&format!("\ntotal: {}\n", report.total()));
    out
}
