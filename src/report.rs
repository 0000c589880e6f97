use harvester::{FixReport, SongCounts};

/// Renders a two-column table with a separator before each section after the first.
pub fn render_table(headers: (&str, &str), sections: &[&[(&str, u64)]]) -> String {
    let left = sections
        .iter()
        .flat_map(|rows| rows.iter().map(|(label, _)| label.len()))
        .chain(std::iter::once(headers.0.len()))
        .max()
        .unwrap_or(0);
    let right = sections
        .iter()
        .flat_map(|rows| rows.iter().map(|(_, value)| value.to_string().len()))
        .chain(std::iter::once(headers.1.len()))
        .max()
        .unwrap_or(0);

    let rule = format!("+-{}-+-{}-+\n", "-".repeat(left), "-".repeat(right));
    let mut out = String::new();
    out.push_str(&rule);
    out.push_str(&format!("| {:<left$} | {:>right$} |\n", headers.0, headers.1));
    out.push_str(&rule);
    for (i, rows) in sections.iter().enumerate() {
        if i > 0 {
            out.push_str(&rule);
        }
        for (label, value) in rows.iter() {
            out.push_str(&format!("| {:<left$} | {:>right$} |\n", label, value));
        }
    }
    out.push_str(&rule);
    out
}

pub fn counts_table(counts: &SongCounts) -> String {
    render_table(
        ("Type", "Items"),
        &[
            &[("Audio", counts.audio), ("Video", counts.video)],
            &[
                ("Downloaded", counts.downloaded),
                ("To download", counts.active),
                ("To fix", counts.inactive),
                ("Deleted", counts.deleted),
                ("Unknown", counts.unknown),
            ],
            &[("TOTAL", counts.total)],
        ],
    )
}

pub fn fix_table(report: &FixReport) -> String {
    render_table(
        ("Result", "Songs"),
        &[
            &[
                ("Fixed", report.fixed as u64),
                ("Requested", report.requested as u64),
                ("Errors", report.errors as u64),
                ("Deleted", report.deleted as u64),
            ],
            &[("Render refused", report.render_rejected as u64)],
            &[("TOTAL", report.total as u64)],
        ],
    )
}
