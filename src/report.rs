// src/report.rs
//! Markdown narrative brief.

use std::fmt::Write as _;

use crate::narrative::Narrative;
use crate::pipeline::PipelineReport;

pub const BRIEF_TITLE: &str = "Narrative Brief";

/// Render a finished report. Missing explanation fields and empty idea lists
/// are skipped.
pub fn render_markdown(report: &PipelineReport) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# {BRIEF_TITLE}");
    let _ = writeln!(md);
    let _ = writeln!(
        md,
        "**Period:** {} to {} ({} days)  ",
        report.period_start.format("%Y-%m-%d"),
        report.period_end.format("%Y-%m-%d"),
        report.window_days
    );
    let _ = writeln!(
        md,
        "**Generated:** {}  ",
        report.generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(md, "**Run:** `{}`  ", report.run_id);
    let _ = writeln!(md, "**Narratives Detected:** {}", report.narratives.len());
    let _ = writeln!(md);
    let _ = writeln!(
        md,
        "_{} signals, {} with momentum, {} clusters._",
        report.stats.total_signals, report.stats.momentum_signals, report.stats.clusters
    );
    let _ = writeln!(md);

    if report.narratives.is_empty() {
        let _ = writeln!(md, "No narrative met the detection criteria in this window.");
        return md;
    }

    for (i, n) in report.narratives.iter().enumerate() {
        let _ = writeln!(md, "---");
        let _ = writeln!(md);
        render_narrative(&mut md, i + 1, n);
    }
    md
}

fn render_narrative(md: &mut String, rank: usize, n: &Narrative) {
    let types = n
        .source_types
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let _ = writeln!(md, "## {rank}. {}", n.display_name());
    let _ = writeln!(md);
    let _ = writeln!(
        md,
        "**Momentum:** {:.1}% | **Strength:** {:.1}/100 | **Sources:** {types}",
        n.momentum_score, n.strength_score
    );
    let _ = writeln!(md);

    if let Some(explanation) = &n.explanation {
        let _ = writeln!(md, "{explanation}");
        let _ = writeln!(md);
    }
    if !n.why_it_matters.is_empty() {
        let _ = writeln!(md, "### Why it matters");
        let _ = writeln!(md);
        for bullet in &n.why_it_matters {
            let _ = writeln!(md, "- {bullet}");
        }
        let _ = writeln!(md);
    }
    if !n.build_ideas.is_empty() {
        let _ = writeln!(md, "### Build ideas");
        let _ = writeln!(md);
        for (i, idea) in n.build_ideas.iter().enumerate() {
            let _ = writeln!(md, "{}. **{}**", i + 1, idea.title);
            if !idea.description.is_empty() {
                let _ = writeln!(md, "   {}", idea.description);
            }
        }
        let _ = writeln!(md);
    }
    if !n.keywords.is_empty() {
        let _ = writeln!(md, "**Keywords:** {}", n.keywords.join(", "));
        let _ = writeln!(md);
    }
}
