use crate::output::{emit, load_document, markdown_table, num, ReportFormat};
use anyhow::Context;
use clap::Args;
use procflow_core::compare::{self, Comparison, MatchStrategy, MetricDelta};
use procflow_core::config::Config;
use std::fmt::Write as _;
use std::path::PathBuf;

#[derive(Args)]
pub struct CompareArgs {
    /// Current process document (JSON)
    #[arg(long, short = 'i', alias = "current")]
    input: PathBuf,

    /// Proposed process document (JSON)
    #[arg(long)]
    proposed: PathBuf,

    /// Step matching: auto, id or name
    #[arg(long = "match", value_name = "STRATEGY", default_value = "auto")]
    strategy: MatchStrategy,

    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t)]
    format: ReportFormat,
}

pub fn run(args: CompareArgs, config: &Config) -> anyhow::Result<()> {
    let current = load_document(&args.input)?;
    let proposed = load_document(&args.proposed)?;
    let comparison = compare::compare(&current, &proposed, args.strategy, config)
        .context("failed to compare processes")?;

    let content = match args.format {
        ReportFormat::Json => comparison.to_json_pretty()?,
        ReportFormat::Markdown => render_markdown(&comparison),
    };
    emit(args.output.as_deref(), &content)
}

fn delta_row(label: &str, d: &MetricDelta) -> Vec<String> {
    vec![label.to_string(), num(d.current), num(d.proposed), num(d.delta)]
}

fn render_markdown(c: &Comparison) -> String {
    let mut out = format!(
        "# Comparison: {} vs {}\n\nMatched by {}; {} unchanged, {} modified, {} added, {} removed.\n\n",
        c.current_process,
        c.proposed_process,
        c.strategy,
        c.unchanged,
        c.modified.len(),
        c.added.len(),
        c.removed.len()
    );

    let d = &c.deltas;
    let rows = vec![
        delta_row("Cycle time (min)", &d.cycle_time_minutes),
        delta_row("Processing time (min)", &d.processing_time_minutes),
        delta_row("Wait time (min)", &d.wait_time_minutes),
        delta_row("Efficiency (%)", &d.efficiency_percent),
        delta_row("Steps", &d.step_count),
        delta_row("Handoffs", &d.handoff_count),
    ];
    out.push_str(&markdown_table(&["metric", "current", "proposed", "delta"], &rows));
    if let Some(pct) = d.cycle_time_change_percent {
        let _ = writeln!(out, "\nCycle time change: {pct}%");
    }

    if !c.added.is_empty() {
        out.push_str("\n## Added\n\n");
        for s in &c.added {
            let _ = writeln!(out, "- `{}` {}", s.id, s.name);
        }
    }
    if !c.removed.is_empty() {
        out.push_str("\n## Removed\n\n");
        for s in &c.removed {
            let _ = writeln!(out, "- `{}` {}", s.id, s.name);
        }
    }
    if !c.modified.is_empty() {
        out.push_str("\n## Modified\n\n");
        for m in &c.modified {
            let _ = writeln!(out, "### {} (`{}` → `{}`)\n", m.name, m.current_id, m.proposed_id);
            for change in &m.changes {
                let _ = writeln!(out, "- {}: {} → {}", change.field, change.before, change.after);
            }
        }
    }
    out
}
