use crate::output::{emit, load_document, markdown_table, num, or_dash, ReportFormat};
use anyhow::Context;
use clap::Args;
use procflow_core::config::Config;
use procflow_core::efficiency::{self, EfficiencyReport, WasteMeasure};
use std::fmt::Write as _;
use std::path::PathBuf;

#[derive(Args)]
pub struct EfficiencyArgs {
    /// Process document (JSON)
    #[arg(long, short = 'i')]
    input: PathBuf,

    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t)]
    format: ReportFormat,

    /// Cache the computed metrics in the input document
    #[arg(long, alias = "update-document")]
    write_back: bool,
}

pub fn run(args: EfficiencyArgs, config: &Config) -> anyhow::Result<()> {
    let mut doc = load_document(&args.input)?;
    let report = efficiency::analyze(&doc, config);

    if args.write_back {
        efficiency::write_back(&mut doc, &report);
        doc.save(&args.input)
            .with_context(|| format!("failed to update {}", args.input.display()))?;
    }

    let content = match args.format {
        ReportFormat::Json => report.to_json_pretty()?,
        ReportFormat::Markdown => render_markdown(&report),
    };
    emit(args.output.as_deref(), &content)
}

fn render_markdown(report: &EfficiencyReport) -> String {
    let m = &report.metrics;
    let mut out = format!("# Efficiency: {}\n\n", report.process_name);

    let rows = vec![
        vec!["Cycle time (min)".to_string(), num(m.cycle_time_minutes)],
        vec!["Processing time (min)".to_string(), num(m.processing_time_minutes)],
        vec!["Wait time (min)".to_string(), num(m.wait_time_minutes)],
        vec!["Total work (min)".to_string(), num(m.total_work_minutes)],
        vec!["Efficiency (%)".to_string(), num(m.efficiency_percent)],
        vec!["Steps".to_string(), m.step_count.to_string()],
        vec!["Steps with duration".to_string(), m.steps_with_duration.to_string()],
        vec!["Handoffs".to_string(), m.handoff_count.to_string()],
    ];
    out.push_str(&markdown_table(&["metric", "value"], &rows));

    out.push_str("\n## Bottlenecks\n\n");
    if report.bottlenecks.is_empty() {
        out.push_str("_None detected._\n");
    } else {
        let rows: Vec<Vec<String>> = report
            .bottlenecks
            .iter()
            .map(|b| {
                vec![
                    b.step_id.clone(),
                    b.step_name.clone(),
                    or_dash(b.role.as_deref()),
                    num(b.duration_minutes),
                    b.handoff_count.to_string(),
                    b.reasons.join("; "),
                ]
            })
            .collect();
        out.push_str(&markdown_table(
            &["id", "step", "role", "minutes", "handoffs", "why"],
            &rows,
        ));
    }

    out.push_str("\n## Waste\n\n");
    for entry in &report.waste {
        match &entry.measure {
            WasteMeasure::Computed { value, detail } => {
                let _ = writeln!(out, "- **{}**: {value} ({detail})", entry.category);
            }
            WasteMeasure::NotComputed { reason } => {
                let _ = writeln!(out, "- **{}**: not computed, {reason}", entry.category);
            }
        }
    }
    out
}
