use crate::output::{emit, load_document, markdown_table, or_dash, ReportFormat};
use anyhow::Context;
use clap::Args;
use procflow_core::config::Config;
use procflow_core::gaps::{self, GapReport};
use procflow_core::types::Severity;
use std::fmt::Write as _;
use std::path::PathBuf;

#[derive(Args)]
pub struct GapsArgs {
    /// Process document (JSON)
    #[arg(long, short = 'i')]
    input: PathBuf,

    /// Minimum severity to report: low, medium, high or critical
    #[arg(long, default_value = "low")]
    severity: Severity,

    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t)]
    format: ReportFormat,

    /// Store the full gap list back into the input document
    #[arg(long, alias = "update-document")]
    write_back: bool,
}

pub fn run(args: GapsArgs, config: &Config) -> anyhow::Result<()> {
    let mut doc = load_document(&args.input)?;
    let all = gaps::analyze(&doc, config);

    if args.write_back {
        gaps::write_back(&mut doc, &all);
        doc.save(&args.input)
            .with_context(|| format!("failed to update {}", args.input.display()))?;
    }

    let report = GapReport::new(&doc, gaps::filter_by_severity(all, args.severity));
    let content = match args.format {
        ReportFormat::Json => report.to_json_pretty()?,
        ReportFormat::Markdown => render_markdown(&report),
    };
    emit(args.output.as_deref(), &content)
}

fn render_markdown(report: &GapReport) -> String {
    let s = &report.summary;
    let mut out = format!("# Gap analysis: {}\n\n", report.process_name);
    let _ = writeln!(
        out,
        "{} gaps: {} critical, {} high, {} medium, {} low\n",
        s.total, s.critical, s.high, s.medium, s.low
    );
    if report.gaps.is_empty() {
        out.push_str("_No gaps at this severity._\n");
        return out;
    }

    let rows: Vec<Vec<String>> = report
        .gaps
        .iter()
        .map(|g| {
            vec![
                g.severity.to_string(),
                g.gap_type.to_string(),
                or_dash(g.step_id.as_deref()),
                g.description.clone(),
            ]
        })
        .collect();
    out.push_str(&markdown_table(&["severity", "type", "step", "description"], &rows));

    out.push_str("\n## Questions\n\n");
    for gap in &report.gaps {
        for q in &gap.suggested_questions {
            let _ = writeln!(out, "- {q}");
        }
    }
    out
}
