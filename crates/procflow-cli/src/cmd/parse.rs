use crate::output::{emit, markdown_table, num, or_dash, ReportFormat};
use anyhow::Context;
use clap::Args;
use procflow_core::config::Config;
use procflow_core::document::ProcessDocument;
use procflow_core::parser::{self, InputKind, ParseOptions};
use std::fmt::Write as _;
use std::path::PathBuf;

#[derive(Args)]
pub struct ParseArgs {
    /// File path or http(s) URL
    #[arg(long, short = 'i')]
    input: String,

    /// Input kind: auto, text, url, image or transcript
    #[arg(long, default_value = "auto")]
    kind: InputKind,

    /// Override the process name
    #[arg(long)]
    name: Option<String>,

    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t)]
    format: ReportFormat,
}

pub fn run(args: ParseArgs, config: &Config) -> anyhow::Result<()> {
    let opts = ParseOptions { name: args.name };
    let doc = parser::parse(&args.input, args.kind, &opts, config)
        .with_context(|| format!("failed to parse {}", args.input))?;

    let content = match args.format {
        ReportFormat::Json => doc.to_json_pretty()?,
        ReportFormat::Markdown => render_markdown(&doc),
    };
    emit(args.output.as_deref(), &content)
}

pub fn render_markdown(doc: &ProcessDocument) -> String {
    let mut out = format!("# {}\n\n", doc.process_name);
    if let Some(owner) = doc.process_owner.as_deref() {
        let _ = writeln!(out, "**Owner:** {owner}  ");
    }
    let _ = writeln!(
        out,
        "**Source:** {} `{}`  ",
        doc.source.source_type, doc.source.location
    );
    let _ = writeln!(out, "**Confidence:** {}\n", doc.confidence_score);
    if let Some(description) = doc.description.as_deref() {
        let _ = writeln!(out, "{description}\n");
    }

    out.push_str("## Steps\n\n");
    if doc.steps.is_empty() {
        out.push_str("_No steps found._\n\n");
    } else {
        let rows: Vec<Vec<String>> = doc
            .ordered_steps()
            .iter()
            .map(|s| {
                vec![
                    s.sequence.to_string(),
                    s.id.clone(),
                    s.display_name().to_string(),
                    or_dash(s.role_name()),
                    num(s.duration_minutes),
                    s.automation_potential.to_string(),
                    s.confidence.to_string(),
                ]
            })
            .collect();
        out.push_str(&markdown_table(
            &["#", "id", "step", "role", "minutes", "automation", "confidence"],
            &rows,
        ));
        out.push('\n');
    }

    if !doc.roles.is_empty() {
        let _ = writeln!(out, "## Roles\n\n{}\n", doc.roles.join(", "));
    }

    if !doc.gaps.is_empty() {
        out.push_str("## Gaps\n\n");
        for gap in &doc.gaps {
            let _ = writeln!(
                out,
                "- **{}** `{}` {}",
                gap.severity, gap.gap_type, gap.description
            );
        }
    }
    out
}
