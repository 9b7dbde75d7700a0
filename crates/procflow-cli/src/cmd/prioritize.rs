use crate::output::{emit, markdown_table};
use anyhow::Context;
use clap::{Args, ValueEnum};
use procflow_core::config::Config;
use procflow_core::efficiency::EfficiencyReport;
use procflow_core::gaps::GapReport;
use procflow_core::prioritize::{self, Prioritization};
use procflow_core::types::Category;
use std::fmt::Write as _;
use std::path::PathBuf;

#[derive(Clone, Copy, Default, ValueEnum)]
pub enum PrioritizeFormat {
    #[default]
    Json,
    Markdown,
    Csv,
}

#[derive(Args)]
pub struct PrioritizeArgs {
    /// Gap report produced by `procflow gaps`
    #[arg(long, short = 'i', alias = "gaps")]
    input: PathBuf,

    /// Efficiency report produced by `procflow efficiency`
    #[arg(long)]
    efficiency: Option<PathBuf>,

    /// JSON array of manually proposed improvements
    #[arg(long)]
    candidates: Option<PathBuf>,

    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t)]
    format: PrioritizeFormat,
}

pub fn run(args: PrioritizeArgs, config: &Config) -> anyhow::Result<()> {
    let gaps = GapReport::load(&args.input)
        .with_context(|| format!("failed to load gap report {}", args.input.display()))?;

    let efficiency = args
        .efficiency
        .as_deref()
        .map(|p| {
            EfficiencyReport::load(p)
                .with_context(|| format!("failed to load efficiency report {}", p.display()))
        })
        .transpose()?;

    let manual = match args.candidates.as_deref() {
        Some(p) => prioritize::load_manual_candidates(p)
            .with_context(|| format!("failed to load candidates {}", p.display()))?,
        None => Vec::new(),
    };

    let candidates = prioritize::generate(&gaps.gaps, efficiency.as_ref(), &manual, config);
    let result = prioritize::prioritize(&gaps.process_name, candidates);

    let content = match args.format {
        PrioritizeFormat::Json => result.to_json_pretty()?,
        PrioritizeFormat::Markdown => render_markdown(&result),
        PrioritizeFormat::Csv => result.to_csv(),
    };
    emit(args.output.as_deref(), &content)
}

fn render_markdown(p: &Prioritization) -> String {
    let mut out = format!("# Improvement roadmap: {}\n\n", p.process_name);
    if p.improvements.is_empty() {
        out.push_str("_No improvements to rank._\n");
    } else {
        let rows: Vec<Vec<String>> = p
            .improvements
            .iter()
            .map(|i| {
                vec![
                    i.rank.to_string(),
                    i.id.clone(),
                    i.title.clone(),
                    i.score.to_string(),
                    i.category.label().to_string(),
                    i.effort.to_string(),
                ]
            })
            .collect();
        out.push_str(&markdown_table(
            &["rank", "id", "title", "score", "category", "effort (weeks)"],
            &rows,
        ));

        for &category in Category::all() {
            let bucket = p.roadmap.bucket(category);
            if bucket.is_empty() {
                continue;
            }
            let _ = writeln!(out, "\n## {}\n", category.label());
            for id in bucket {
                if let Some(i) = p.improvements.iter().find(|i| &i.id == id) {
                    let _ = writeln!(out, "- `{}` {}", i.id, i.title);
                }
            }
        }
    }

    if !p.rejected.is_empty() {
        out.push_str("\n## Rejected\n\n");
        for r in &p.rejected {
            let _ = writeln!(out, "- `{}` {}: {}", r.id, r.title, r.reason);
        }
    }
    out
}
