use crate::output::{emit, load_document, ReportFormat};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Args)]
pub struct ValidateArgs {
    /// Process document (JSON)
    #[arg(long, short = 'i')]
    input: PathBuf,

    #[arg(long, value_enum, default_value_t)]
    format: ReportFormat,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidationSummary {
    valid: bool,
    schema_version: String,
    process_name: String,
    step_count: usize,
    role_count: usize,
    gap_count: usize,
    has_metrics: bool,
}

/// Fails with a schema error listing every violation; prints a summary otherwise.
pub fn run(args: ValidateArgs) -> anyhow::Result<()> {
    let doc = load_document(&args.input)?;
    let summary = ValidationSummary {
        valid: true,
        schema_version: doc.schema_version.clone(),
        process_name: doc.process_name.clone(),
        step_count: doc.steps.len(),
        role_count: doc.roles.len(),
        gap_count: doc.gaps.len(),
        has_metrics: doc.metrics.is_some(),
    };

    let content = match args.format {
        ReportFormat::Json => {
            let mut json = serde_json::to_string_pretty(&summary)?;
            json.push('\n');
            json
        }
        ReportFormat::Markdown => format!(
            "{}: valid (schema {}, {} steps, {} roles, {} gaps)\n",
            summary.process_name,
            summary.schema_version,
            summary.step_count,
            summary.role_count,
            summary.gap_count
        ),
    };
    emit(None, &content)
}
