use crate::output::{emit, markdown_table, ReportFormat};
use clap::Args;
use procflow_core::capability::{self, Capability, CapabilityStatus};
use procflow_core::config::{CapabilityPolicy, Config};
use serde::Serialize;

#[derive(Args)]
pub struct CapabilitiesArgs {
    #[arg(long, value_enum, default_value_t)]
    format: ReportFormat,
}

#[derive(Serialize)]
struct CapabilityReport {
    name: &'static str,
    command: String,
    policy: CapabilityPolicy,
    #[serde(flatten)]
    status: CapabilityStatus,
}

pub fn run(args: CapabilitiesArgs, config: &Config) -> anyhow::Result<()> {
    let reports: Vec<CapabilityReport> = Capability::all()
        .iter()
        .map(|&cap| {
            let settings = cap.settings(config);
            CapabilityReport {
                name: cap.name(),
                command: settings.command.clone(),
                policy: settings.policy,
                status: capability::probe(cap, settings),
            }
        })
        .collect();

    let content = match args.format {
        ReportFormat::Json => {
            let mut json = serde_json::to_string_pretty(&reports)?;
            json.push('\n');
            json
        }
        ReportFormat::Markdown => {
            let rows: Vec<Vec<String>> = reports
                .iter()
                .map(|r| {
                    let (status, detail) = match &r.status {
                        CapabilityStatus::Available { program } => {
                            ("available", program.display().to_string())
                        }
                        CapabilityStatus::Degrade { reason } => ("degraded", reason.clone()),
                        CapabilityStatus::Fail { reason } => ("missing (required)", reason.clone()),
                    };
                    vec![
                        r.name.to_string(),
                        r.command.clone(),
                        r.policy.as_str().to_string(),
                        status.to_string(),
                        detail,
                    ]
                })
                .collect();
            markdown_table(&["capability", "command", "policy", "status", "detail"], &rows)
        }
    };
    emit(None, &content)
}
