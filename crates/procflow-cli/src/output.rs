use anyhow::Context;
use clap::ValueEnum;
use procflow_core::document::ProcessDocument;
use std::io::Write;
use std::path::Path;

/// Output format shared by the report-producing commands.
#[derive(Clone, Copy, Default, ValueEnum)]
pub enum ReportFormat {
    #[default]
    Json,
    Markdown,
}

/// Write to `--output` atomically, or to stdout when no path is given.
pub fn emit(output: Option<&Path>, content: &str) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            procflow_core::io::atomic_write(path, content.as_bytes())
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "wrote output");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(content.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

pub fn load_document(path: &Path) -> anyhow::Result<ProcessDocument> {
    ProcessDocument::load(path)
        .with_context(|| format!("failed to load process document {}", path.display()))
}

pub fn markdown_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    out.push_str(&format!("| {} |\n", headers.join(" | ")));
    let sep: Vec<&str> = headers.iter().map(|_| "---").collect();
    out.push_str(&format!("| {} |\n", sep.join(" | ")));
    for row in rows {
        let cells: Vec<String> = row.iter().map(|c| c.replace('|', "\\|")).collect();
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    out
}

/// `n/a` for values that could not be computed.
pub fn num(value: Option<f64>) -> String {
    value.map(|v| format!("{v}")).unwrap_or_else(|| "n/a".to_string())
}

pub fn or_dash(value: Option<&str>) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or("-")
        .to_string()
}
