use crate::output::{emit, load_document};
use anyhow::Context;
use clap::{Args, ValueEnum};
use procflow_core::config::Config;
use procflow_core::mapper::{self, DiagramKind, MapOutput, RasterOutcome};
use std::path::PathBuf;

#[derive(Clone, Copy, Default, ValueEnum)]
pub enum MapFormat {
    #[default]
    Mermaid,
    Json,
}

#[derive(Args)]
pub struct MapArgs {
    /// Process document (JSON)
    #[arg(long, short = 'i')]
    input: PathBuf,

    /// Diagram type: flowchart, swimlane or bpmn
    #[arg(long = "type", value_name = "TYPE", default_value = "flowchart")]
    diagram_type: DiagramKind,

    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t)]
    format: MapFormat,

    /// Also export an image (.png, .svg or .pdf) via mmdc when installed
    #[arg(long)]
    image: Option<PathBuf>,
}

pub fn run(args: MapArgs, config: &Config) -> anyhow::Result<()> {
    let doc = load_document(&args.input)?;
    let mermaid = mapper::render(&doc, args.diagram_type);

    let mut out = MapOutput::new(&doc, args.diagram_type, mermaid);
    if let Some(target) = args.image.as_deref() {
        match mapper::rasterize(&out.mermaid, target, config)
            .with_context(|| format!("failed to export {}", target.display()))?
        {
            RasterOutcome::Written(path) => out.image = Some(path),
            RasterOutcome::Skipped { warning } => out.warnings.push(warning),
        }
    }

    let content = match args.format {
        MapFormat::Mermaid => out.mermaid,
        MapFormat::Json => {
            let mut json = serde_json::to_string_pretty(&out)?;
            json.push('\n');
            json
        }
    };
    emit(args.output.as_deref(), &content)
}
