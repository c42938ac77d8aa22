use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use log::info;

use tilestat::config::{load_config, GridConfig, ReportConfig};
use tilestat::engine::MatchEngine;
use tilestat::report::ReportWriter;
use tilestat::rollup::StatsRollup;
use tilestat::trace::TraceFile;

#[derive(Parser)]
#[command(version, about = "Roll up per-tile performance counter traces")]
struct TilestatArgs {
    #[arg(help = "Path to the counter trace CSV")]
    input: PathBuf,
    #[arg(long, help = "Path to config.toml")]
    config: Option<PathBuf>,
    #[arg(long, help = "Override mesh X dimension")]
    dim_x: Option<usize>,
    #[arg(long, help = "Override mesh Y dimension")]
    dim_y: Option<usize>,
    #[arg(long, help = "Also write a stats file per tile")]
    tile: bool,
    #[arg(long, help = "Also write a stats file per tile group")]
    tile_group: bool,
    #[arg(long, help = "Override output directory")]
    out_dir: Option<PathBuf>,
}

pub fn main() -> anyhow::Result<()> {
    env_logger::init();

    let argv = TilestatArgs::parse();
    let (mut grid, mut report) = match &argv.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            load_config(&text)
        }
        None => (GridConfig::default(), ReportConfig::default()),
    };

    // override toml configs with argv
    grid.dim_x = argv.dim_x.unwrap_or(grid.dim_x);
    grid.dim_y = argv.dim_y.unwrap_or(grid.dim_y);
    report.per_tile |= argv.tile;
    report.per_tile_group |= argv.tile_group;
    if let Some(out_dir) = argv.out_dir {
        report.out_dir = out_dir;
    }
    if grid.num_tiles() == 0 {
        bail!(
            "mesh dimensions must be non-zero (got {}x{})",
            grid.dim_x,
            grid.dim_y
        );
    }

    let trace = TraceFile::load(&argv.input)
        .with_context(|| format!("failed to load trace {}", argv.input.display()))?;

    let mut engine = MatchEngine::new(&trace.schema, grid);
    for record in &trace.records {
        engine.process(record)?;
    }
    let outcome = engine.finish();
    let rollup = StatsRollup::build(trace.schema, grid, outcome);

    if !rollup.warnings().is_empty() {
        info!("{} unmatched start/end warnings", rollup.warnings().len());
    }

    ReportWriter::new(&rollup)
        .write_all(&report)
        .context("failed to write report files")?;
    Ok(())
}
