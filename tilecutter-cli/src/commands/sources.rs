//! `tilecutter sources`: list the candidates for a tile in merge order.

use clap::Args;
use tilecutter::app::TileServerApp;
use tilecutter::coord::TileCoord;

use super::common::CatalogArgs;
use crate::error::CliError;
use crate::runner::CliRunner;

#[derive(Debug, Args)]
pub struct SourcesArgs {
    /// Tile as z/x/y
    pub tile: String,

    #[command(flatten)]
    pub catalog: CatalogArgs,
}

pub fn run(runner: CliRunner, args: SourcesArgs) -> Result<(), CliError> {
    let tile: TileCoord = args
        .tile
        .parse()
        .map_err(|e| CliError::InvalidArgument(format!("{}", e)))?;
    let config = runner.config().clone();

    let candidates = runner.block_on(async move {
        let app = TileServerApp::open(config).await?;
        let candidates = app.renderer().candidates(&tile);
        app.shutdown().await;
        candidates.map_err(CliError::from)
    })?;

    if candidates.is_empty() {
        println!("No sources cover {}", tile);
        return Ok(());
    }

    println!("Sources for {} (highest precedence first):", tile);
    println!();
    println!(
        "{:>4}  {:<24} {:>8} {:>10}  {:<12} LOCATION",
        "RANK", "ID", "PRIORITY", "RES", "SRS"
    );
    for (rank, source) in candidates.iter().enumerate() {
        println!(
            "{:>4}  {:<24} {:>8} {:>10.3}  {:<12} {}",
            rank,
            source.id,
            source.priority,
            source.resolution,
            source.srs.to_string(),
            source.location
        );
    }
    Ok(())
}
