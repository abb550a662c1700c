//! `tilecutter render`: render one tile to a file.

use std::path::PathBuf;

use clap::Args;
use tilecutter::app::TileServerApp;
use tilecutter::render::{parse_bands, RenderRequest};
use tokio_util::sync::CancellationToken;

use super::common::CatalogArgs;
use crate::error::CliError;
use crate::runner::{cancel_on_ctrlc, CliRunner};

#[derive(Debug, Args)]
pub struct RenderArgs {
    /// Tile to render, e.g. 12/2200/1343.png or 12/2200/1343.rgb.png
    pub tile: String,

    /// Output file (default: z-x-y.ext in the current directory)
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// One-based source bands, e.g. 1,2,3
    #[arg(long)]
    pub bands: Option<String>,

    #[command(flatten)]
    pub catalog: CatalogArgs,
}

impl RenderArgs {
    pub fn request(&self) -> Result<RenderRequest, CliError> {
        let mut request = RenderRequest::parse(&self.tile)?;
        if let Some(bands) = &self.bands {
            request = request.with_bands(parse_bands(bands)?);
        }
        Ok(request)
    }

    pub fn output_path(&self, request: &RenderRequest) -> PathBuf {
        self.output.clone().unwrap_or_else(|| {
            let tile = request.tile;
            PathBuf::from(format!(
                "{}-{}-{}.{}",
                tile.zoom,
                tile.x,
                tile.y,
                request.format.extension()
            ))
        })
    }
}

pub fn run(runner: CliRunner, args: RenderArgs) -> Result<(), CliError> {
    let request = args.request()?;
    let output = args.output_path(&request);
    let config = runner.config().clone();

    let rendered = runner.block_on(async move {
        let app = TileServerApp::open(config).await?;
        let cancel = CancellationToken::new();
        cancel_on_ctrlc(cancel.clone());
        let rendered = app.renderer().render_with_cancel(&request, cancel).await;
        app.shutdown().await;
        rendered.map_err(CliError::from)
    })?;

    std::fs::write(&output, &rendered.bytes).map_err(|error| CliError::FileWrite {
        path: output.clone(),
        error,
    })?;

    let stats = &rendered.stats;
    println!("Wrote {} ({} bytes)", output.display(), rendered.bytes.len());
    println!(
        "  sources: {} used, {} failed of {} candidates",
        stats.used, stats.failed, stats.candidates
    );
    println!("  valid pixels: {}", stats.valid_pixels);
    println!("  elapsed: {:.1?}", stats.elapsed);
    Ok(())
}
