//! `tilecutter serve`: run the HTTP tile server.

use std::net::IpAddr;

use clap::Args;
use tilecutter::app::TileServerApp;
use tilecutter::config::ConfigFile;

use super::common::CatalogArgs;
use crate::error::CliError;
use crate::runner::{cancel_on_ctrlc, CliRunner};

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Port to listen on (overrides PORT)
    #[arg(long, short)]
    pub port: Option<u16>,

    #[command(flatten)]
    pub catalog: CatalogArgs,
}

impl ServeArgs {
    pub fn apply(&self, config: &mut ConfigFile) {
        if let Some(bind) = self.bind {
            config.server.bind = bind;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        self.catalog.apply(config);
    }
}

pub fn run(runner: CliRunner) -> Result<(), CliError> {
    let config = runner.config().clone();
    let addr = config.socket_addr();

    runner.block_on(async move {
        let app = TileServerApp::start(config).await?;
        cancel_on_ctrlc(app.shutdown_token());

        println!("Serving tiles on http://{}", addr);
        println!("Press Ctrl+C to stop.");

        let served = app.serve().await;
        app.shutdown().await;
        served.map_err(CliError::from)
    })
}
