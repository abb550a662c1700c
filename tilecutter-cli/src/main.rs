//! tilecutter CLI - serve and render elevation tiles.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::{init, render, serve, sources};
use error::CliError;
use runner::CliRunner;

#[derive(Parser)]
#[command(name = "tilecutter")]
#[command(version, about = "On-demand elevation tiles from GeoTIFF sources", long_about = None)]
struct Cli {
    /// Config file (default: ~/.tilecutter/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP tile server
    Serve(serve::ServeArgs),
    /// Render one tile to a file
    Render(render::RenderArgs),
    /// List the sources that would be composited for a tile
    Sources(sources::SourcesArgs),
    /// Write the default config file
    Init(init::InitArgs),
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        e.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = cli.config.as_deref();
    match cli.command {
        Command::Serve(args) => {
            let runner = CliRunner::new(config, cli.verbose, |c| args.apply(c))?;
            serve::run(runner)
        }
        Command::Render(args) => {
            let runner = CliRunner::new(config, cli.verbose, |c| args.catalog.apply(c))?;
            render::run(runner, args)
        }
        Command::Sources(args) => {
            let runner = CliRunner::new(config, cli.verbose, |c| args.catalog.apply(c))?;
            sources::run(runner, args)
        }
        Command::Init(args) => init::run(config, args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve_flags() {
        let cli = Cli::try_parse_from([
            "tilecutter",
            "serve",
            "--port",
            "9000",
            "--catalog-file",
            "catalog.json",
        ])
        .unwrap();
        match cli.command {
            Command::Serve(args) => {
                assert_eq!(args.port, Some(9000));
                assert_eq!(args.catalog.catalog_file, Some(PathBuf::from("catalog.json")));
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_catalog_flags_conflict() {
        let result = Cli::try_parse_from([
            "tilecutter",
            "sources",
            "3/1/2",
            "--catalog-file",
            "c.json",
            "--database-url",
            "postgres://db",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_config_flag() {
        let cli =
            Cli::try_parse_from(["tilecutter", "render", "3/1/2.png", "--config", "/etc/tc.ini"])
                .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/tc.ini")));
    }
}
