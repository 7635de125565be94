pub mod types;
pub mod config;
pub mod topology;
pub mod data;
pub mod processing;
pub mod render;
pub mod server;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the datasets and write the choropleth page to the output directory
    Render {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Overrides `output.dir` from the config
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
    /// Render the map, then serve it with the county lookup API
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

async fn build_map(app_config: &config::AppConfig) -> anyhow::Result<processing::Choropleth> {
    // 1. Load both datasets
    let datasets = data::load_data(app_config).await?;

    // 2. Join and derive scale and legend
    let map = processing::process_data(app_config, datasets);

    // 3. Write page, SVG and GeoJSON
    render::generate_map(app_config, &map)?;

    Ok(map)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render { config, output } => {
            let mut app_config = config::AppConfig::load_or_default(&config)?;
            if let Some(dir) = output {
                app_config.output.dir = dir;
            }

            build_map(&app_config).await?;
            tracing::info!(dir = %app_config.output.dir.display(), "render complete");
        }
        Commands::Serve { config } => {
            let app_config = config::AppConfig::load_or_default(&config)?;

            let map = build_map(&app_config).await?;
            server::start_server(app_config, map).await?;
        }
    }

    Ok(())
}
