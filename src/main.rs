use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use serde::Serialize;

use facs_density::config::Config;
use facs_density::pipeline;

#[derive(Parser)]
#[command(author, version, about = "Flow cytometry batch conversion and density figures", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest, then draw the ridge and scatter figures
    Run(ConfigArgs),
    /// Convert instrument files to CSV/JSON and build the combined table
    Ingest(ConfigArgs),
    /// Draw the stacked density figure from exported CSVs
    Ridge(ConfigArgs),
    /// Draw density-coloured scatter figures for exported CSVs
    Scatter(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    /// JSON config file; flags below override its values
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,
    /// Root folder scanned for instrument files
    #[arg(short = 'i', long = "input")]
    input: Option<PathBuf>,
    /// Root folder for every output
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,
    /// FITC background ratio
    #[arg(long = "fitc-reference")]
    fitc_reference: Option<f64>,
    /// Pacific Blue background ratio
    #[arg(long = "pacific-blue-reference")]
    pacific_blue_reference: Option<f64>,
    /// Skip the `<name>_meta.json` sidecars
    #[arg(long = "no-metadata")]
    no_metadata: bool,
}

impl ConfigArgs {
    fn resolve(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        if let Some(input) = &self.input {
            config.input_dir = input.clone();
        }
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        if let Some(fitc) = self.fitc_reference {
            config.references.fitc = fitc;
        }
        if let Some(pacific_blue) = self.pacific_blue_reference {
            config.references.pacific_blue = pacific_blue;
        }
        if self.no_metadata {
            config.export_metadata = false;
        }
        config.validate()?;
        Ok(config)
    }
}

fn print_summary<T: Serialize>(summary: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(summary).context("serialising run summary")?;
    println!("{json}");
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => {
            let config = args.resolve()?;
            info!(
                "Processing {} into {}",
                config.input_dir.display(),
                config.output_dir.display()
            );
            print_summary(&pipeline::run_all(&config)?)
        }
        Commands::Ingest(args) => print_summary(&pipeline::run_ingest(&args.resolve()?)?),
        Commands::Ridge(args) => print_summary(&pipeline::run_ridge(&args.resolve()?)?),
        Commands::Scatter(args) => print_summary(&pipeline::run_scatter(&args.resolve()?)?),
    }
}
