//! Railcast CLI
//!
//! Commands:
//! - calendar: Show the calendar features of a date
//! - stations: List known stations
//! - inspect: Describe the configured model artifact
//! - predict: Predict ridership for one station and day
//! - migrate: Rewrite the artifact in canonical form
//! - serve: Run the HTTP API

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use railcast::api::AppState;
use railcast::artifact::{self, ArtifactHandle};
use railcast::features::RowInput;
use railcast::{ForecastService, RailcastConfig, RidershipForecast, StationCatalog, calendar, logging, web};

#[derive(Parser)]
#[command(name = "railcast")]
#[command(version, about = "Daily ridership prediction for Istanbul rail stations")]
struct Cli {
    /// Configuration file (defaults to the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Model artifact, overrides the configured path
    #[arg(short, long, global = true)]
    artifact: Option<PathBuf>,
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the calendar features derived for a date
    Calendar {
        /// Date in YYYY-MM-DD form
        date: NaiveDate,
    },
    /// List stations, optionally filtered by name or district
    Stations {
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// Describe the components and weight of the model artifact
    Inspect,
    /// Predict ridership for one station and day
    Predict {
        /// Station label or unambiguous station name
        #[arg(short, long)]
        station: String,
        /// Defaults to today in the configured timezone
        #[arg(short, long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "0")]
        sunshine_hours: f64,
        #[arg(long, default_value = "0")]
        rain_mm: f64,
        #[arg(long, default_value = "20")]
        tmax: f64,
        #[arg(long, default_value = "10")]
        tmin: f64,
        /// Passage count of the previous period
        #[arg(long, default_value = "0")]
        passage_cnt: f64,
        #[arg(long)]
        religious_holiday: bool,
        /// Print the full forecast as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write the artifact back out in canonical form
    Migrate {
        /// Output path
        out: PathBuf,
    },
    /// Run the HTTP API
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
}

fn load_config(cli: &Cli) -> Result<RailcastConfig> {
    let mut config = RailcastConfig::load_from_path(cli.config.clone())?;
    if let Some(path) = &cli.artifact {
        config.artifact.path = path.clone();
    }
    Ok(config)
}

fn forecast_service(config: &RailcastConfig) -> Result<ForecastService> {
    let handle = Arc::new(ArtifactHandle::new(config.artifact.path.clone()));
    Ok(ForecastService::new(
        handle,
        config.column_defaults(),
        config.timezone()?,
    ))
}

fn print_forecast(forecast: &RidershipForecast) {
    let prediction = &forecast.prediction;
    println!("{} on {}", forecast.station.label(), forecast.date);
    println!("  Predicted ridership: {:.0}", prediction.value);
    println!(
        "  Forest: {:.1}  Boosted: {:.1}  Weight: {:.2}",
        prediction.forest, prediction.boosted, prediction.weight
    );
    if let Some(holiday) = forecast.calendar.holiday_name {
        println!("  Holiday: {holiday}");
    }
    if !forecast.placeholders.is_empty() {
        println!("  Placeholder inputs: {}", forecast.placeholders.join(", "));
    }
    if !forecast.filled_columns.is_empty() {
        println!("  Filled columns: {}", forecast.filled_columns.join(", "));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    logging::init(&config.logging, cli.verbose)?;

    match cli.command {
        Commands::Calendar { date } => {
            let features = calendar::derive(date);
            println!("{}", serde_json::to_string_pretty(&features)?);
        }
        Commands::Stations { filter } => {
            let catalog = StationCatalog::builtin();
            for station in catalog.search(filter.as_deref().unwrap_or_default()) {
                println!("{}", station.label());
            }
        }
        Commands::Inspect => {
            let bundle = artifact::load_bundle(&config.artifact.path)?;
            println!("{}", serde_json::to_string_pretty(&bundle.composition())?);
        }
        Commands::Predict {
            station,
            date,
            sunshine_hours,
            rain_mm,
            tmax,
            tmin,
            passage_cnt,
            religious_holiday,
            json,
        } => {
            let service = forecast_service(&config)?;
            let input = RowInput {
                date,
                station,
                sunshine_hours,
                rain_mm,
                tmax_c: tmax,
                tmin_c: tmin,
                passage_cnt,
                is_religious_holiday: religious_holiday,
            };
            let forecast = service.forecast(&input).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&forecast)?);
            } else {
                print_forecast(&forecast);
            }
        }
        Commands::Migrate { out } => {
            let bundle = artifact::load_bundle(&config.artifact.path)?;
            artifact::write_canonical(&bundle, &out)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            info!(from = ?bundle.shape, out = %out.display(), "Artifact migrated");
            println!("Wrote canonical bundle to {}", out.display());
        }
        Commands::Serve { port } => {
            let mut server = config.server.clone();
            if let Some(port) = port {
                server.port = port;
            }
            let service = forecast_service(&config)?;
            // Fail at startup rather than on the first request
            if let Err(e) = service.handle().get().await {
                error!(error = %e, "Model artifact is unusable");
                return Err(e).with_context(|| {
                    format!("Cannot serve without artifact {}", config.artifact.path.display())
                });
            }
            web::run(Arc::new(AppState { service }), &server).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_help() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_predict_parses() {
        let cli = Cli::parse_from([
            "railcast",
            "predict",
            "--station",
            "Kabataş",
            "--date",
            "2024-12-03",
            "--tmax",
            "12.5",
            "--religious-holiday",
        ]);
        if let Commands::Predict {
            station,
            date,
            tmax,
            tmin,
            religious_holiday,
            ..
        } = cli.command
        {
            assert_eq!(station, "Kabataş");
            assert_eq!(date, NaiveDate::from_ymd_opt(2024, 12, 3));
            assert!((tmax - 12.5).abs() < 1e-9);
            assert!((tmin - 10.0).abs() < 1e-9);
            assert!(religious_holiday);
        } else {
            panic!("Expected Predict command");
        }
    }

    #[test]
    fn test_global_artifact_flag() {
        let cli = Cli::parse_from(["railcast", "inspect", "--artifact", "models/b.json"]);
        assert_eq!(cli.artifact, Some(PathBuf::from("models/b.json")));
        assert!(matches!(cli.command, Commands::Inspect));
    }

    #[test]
    fn test_calendar_rejects_bad_date() {
        assert!(Cli::try_parse_from(["railcast", "calendar", "2024-13-40"]).is_err());
    }
}
