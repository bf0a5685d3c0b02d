use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use rand::Rng;
use tokio::sync::Semaphore;

use domain::{Coordinate, Location, PredictionRequest, PredictionResult};
use server::{CliOverrides, PredictionOrchestrator, ServiceConfig};
use weather::{ClimateSource, ForecastClient};

/// CropRecs - Crop Recommendation Engine
#[derive(Parser)]
#[command(name = "crop-recs")]
#[command(about = "Crop recommendations from soil measurements and local weather", long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Send soil values to the predictor without weather enrichment
    #[arg(long, global = true)]
    no_enrichment: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recommend crops for a soil sample
    Predict {
        /// Nitrogen
        #[arg(long)]
        n: Option<f64>,

        /// Phosphorus
        #[arg(long)]
        p: Option<f64>,

        /// Potassium
        #[arg(long)]
        k: Option<f64>,

        /// Soil pH
        #[arg(long)]
        ph: Option<f64>,

        /// Latitude of the field
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,

        /// Longitude of the field
        #[arg(long, allow_hyphen_values = true)]
        lon: Option<f64>,
    },

    /// Show the climate used for enrichment at a coordinate
    Weather {
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,

        #[arg(long, allow_hyphen_values = true)]
        lon: Option<f64>,
    },

    /// Run benchmark to test performance
    Benchmark {
        /// Number of requests to make
        #[arg(long, default_value = "20")]
        requests: usize,

        /// Number of concurrent requests
        #[arg(long, default_value = "4")]
        concurrent: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let overrides = CliOverrides {
        enrichment_enabled: cli.no_enrichment.then_some(false),
        ..CliOverrides::default()
    };
    let config = ServiceConfig::load(cli.config.as_deref(), Some(&overrides))
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Predict {
            n,
            p,
            k,
            ph,
            lat,
            lon,
        } => {
            let location = (lat.is_some() || lon.is_some()).then_some(Location {
                latitude: lat,
                longitude: lon,
            });
            let request = PredictionRequest {
                n,
                p,
                k,
                ph,
                location,
            };
            handle_predict(&config, request).await?
        }
        Commands::Weather { lat, lon } => handle_weather(&config, lat, lon).await?,
        Commands::Benchmark {
            requests,
            concurrent,
        } => handle_benchmark(&config, requests, concurrent).await?,
    }

    Ok(())
}

/// Handle the 'predict' command
async fn handle_predict(config: &ServiceConfig, request: PredictionRequest) -> Result<()> {
    let orchestrator = PredictionOrchestrator::from_config(config)?;
    let body = serde_json::to_value(&request).context("Failed to encode request")?;

    let start = Instant::now();
    let result = orchestrator.predict(body).await?;
    println!(
        "{} Prediction finished in {:.2?}",
        "✓".green(),
        start.elapsed()
    );

    print_result(&result);
    Ok(())
}

/// Handle the 'weather' command
async fn handle_weather(config: &ServiceConfig, lat: Option<f64>, lon: Option<f64>) -> Result<()> {
    let default = config.enrichment.default_coordinate;
    let coordinate = Coordinate::new(
        lat.unwrap_or(default.latitude),
        lon.unwrap_or(default.longitude),
    );
    anyhow::ensure!(
        coordinate.is_valid(),
        "Coordinate ({}, {}) is out of range",
        coordinate.latitude,
        coordinate.longitude
    );

    let client = ForecastClient::new(config.forecast_config())?;
    let climate = client.lookup(coordinate).await?;

    println!(
        "{}",
        format!(
            "Climate at ({:.4}, {:.4}):",
            coordinate.latitude, coordinate.longitude
        )
        .bold()
        .blue()
    );
    println!("{}Temperature: {:.1} °C", "• ".green(), climate.temperature);
    println!("{}Humidity: {:.1} %", "• ".green(), climate.humidity);
    println!("{}Rainfall: {:.1} mm", "• ".green(), climate.rainfall);
    Ok(())
}

/// Handle the 'benchmark' command
async fn handle_benchmark(config: &ServiceConfig, requests: usize, concurrent: usize) -> Result<()> {
    anyhow::ensure!(requests > 0, "--requests must be at least 1");
    let orchestrator = PredictionOrchestrator::from_config(config)?;

    // Random soil samples in the ranges the model was trained on
    let bodies: Vec<_> = {
        let mut rng = rand::rng();
        (0..requests)
            .map(|_| {
                serde_json::json!({
                    "N": rng.random_range(0.0_f64..140.0),
                    "P": rng.random_range(5.0_f64..145.0),
                    "K": rng.random_range(5.0_f64..205.0),
                    "ph": rng.random_range(3.5_f64..9.9),
                })
            })
            .collect()
    };

    let gate = Arc::new(Semaphore::new(concurrent.max(1)));
    let started = Instant::now();
    let mut handles = Vec::with_capacity(requests);
    for body in bodies {
        let orchestrator = orchestrator.clone();
        let gate = gate.clone();
        handles.push(tokio::spawn(async move {
            let _permit = gate.acquire_owned().await?;
            let start = Instant::now();
            let outcome = orchestrator.predict(body).await;
            Ok::<_, anyhow::Error>((start.elapsed(), outcome.err()))
        }));
    }

    let mut timings = Vec::with_capacity(requests);
    let mut failures = 0usize;
    for handle in handles {
        let (elapsed, error) = handle.await??;
        timings.push(elapsed);
        if let Some(e) = error {
            failures += 1;
            eprintln!("{} {}", "✗".red(), e);
        }
    }
    let total_time = started.elapsed();

    timings.sort();
    let avg_latency = timings.iter().sum::<Duration>() / timings.len() as u32;
    let throughput = requests as f64 / total_time.as_secs_f64();

    println!("{}", "Benchmark results:".bold().blue());
    println!("Requests: {} ({} failed)", requests, failures);
    println!("Total time: {:.2?}", total_time);
    println!("Average latency: {:.2?}", avg_latency);
    println!("P50 latency: {:.2?}", percentile(&timings, 0.50));
    println!("P95 latency: {:.2?}", percentile(&timings, 0.95));
    println!("P99 latency: {:.2?}", percentile(&timings, 0.99));
    println!("Throughput: {:.2} requests/second", throughput);

    Ok(())
}

/// Nearest-rank percentile of sorted timings
fn percentile(sorted: &[Duration], q: f64) -> Duration {
    let index = ((sorted.len() as f64 * q).ceil() as usize).clamp(1, sorted.len()) - 1;
    sorted[index]
}

/// Helper function to format and print a prediction result
fn print_result(result: &PredictionResult) {
    println!("{}", "Crop Recommendations:".bold().blue());
    for (i, prediction) in result.top_predictions.iter().enumerate() {
        let rank = prediction.rank.map(|r| r as usize).unwrap_or(i + 1);
        println!(
            "{}. {} - {:.1}%",
            rank.to_string().green(),
            prediction.crop.bold(),
            prediction.probability * 100.0
        );
        if let Some(image) = &prediction.image_path {
            println!("   Plot: {}", image);
        }
    }

    match &result.trust_score {
        Some(trust) => {
            println!(
                "{} {} (confidence {:.2})",
                "Trust:".bold(),
                trust.level.yellow(),
                trust.confidence
            );
            if let Some(suggestion) = &trust.counterfactual_suggestion {
                let alternative = suggestion.alternative_crop.as_deref().unwrap_or("none");
                println!(
                    "{} {} ({:.1}% deviation)",
                    "Closest alternative:".bold(),
                    alternative.cyan(),
                    suggestion.percent_deviation
                );
                for change in &suggestion.suggested_changes {
                    println!(
                        "   {}: {:.2} -> {:.2} ({:+.2})",
                        change.feature, change.current, change.ideal, change.change
                    );
                }
            }
        }
        None => println!("{}", "No trust score reported".dimmed()),
    }

    if let Some(report) = &result.full_report {
        println!();
        println!("{}", report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_nearest_rank() {
        let timings: Vec<Duration> = (1..=100).map(Duration::from_millis).collect();
        assert_eq!(percentile(&timings, 0.50), Duration::from_millis(50));
        assert_eq!(percentile(&timings, 0.95), Duration::from_millis(95));
        assert_eq!(percentile(&timings, 0.99), Duration::from_millis(99));

        let single = [Duration::from_millis(7)];
        assert_eq!(percentile(&single, 0.99), Duration::from_millis(7));
    }
}
