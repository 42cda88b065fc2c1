/// Administrative command line for the rating curve service.
///
/// Usage:
///   rating_service validate <segments.json>
///   rating_service import <procedure> <segments.json>
///   rating_service show <procedure>
///   rating_service discharge <procedure> <timestamp> <level>
///   rating_service clear <procedure>
///
/// `<segments.json>` is a JSON array of segment records with the fields
/// `from`, `to`, `low_val`, `up_val`, `A`, `B`, `C`, `K`.

use std::error::Error;
use std::fs;
use std::process::ExitCode;

use rating_service::config::{config_path, load_config, ServiceConfig};
use rating_service::logging::{self, Component};
use rating_service::model::{parse_timestamp, SegmentRecord};
use rating_service::{validate_records, RatingService, ServiceError};

const USAGE: &str = "\
usage:
  rating_service validate <segments.json>
  rating_service import <procedure> <segments.json>
  rating_service show <procedure>
  rating_service discharge <procedure> <timestamp> <level>
  rating_service clear <procedure>";

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match setup().and_then(|config| run(&config, &args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("✗ {}", e);
            ExitCode::FAILURE
        }
    }
}

fn setup() -> Result<ServiceConfig, Box<dyn Error>> {
    let path = config_path();
    let config = load_config(&path)?;
    config.init_logging()?;
    logging::debug(
        Component::Config,
        None,
        &format!("config {} backend {:?}", path.display(), config.repository.backend),
    );
    Ok(config)
}

fn run(config: &ServiceConfig, args: &[String]) -> Result<(), Box<dyn Error>> {
    let command: Vec<&str> = args.iter().map(String::as_str).collect();
    match command.as_slice() {
        ["validate", file] => {
            let records = read_records(file)?;
            validate_records(&records)?;
            println!("✓ {} segments valid", records.len());
        }
        ["import", procedure, file] => {
            let records = read_records(file)?;
            let service = open_service(config)?;
            service.submit_records(procedure, &records)?;
            println!("✓ {}: {} segments stored", procedure, records.len());
        }
        ["show", procedure] => {
            let service = open_service(config)?;
            let curve = service.curve(procedure)?;
            println!("{}", serde_json::to_string_pretty(&curve.to_records())?);
        }
        ["discharge", procedure, timestamp, level] => {
            let at = parse_timestamp(timestamp)
                .ok_or_else(|| format!("invalid timestamp '{}'", timestamp))?;
            let level: f64 = level
                .parse()
                .map_err(|_| format!("invalid level '{}'", level))?;
            let service = open_service(config)?;
            match service.evaluate(procedure, at, level) {
                Ok(estimate) => {
                    let flag = if estimate.out_of_range { " (outside stage band)" } else { "" };
                    println!(
                        "{:.4} [{}, segment {}]{}",
                        estimate.value,
                        service.evaluator().formula_name(),
                        estimate.segment_index + 1,
                        flag
                    );
                }
                Err(ServiceError::Evaluation(e)) if e.is_no_calibration() => {
                    return Err(format!("no calibration data for this period: {}", e).into());
                }
                Err(e) => return Err(e.into()),
            }
        }
        ["clear", procedure] => {
            let service = open_service(config)?;
            service.clear(procedure)?;
            println!("✓ {} cleared", procedure);
        }
        _ => return Err(USAGE.into()),
    }

    Ok(())
}

/// Service for the commands that store or read curves.
fn open_service(config: &ServiceConfig) -> Result<RatingService, Box<dyn Error>> {
    if !config.repository.backend.is_persistent() {
        return Err(format!(
            "repository backend {:?} does not keep curves between runs; \
             set [repository] backend = \"rcv\" or \"postgres\"",
            config.repository.backend
        )
        .into());
    }
    Ok(RatingService::from_config(config)?)
}

fn read_records(path: &str) -> Result<Vec<SegmentRecord>, Box<dyn Error>> {
    let text = fs::read_to_string(path).map_err(|e| format!("cannot read {}: {}", path, e))?;
    Ok(serde_json::from_str(&text)?)
}
