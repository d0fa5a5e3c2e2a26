//! Anomaly engine CLI: train a model bundle from labeled events, score event
//! streams (falling back to rules when no bundle is available), or summarize
//! time windows. Input and output are NDJSON.

use anomaly_engine::{
    config::EngineConfig,
    detector::{DetectionService, LabeledEvent, ModelBundle, Trainer},
    events::Event,
    features::TimeWindowProcessor,
    logging::{ResultLine, StructuredLogger},
};
use serde::de::DeserializeOwned;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use tracing::{info, warn};

type CliResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

const USAGE: &str = "usage: anomaly-engine <train <labeled.ndjson> [bundle-out] | score <events.ndjson|-> | windows <events.ndjson|->>";

fn open_input(arg: &str) -> CliResult<Box<dyn BufRead>> {
    if arg == "-" {
        Ok(Box::new(BufReader::new(std::io::stdin())))
    } else {
        Ok(Box::new(BufReader::new(std::fs::File::open(arg)?)))
    }
}

/// Parse one JSON value per non-empty line; malformed lines are logged and skipped.
fn read_ndjson<T: DeserializeOwned>(reader: Box<dyn BufRead>) -> CliResult<Vec<T>> {
    let mut out = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(v) => out.push(v),
            Err(e) => warn!(line = lineno + 1, error = %e, "skipping malformed line"),
        }
    }
    Ok(out)
}

fn train(config: &EngineConfig, input: &str, out: Option<&str>) -> CliResult {
    let events: Vec<LabeledEvent> = read_ndjson(open_input(input)?)?;
    let outcome = Trainer::new(config.clone()).train(&events)?;

    let path = out.map(PathBuf::from).unwrap_or_else(|| config.model_path.clone());
    ModelBundle::new(outcome.detector, config.features.sequence_length)?.save(&path)?;

    let mut stdout = std::io::stdout().lock();
    StructuredLogger::emit_json(&outcome.report, &mut stdout)?;
    info!(
        path = %path.display(),
        windows = outcome.total_windows,
        normal_windows = outcome.normal_windows,
        "training finished"
    );
    Ok(())
}

fn score(config: &EngineConfig, input: &str) -> CliResult {
    let mut service = DetectionService::load(config)?;
    info!(model_backed = service.is_model_backed(), "scoring events");

    let reader = open_input(input)?;
    let mut stdout = std::io::stdout().lock();
    let (mut total, mut anomalies) = (0usize, 0usize);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: Event = match serde_json::from_str(&line) {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "skipping malformed event");
                continue;
            }
        };
        let scored = service.process_event(event);
        total += 1;
        anomalies += usize::from(scored.result().is_anomaly);
        StructuredLogger::emit_json(&ResultLine::new(&scored), &mut stdout)?;
    }
    stdout.flush()?;
    info!(total, anomalies, "scoring finished");
    Ok(())
}

fn windows(config: &EngineConfig, input: &str) -> CliResult {
    let events: Vec<Event> = read_ndjson(open_input(input)?)?;
    let processor = TimeWindowProcessor::new(&config.windowing);
    let mut stdout = std::io::stdout().lock();
    for window in processor.create_time_windows(&events) {
        StructuredLogger::emit_json(&processor.aggregate_window_stats(&window), &mut stdout)?;
    }
    Ok(())
}

fn main() -> CliResult {
    let config_path = std::env::var("ANOMALY_ENGINE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("engine.json"));
    let loaded = EngineConfig::read(&config_path);
    let config = loaded.as_ref().ok().cloned().flatten().unwrap_or_default();

    StructuredLogger::init(config.log.json, &config.log.level);
    if let Err(e) = &loaded {
        warn!(path = %config_path.display(), error = %e, "invalid config; using defaults");
    }
    info!(config = %config_path.display(), model_path = %config.model_path.display(), "anomaly engine starting");

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["train", input] => train(&config, input, None),
        ["train", input, out] => train(&config, input, Some(out)),
        ["score"] => score(&config, "-"),
        ["score", input] => score(&config, input),
        ["windows", input] => windows(&config, input),
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }
}
