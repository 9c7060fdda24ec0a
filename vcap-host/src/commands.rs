//! Subcommand implementations.

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{info, warn};
use vcap_core::{distancing_violations, DetectionNode, Frame, Violation};
use vcap_runtime::{register_reference_capsules, CapsuleRegistry, OptionOverrides, Pipeline};
use vcap_zones::{Alert, FrameSnapshot, StopPolicy, Zone, ZoneEvaluator, ZoneMonitor};

use crate::config::HostConfig;
use crate::logging::prefix::{PULSE, PULSE_OPEN};
use crate::predictor::ScriptedPredictor;
use crate::shutdown::shutdown_signal;

type CommandResult = Result<(), Box<dyn Error>>;

async fn load_registry(config: &HostConfig) -> Result<CapsuleRegistry, Box<dyn Error>> {
    info!("{} Loading capsules on {}", PULSE_OPEN, config.device);
    let predictor = Arc::new(ScriptedPredictor::new(
        config.device.clone(),
        config.predictions.clone(),
    ));
    let registry = CapsuleRegistry::new();
    register_reference_capsules(&registry, predictor, &config.scheduler).await?;
    Ok(registry)
}

fn print_json<T: Serialize>(value: &T) -> CommandResult {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn read_snapshots(path: &Path) -> Result<Vec<FrameSnapshot>, Box<dyn Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    let snapshots = serde_json::from_str(&text)
        .map_err(|e| format!("failed to parse {}: {}", path.display(), e))?;
    Ok(snapshots)
}

fn evaluator(config: &HostConfig) -> Result<ZoneEvaluator, Box<dyn Error>> {
    Ok(ZoneEvaluator::new(config.zones.clone())?.with_utc_offset(config.utc_offset_seconds))
}

pub async fn capsules(config: &HostConfig) -> CommandResult {
    let registry = load_registry(config).await?;
    let result = serde_json::to_string_pretty(&registry.capsules());
    registry.close().await;
    println!("{}", result?);
    Ok(())
}

pub async fn run(
    config: &HostConfig,
    capsules: &str,
    options: Option<&str>,
    width: u32,
    height: u32,
) -> CommandResult {
    let names: Vec<&str> = capsules
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    let overrides: OptionOverrides = match options {
        Some(json) => serde_json::from_str(json).map_err(|e| format!("invalid --options: {}", e))?,
        None => OptionOverrides::new(),
    };

    let registry = load_registry(config).await?;
    let outcome = async {
        let pipeline = Pipeline::build(&registry, &names, &overrides)?;
        pipeline.run(&Frame::blank(width, height)).await
    }
    .await;
    registry.close().await;

    let set = outcome?;
    info!("{} Produced {} detections", PULSE, set.len());
    println!("{}", serde_json::to_string_pretty(&set)?);
    Ok(())
}

/// Feed snapshots in order. Rejected snapshots are logged and skipped.
pub fn replay_snapshots(
    evaluator: &mut ZoneEvaluator,
    snapshots: &[FrameSnapshot],
    policy: StopPolicy,
) -> Vec<Alert> {
    let mut events = Vec::new();
    for snapshot in snapshots {
        match evaluator.ingest(snapshot) {
            Ok(frame) => events.extend(frame.events),
            Err(e) => warn!("Skipping snapshot: {}", e),
        }
    }
    if policy == StopPolicy::FlushOpen {
        if let Some(last) = evaluator.last_timestamp() {
            match evaluator.flush(last) {
                Ok(closed) => events.extend(closed),
                Err(e) => warn!("Failed to flush open alerts: {}", e),
            }
        }
    }
    events
}

/// Completed alerts that lasted at least `min_duration` seconds.
pub fn long_alerts(events: &[Alert], min_duration: f64) -> Vec<&Alert> {
    events
        .iter()
        .filter(|a| a.duration().map(|d| d >= min_duration).unwrap_or(false))
        .collect()
}

pub fn replay(config: &HostConfig, snapshots: &Path, min_duration: f64) -> CommandResult {
    let snapshots = read_snapshots(snapshots)?;
    let mut evaluator = evaluator(config)?;

    let events = replay_snapshots(&mut evaluator, &snapshots, config.stop_policy);
    for event in &events {
        print_json(event)?;
    }
    for alert in long_alerts(&events, min_duration) {
        info!(
            "Alert {} in {}/{} lasted {:.1}s",
            alert.alert_id,
            alert.zone,
            alert.alarm,
            alert.duration().unwrap_or_default()
        );
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct DistancingReport {
    pub timestamp: f64,
    pub zone: String,
    pub detections: Vec<DetectionNode>,
    /// Indices refer to `detections`
    pub violations: Vec<Violation>,
}

/// One report per snapshot with at least one pair in `zone` closer than
/// `min_distance`.
pub fn distancing_reports(
    zone: &Zone,
    snapshots: &[FrameSnapshot],
    min_distance: f64,
) -> Vec<DistancingReport> {
    snapshots
        .iter()
        .filter_map(|snapshot| {
            let detections: Vec<DetectionNode> =
                zone.within(&snapshot.detections).into_iter().cloned().collect();
            let violations = distancing_violations(&detections, min_distance);
            if violations.is_empty() {
                return None;
            }
            Some(DistancingReport {
                timestamp: snapshot.timestamp,
                zone: zone.name.clone(),
                detections,
                violations,
            })
        })
        .collect()
}

pub fn distancing(
    config: &HostConfig,
    snapshots: &Path,
    zone: &str,
    min_distance: f64,
) -> CommandResult {
    let zone = config
        .zone(zone)
        .ok_or_else(|| format!("zone '{}' is not configured", zone))?;
    let snapshots = read_snapshots(snapshots)?;

    let reports = distancing_reports(zone, &snapshots, min_distance);
    info!(
        "{} of {} snapshots have detections closer than {}",
        reports.len(),
        snapshots.len(),
        min_distance
    );
    for report in &reports {
        print_json(report)?;
    }
    Ok(())
}

/// Evaluate newline-delimited snapshots from stdin until end of input or a
/// shutdown signal.
pub async fn monitor(config: &HostConfig) -> CommandResult {
    let (tx, rx) = mpsc::channel(64);
    let (monitor, mut alerts) = ZoneMonitor::spawn(evaluator(config)?, rx, config.stop_policy);

    let printer = tokio::spawn(async move {
        while let Some(alert) = alerts.next().await {
            if let Err(e) = print_json(&alert) {
                warn!("Failed to print alert: {}", e);
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let interrupted = loop {
        tokio::select! {
            _ = &mut shutdown => break true,
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break false,
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        break false;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<FrameSnapshot>(&line) {
                    Ok(snapshot) => {
                        if tx.send(snapshot).await.is_err() {
                            break false;
                        }
                    }
                    Err(e) => warn!("Ignoring malformed snapshot: {}", e),
                }
            }
        }
    };

    let evaluator = if interrupted {
        monitor.stop().await?
    } else {
        drop(tx);
        monitor.join().await?
    };
    if let Err(e) = printer.await {
        warn!("Alert printer ended abnormally: {}", e);
    }

    let open = evaluator.open_alerts();
    if !open.is_empty() {
        info!("{} alerts left open", open.len());
    }
    Ok(())
}
