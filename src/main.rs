//! Barcode Recorder station host
//!
//! Barcodes arrive on stdin, one per line, as a scanner wedge would type
//! them. Clips come from a synthetic media source and are stored according to
//! the settings file.

use anyhow::{Context, Result};
use barcode_recorder::capture::SyntheticMediaSource;
use barcode_recorder::detector::{DetectorDebouncer, ManualDetector, VideoTarget};
use barcode_recorder::recorder::{CaptureSession, OrchestratorEvent, RecordingOrchestrator};
use barcode_recorder::storage::{DirectoryStoreFactory, StorageWriter};
use barcode_recorder::utils::{AppError, ErrorResponse};
use barcode_recorder::Settings;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

const DEFAULT_SETTINGS_PATH: &str = "settings.json";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Barcode(String),
    Force(String),
    Pause,
    Resume,
    Stop,
    Status,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let command = match line {
            "" => return None,
            "pause" => Command::Pause,
            "resume" => Command::Resume,
            "stop" => Command::Stop,
            "status" => Command::Status,
            "quit" | "exit" => Command::Quit,
            _ => match line.strip_prefix("force ") {
                Some(barcode) => Command::Force(barcode.trim().to_string()),
                None => Command::Barcode(line.to_string()),
            },
        };
        Some(command)
    }
}

fn report(error: impl Into<AppError>) {
    let response = ErrorResponse::from(error.into());
    match response.hint {
        Some(hint) => eprintln!("error [{}]: {} ({})", response.code, response.message, hint),
        None => eprintln!("error [{}]: {}", response.code, response.message),
    }
}

fn log_event(event: OrchestratorEvent) {
    match event {
        OrchestratorEvent::RecordingStarted { barcode } => {
            println!("recording {}", barcode);
        }
        OrchestratorEvent::RecordingStopped {
            recording_id,
            barcode,
            duration_ms,
            size,
        } => {
            println!(
                "stopped {} ({}): {} ms, {} bytes",
                barcode, recording_id, duration_ms, size
            );
        }
        OrchestratorEvent::StorageFinished(report) => {
            if report.success {
                println!(
                    "stored {}: local={:?} remote={:?}",
                    report.barcode, report.local_path, report.remote_path
                );
            } else {
                eprintln!("storing {} failed: {}", report.barcode, report.errors.join("; "));
            }
        }
        OrchestratorEvent::DetectionUnavailable(reason) => {
            eprintln!("detection unavailable: {}", reason);
        }
        OrchestratorEvent::Error(message) => {
            eprintln!("error: {}", message);
        }
    }
}

async fn forward_events(mut events: broadcast::Receiver<OrchestratorEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => log_event(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Dropped {} orchestrator events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Returns `false` when the host should exit
async fn execute(
    command: Command,
    orchestrator: &RecordingOrchestrator,
    detector: &ManualDetector,
) -> Result<bool> {
    match command {
        Command::Barcode(code) => detector.emit_code(&code),
        Command::Force(code) => {
            if let Err(e) = orchestrator.force_start_recording(&code).await {
                report(e);
            }
        }
        Command::Pause => {
            if let Err(e) = orchestrator.pause_recording().await {
                report(e);
            }
        }
        Command::Resume => {
            if let Err(e) = orchestrator.resume_recording().await {
                report(e);
            }
        }
        Command::Stop => {
            if let Err(e) = orchestrator.stop_recording().await {
                report(e);
            }
        }
        Command::Status => {
            let status = serde_json::json!({
                "state": orchestrator.get_recording_state(),
                "durationMs": orchestrator.recording_duration_ms(),
                "storage": orchestrator.writer().get_storage_status(),
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    barcode_recorder::init_tracing();
    tracing::info!("Starting Barcode Recorder v{}", env!("CARGO_PKG_VERSION"));

    let settings_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH));
    let settings = match Settings::load(&settings_path).and_then(|s| s.validate().map(|_| s)) {
        Ok(settings) => settings,
        Err(e) => {
            report(e);
            anyhow::bail!("cannot start with settings from {}", settings_path.display());
        }
    };

    let object_store_root = settings.storage.object_store_directory.clone();
    if settings.storage.remote_enabled {
        let bucket = object_store_root.join(&settings.storage.remote.bucket);
        std::fs::create_dir_all(&bucket)
            .with_context(|| format!("failed to create bucket directory {}", bucket.display()))?;
    }

    let writer = Arc::new(
        StorageWriter::new(Arc::new(DirectoryStoreFactory::new(object_store_root)))
            .with_retry_policy(settings.storage.retry.clone()),
    );
    writer.on_status_update(|status| tracing::debug!("Storage status: {:?}", status));

    let detector = Arc::new(ManualDetector::new());
    let orchestrator = RecordingOrchestrator::new(
        DetectorDebouncer::new(detector.clone(), settings.detection.clone()),
        CaptureSession::new(settings.identity(), settings.capture.clone()),
        writer,
        settings.storage_targets(),
    );
    tokio::spawn(forward_events(orchestrator.subscribe()));

    orchestrator
        .start(&VideoTarget::new("stdin"), Arc::new(SyntheticMediaSource::default()))
        .await?;
    println!("ready: type a barcode, or pause | resume | stop | force <barcode> | status | quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        let Some(command) = Command::parse(&line) else {
            continue;
        };
        if !execute(command, &orchestrator, &detector).await? {
            break;
        }
    }

    orchestrator.stop().await;
    tracing::info!("Barcode Recorder stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("  "), None);
        assert_eq!(Command::parse("pause"), Some(Command::Pause));
        assert_eq!(Command::parse("quit"), Some(Command::Quit));
        assert_eq!(
            Command::parse("force PKG-1 "),
            Some(Command::Force("PKG-1".to_string()))
        );
        assert_eq!(
            Command::parse("PKG-2\n"),
            Some(Command::Barcode("PKG-2".to_string()))
        );
    }
}
