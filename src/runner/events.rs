//! Structured build events.
//!
//! The core emits one event per stage transition; formatting and destination
//! are external. Each event serializes as a single JSON object per line in
//! `--message-format=json` mode, and the schema is append-only.

use serde::Serialize;

/// A build event emitted during a run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "reason")]
pub enum StageEvent {
    /// A stage's commands started executing.
    #[serde(rename = "stage-started")]
    Started { stage: String, environment: String },

    /// A stage's completion marker was already satisfied.
    #[serde(rename = "stage-skipped")]
    Skipped { stage: String, environment: String },

    /// A stage finished successfully.
    #[serde(rename = "stage-succeeded")]
    Succeeded {
        stage: String,
        environment: String,
        duration_ms: u64,
    },

    /// A stage failed.
    #[serde(rename = "stage-failed")]
    Failed {
        stage: String,
        environment: String,
        exit_code: i32,
        best_effort: bool,
    },

    /// The run finished (success or partial failure).
    #[serde(rename = "run-finished")]
    RunFinished {
        success: bool,
        succeeded: u64,
        skipped: u64,
        failed: u64,
        pending: u64,
    },
}

/// Destination for build events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &StageEvent);
}

/// Sink forwarding events to the tracing subscriber.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &StageEvent) {
        match event {
            StageEvent::Started { stage, .. } => tracing::info!(%stage, "stage started"),
            StageEvent::Skipped { stage, .. } => tracing::info!(%stage, "stage skipped"),
            StageEvent::Succeeded {
                stage, duration_ms, ..
            } => tracing::info!(%stage, duration_ms, "stage succeeded"),
            StageEvent::Failed {
                stage,
                exit_code,
                best_effort,
                ..
            } => {
                if *best_effort {
                    tracing::warn!(%stage, exit_code, "best-effort stage failed");
                } else {
                    tracing::error!(%stage, exit_code, "stage failed");
                }
            }
            StageEvent::RunFinished {
                success,
                succeeded,
                skipped,
                failed,
                pending,
            } => {
                tracing::info!(success, succeeded, skipped, failed, pending, "run finished")
            }
        }
    }
}

/// Sink printing one JSON object per line.
#[derive(Debug, Default)]
pub struct JsonLinesSink;

impl EventSink for JsonLinesSink {
    fn emit(&self, event: &StageEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            println!("{line}");
        }
    }
}
