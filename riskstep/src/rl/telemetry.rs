// src/rl/telemetry.rs
//
// Rollout telemetry: one JSONL line per environment step plus rollout
// start/end markers, enough to reconstruct every reward.
//
// Controlled by environment variables:
// - RISKSTEP_ROLLOUT_TELEMETRY_MODE: "off" (default) or "jsonl"
// - RISKSTEP_ROLLOUT_TELEMETRY_PATH: path to the JSONL file (appended)
//
// Telemetry never fails a rollout: a write error disables the sink.

use std::env;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::sim_env::StepInfo;

/// Schema version stamped on every telemetry line.
pub const TELEMETRY_SCHEMA_VERSION: u32 = 1;

/// Per-step record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub schema_version: u32,
    pub record_type: String,
    pub rollout_id: u64,
    pub seed: u64,
    pub step: u32,
    pub variable: String,
    pub index: usize,
    /// Delta proposed by the policy.
    pub delta: f64,
    pub applied_value: f64,
    pub saturated: bool,
    pub old_score: f64,
    pub new_score: f64,
    pub reward: f64,
}

impl StepRecord {
    pub fn new(rollout_id: u64, seed: u64, delta: f64, reward: f64, info: &StepInfo) -> Self {
        Self {
            schema_version: TELEMETRY_SCHEMA_VERSION,
            record_type: "step".to_string(),
            rollout_id,
            seed,
            step: info.step,
            variable: info.variable.clone(),
            index: info.index,
            delta,
            applied_value: info.applied_value,
            saturated: info.saturated,
            old_score: info.old_score,
            new_score: info.new_score,
            reward,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutMarkerType {
    Start,
    End,
}

/// Rollout boundary marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutMarker {
    pub schema_version: u32,
    pub record_type: String,
    pub marker_type: RolloutMarkerType,
    pub rollout_id: u64,
    pub seed: u64,
    pub policy_version: String,
    pub scorer_version: String,
    /// Score of the initial state (start) or final state (end).
    pub score: f64,
    /// Total steps taken (end markers only).
    pub total_steps: Option<u32>,
    /// Sum of per-step rewards (end markers only).
    pub total_reward: Option<f64>,
}

/// JSONL sink for rollout traces.
pub struct RolloutTelemetry {
    enabled: bool,
    path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
    next_rollout_id: u64,
}

impl Default for RolloutTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl RolloutTelemetry {
    /// Disabled sink.
    pub fn new() -> Self {
        Self {
            enabled: false,
            path: None,
            writer: None,
            next_rollout_id: 0,
        }
    }

    pub fn from_env() -> Self {
        let enabled = env::var("RISKSTEP_ROLLOUT_TELEMETRY_MODE")
            .map(|s| s.trim().eq_ignore_ascii_case("jsonl"))
            .unwrap_or(false);
        let path = env::var("RISKSTEP_ROLLOUT_TELEMETRY_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        Self {
            enabled: enabled && path.is_some(),
            path,
            writer: None,
            next_rollout_id: 0,
        }
    }

    /// Enabled sink appending to `path`.
    pub fn enable(path: PathBuf) -> Self {
        Self {
            enabled: true,
            path: Some(path),
            writer: None,
            next_rollout_id: 0,
        }
    }

    fn ensure_writer(&mut self) -> Option<&mut BufWriter<File>> {
        if !self.enabled {
            return None;
        }

        if self.writer.is_none() {
            let path = self.path.as_ref()?;
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => self.writer = Some(BufWriter::new(file)),
                Err(_) => {
                    self.enabled = false;
                    return None;
                }
            }
        }

        self.writer.as_mut()
    }

    fn write_record<T: Serialize>(&mut self, record: &T) {
        let Ok(line) = serde_json::to_string(record) else {
            return;
        };
        let Some(writer) = self.ensure_writer() else {
            return;
        };
        if writeln!(writer, "{}", line).is_err() {
            self.enabled = false;
            self.writer = None;
        }
    }

    /// Log a start marker and return the id of the new rollout.
    pub fn log_rollout_start(
        &mut self,
        seed: u64,
        policy_version: &str,
        scorer_version: &str,
        old_score: f64,
    ) -> u64 {
        let rollout_id = self.next_rollout_id;
        self.next_rollout_id += 1;
        let marker = RolloutMarker {
            schema_version: TELEMETRY_SCHEMA_VERSION,
            record_type: "marker".to_string(),
            marker_type: RolloutMarkerType::Start,
            rollout_id,
            seed,
            policy_version: policy_version.to_string(),
            scorer_version: scorer_version.to_string(),
            score: old_score,
            total_steps: None,
            total_reward: None,
        };
        self.write_record(&marker);
        rollout_id
    }

    pub fn log_step(&mut self, record: &StepRecord) {
        self.write_record(record);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn log_rollout_end(
        &mut self,
        rollout_id: u64,
        seed: u64,
        policy_version: &str,
        scorer_version: &str,
        new_score: f64,
        total_steps: u32,
        total_reward: f64,
    ) {
        let marker = RolloutMarker {
            schema_version: TELEMETRY_SCHEMA_VERSION,
            record_type: "marker".to_string(),
            marker_type: RolloutMarkerType::End,
            rollout_id,
            seed,
            policy_version: policy_version.to_string(),
            scorer_version: scorer_version.to_string(),
            score: new_score,
            total_steps: Some(total_steps),
            total_reward: Some(total_reward),
        };
        self.write_record(&marker);
        self.flush();
    }

    pub fn flush(&mut self) {
        if let Some(writer) = &mut self.writer {
            let _ = writer.flush();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Drop for RolloutTelemetry {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> StepInfo {
        StepInfo {
            step: 3,
            index: 28,
            variable: "glu".to_string(),
            previous_value: 204.0,
            proposed_value: 190.0,
            applied_value: 190.0,
            saturated: false,
            old_score: 61.0,
            new_score: 58.5,
            ignored: false,
        }
    }

    #[test]
    fn test_disabled_sink_writes_nothing() {
        let mut sink = RolloutTelemetry::new();
        assert!(!sink.is_enabled());
        let id = sink.log_rollout_start(1, "p", "s", 50.0);
        sink.log_step(&StepRecord::new(id, 1, -14.0, 12.5, &info()));
        assert_eq!(id, 0);
    }

    #[test]
    fn test_jsonl_lines_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("rollouts.jsonl");
        {
            let mut sink = RolloutTelemetry::enable(path.clone());
            let id = sink.log_rollout_start(7, "policy-v", "scorer-v", 61.0);
            sink.log_step(&StepRecord::new(id, 7, -14.0, 12.5, &info()));
            sink.log_rollout_end(id, 7, "policy-v", "scorer-v", 58.5, 1, 12.5);
        }
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);

        let start: RolloutMarker = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(start.marker_type, RolloutMarkerType::Start);
        assert_eq!(start.seed, 7);

        let step: StepRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(step.variable, "glu");
        assert_eq!(step.step, 3);
        assert_eq!(step.schema_version, TELEMETRY_SCHEMA_VERSION);

        let end: RolloutMarker = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(end.total_steps, Some(1));
        assert_eq!(end.score, 58.5);
    }

    #[test]
    fn test_rollout_ids_increment() {
        let mut sink = RolloutTelemetry::new();
        assert_eq!(sink.log_rollout_start(0, "p", "s", 0.0), 0);
        assert_eq!(sink.log_rollout_start(0, "p", "s", 0.0), 1);
    }
}
