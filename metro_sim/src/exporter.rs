//! JSON exporter for the lifecycle event stream.
//!
//! Writes every recorded [`MetroEvent`] plus per-kind counts, in the shape
//! an offline analytics consumer can load directly.

use metro_core::MetroEvent;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;

/// Complete event export for one run.
#[derive(Debug, Clone, Serialize)]
pub struct EventExport {
    /// Scenario name, or `live`
    pub scenario: String,

    /// Seed used (0 for live runs)
    pub seed: u64,

    /// Simulated (or wall-clock) duration in seconds
    pub duration_sec: f64,

    /// Number of events per `type` tag
    pub counts: BTreeMap<String, u64>,

    /// Events lost to a full queue before they could be recorded
    pub dropped: u64,

    /// All events, in emission order
    pub events: Vec<MetroEvent>,

    /// Final verdict, for scenario runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
}

impl EventExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            counts: BTreeMap::new(),
            dropped: 0,
            events: Vec::new(),
            passed: None,
        }
    }

    /// Adds one event.
    pub fn record(&mut self, event: MetroEvent) {
        *self.counts.entry(event.kind().to_string()).or_default() += 1;
        self.events.push(event);
    }

    pub fn record_all<I: IntoIterator<Item = MetroEvent>>(&mut self, events: I) {
        for event in events {
            self.record(event);
        }
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, duration_sec: f64, dropped: u64, passed: Option<bool>) {
        self.duration_sec = duration_sec;
        self.dropped = dropped;
        self.passed = passed;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
