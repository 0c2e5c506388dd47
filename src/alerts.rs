//! Alert Engine - threshold evaluation with an active set and a bounded history
//!
//! ## Alert Lifecycle
//!
//! ```text
//! value breaches threshold, key not active   → new alert (returned)
//! value breaches threshold, key active       → refresh value/timestamp (None)
//! value within bounds                        → resolve matching alerts into history (None)
//! no threshold for topic                     → nothing (None)
//! ```
//!
//! An alert key is `{project}_{equipment}_{sensor}_{min|max}`, so at most one
//! alert per key is active at any time. History keeps the newest
//! `max_history_size` resolved alerts.
//!
//! All state lives behind one lock; every operation is atomic with respect to
//! the others.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// Default number of resolved alerts kept in history
pub const DEFAULT_MAX_HISTORY: usize = 1000;

/// Deviations larger than this fraction of the threshold are critical
const CRITICAL_DEVIATION_RATIO: f64 = 0.2;

/// A bound on one sensor's values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertThreshold {
    pub id: String,
    pub topic_name: String,
    pub sensor_type: String,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub enabled: bool,
}

impl AlertThreshold {
    /// The violated bound, if any; `min` is checked first
    pub fn breach(&self, value: f64) -> Option<(ThresholdKind, f64)> {
        if let Some(min) = self.min_value.filter(|min| value < *min) {
            return Some((ThresholdKind::Min, min));
        }
        if let Some(max) = self.max_value.filter(|max| value > *max) {
            return Some((ThresholdKind::Max, max));
        }
        None
    }

    fn matches_suffix(&self, topic: &str) -> bool {
        topic
            .strip_suffix(self.sensor_type.as_str())
            .is_some_and(|rest| rest.ends_with('/'))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdKind {
    Min,
    Max,
}

impl fmt::Display for ThresholdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdKind::Min => write!(f, "min"),
            ThresholdKind::Max => write!(f, "max"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    /// Critical when the value is off by more than 20% of the threshold's magnitude
    pub fn classify(value: f64, threshold: f64) -> Self {
        if (value - threshold).abs() > CRITICAL_DEVIATION_RATIO * threshold.abs() {
            Severity::Critical
        } else {
            Severity::Warning
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub project_id: String,
    pub equipment_id: String,
    pub sensor_type: String,
    pub topic: String,
    pub current_value: f64,
    pub threshold_value: f64,
    pub threshold_type: ThresholdKind,
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// Sort key for history: when the alert stopped being active
    fn settled_at(&self) -> DateTime<Utc> {
        self.resolved_at.unwrap_or(self.timestamp)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeverityBreakdown {
    pub warning: usize,
    pub critical: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertStats {
    pub active_count: usize,
    pub historical_count: usize,
    pub severity_breakdown: SeverityBreakdown,
    pub most_recent_active: Option<Alert>,
}

#[derive(Debug)]
struct AlertState {
    thresholds: HashMap<String, Vec<AlertThreshold>>,
    active: HashMap<String, Alert>,
    history: VecDeque<Alert>,
    max_history_size: usize,
}

impl AlertState {
    fn threshold_for(&self, project_id: &str, topic: &str) -> Option<AlertThreshold> {
        let thresholds = self.thresholds.get(project_id)?;
        let mut enabled = thresholds.iter().filter(|t| t.enabled);

        enabled
            .clone()
            .find(|t| t.topic_name == topic)
            .or_else(|| enabled.find(|t| t.matches_suffix(topic)))
            .cloned()
    }

    fn resolve(&mut self, project_id: &str, equipment_id: &str, sensor_type: &str, topic: &str) {
        let keys: Vec<String> = self
            .active
            .iter()
            .filter(|(_, a)| {
                a.project_id == project_id
                    && a.equipment_id == equipment_id
                    && a.sensor_type == sensor_type
                    && a.topic == topic
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in keys {
            if let Some(mut alert) = self.active.remove(&key) {
                alert.resolved = true;
                alert.resolved_at = Some(Utc::now());
                info!("alert resolved: {}", alert.message);
                self.push_history(alert);
            }
        }
    }

    fn push_history(&mut self, alert: Alert) {
        self.history.push_back(alert);
        while self.history.len() > self.max_history_size {
            self.history.pop_front();
        }
    }
}

/// Threshold evaluation engine shared between the ingest pipeline and the API
#[derive(Debug)]
pub struct AlertEngine {
    state: Mutex<AlertState>,
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl AlertEngine {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            state: Mutex::new(AlertState {
                thresholds: HashMap::new(),
                active: HashMap::new(),
                history: VecDeque::new(),
                max_history_size,
            }),
        }
    }

    /// Replace the thresholds of a project
    pub fn set_project_thresholds(&self, project_id: &str, thresholds: Vec<AlertThreshold>) {
        info!(
            "loaded {} alert thresholds for project {project_id}",
            thresholds.len()
        );
        self.state
            .lock()
            .thresholds
            .insert(project_id.to_string(), thresholds);
    }

    pub fn thresholds(&self, project_id: &str) -> Vec<AlertThreshold> {
        self.state
            .lock()
            .thresholds
            .get(project_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Evaluate a numeric reading; returns an alert only when a new one is raised
    #[instrument(skip(self), level = "trace")]
    pub fn evaluate(
        &self,
        equipment_id: &str,
        sensor_type: &str,
        value: f64,
        topic: &str,
        timestamp: DateTime<Utc>,
        project_id: &str,
    ) -> Option<Alert> {
        let mut state = self.state.lock();
        let threshold = state.threshold_for(project_id, topic)?;

        let Some((kind, limit)) = threshold.breach(value) else {
            state.resolve(project_id, equipment_id, sensor_type, topic);
            return None;
        };

        let id = format!("{project_id}_{equipment_id}_{sensor_type}_{kind}");
        if let Some(existing) = state.active.get_mut(&id) {
            existing.current_value = value;
            existing.timestamp = timestamp;
            debug!("alert {id} still active ({value})");
            return None;
        }

        let direction = match kind {
            ThresholdKind::Min => "below",
            ThresholdKind::Max => "above",
        };
        let alert = Alert {
            message: format!(
                "{} is {direction} threshold: {value:.2} (threshold: {limit:.2})",
                title_case(&sensor_type.replace('_', " "))
            ),
            id: id.clone(),
            project_id: project_id.to_string(),
            equipment_id: equipment_id.to_string(),
            sensor_type: sensor_type.to_string(),
            topic: topic.to_string(),
            current_value: value,
            threshold_value: limit,
            threshold_type: kind,
            severity: Severity::classify(value, limit),
            timestamp,
            resolved: false,
            resolved_at: None,
        };

        warn!("new alert triggered: {}", alert.message);
        state.active.insert(id, alert.clone());
        Some(alert)
    }

    /// Active alerts, newest first
    pub fn active_alerts(&self, equipment_id: Option<&str>) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self
            .state
            .lock()
            .active
            .values()
            .filter(|a| equipment_id.is_none_or(|id| a.equipment_id == id))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        alerts
    }

    /// The latest `limit` resolved alerts, newest first; `0` means all
    pub fn history(&self, limit: usize, equipment_id: Option<&str>) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self
            .state
            .lock()
            .history
            .iter()
            .filter(|a| equipment_id.is_none_or(|id| a.equipment_id == id))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.settled_at().cmp(&a.settled_at()));
        if limit > 0 {
            alerts.truncate(limit);
        }
        alerts
    }

    /// Drop resolved alerts that settled more than `older_than` ago
    ///
    /// A window reaching past the representable calendar clears nothing; one
    /// reaching past it into the future clears everything.
    pub fn clear_resolved_older_than(&self, older_than: chrono::TimeDelta) -> usize {
        let cutoff = Utc::now().checked_sub_signed(older_than);
        if cutoff.is_none() && older_than > chrono::TimeDelta::zero() {
            return 0;
        }

        let mut state = self.state.lock();
        let before = state.history.len();
        match cutoff {
            Some(cutoff) => state.history.retain(|a| a.settled_at() >= cutoff),
            None => state.history.clear(),
        }
        let removed = before - state.history.len();

        if removed > 0 {
            info!("cleared {removed} resolved alerts");
        }
        removed
    }

    pub fn stats(&self) -> AlertStats {
        let state = self.state.lock();
        let mut breakdown = SeverityBreakdown::default();
        for alert in state.active.values() {
            match alert.severity {
                Severity::Warning => breakdown.warning += 1,
                Severity::Critical => breakdown.critical += 1,
            }
        }

        AlertStats {
            active_count: state.active.len(),
            historical_count: state.history.len(),
            severity_breakdown: breakdown,
            most_recent_active: state.active.values().max_by_key(|a| a.timestamp).cloned(),
        }
    }
}

/// Upper-cases the first letter of every word
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_is_letter = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if previous_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
        } else {
            out.push(c);
        }
        previous_is_letter = c.is_alphabetic();
    }
    out
}
