//! Alert synthesis: fusion, deduplication, suppression, and resolution
//!
//! Fuses one anomaly result and one failure forecast for the same equipment
//! into at most one alert, with explicit lifecycle events. All thresholds
//! come from [`FusionConfig`]; nothing here is a hard-coded magic number.

use super::actions::ActionTable;
use crate::config::FusionConfig;
use crate::models::{AnomalyResult, FailureForecast};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Reason-code constants shared with the action table.
pub mod reason {
    pub const IMMINENT_FAILURE: &str = "imminent_failure";
    pub const SHORT_REMAINING_LIFE: &str = "short_remaining_life";
    pub const FAILURE_RISK: &str = "failure_risk";

    /// Priority order for picking the dominant code of an alert.
    pub const PRIORITY: [&str; 3] = [IMMINENT_FAILURE, SHORT_REMAINING_LIFE, FAILURE_RISK];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Info => write!(f, "info"),
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    Active,
    Resolved,
}

/// A maintenance alert. Mutated only to raise severity or extend
/// suppression; resolution is an explicit transition, never deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: u64,
    pub equipment_id: String,
    pub equipment_class: String,
    pub created_at: i64,
    pub severity: AlertSeverity,
    pub reason_codes: BTreeSet<String>,
    pub recommended_action: String,
    /// End of the current cool-down; duplicate signals before this refresh
    /// rather than create.
    pub suppressed_until: Option<i64>,
    pub state: AlertState,
}

impl Alert {
    /// Highest-priority reason code, used for the action lookup.
    pub fn dominant_reason(&self) -> Option<&str> {
        for code in reason::PRIORITY {
            if self.reason_codes.contains(code) {
                return Some(code);
            }
        }
        self.reason_codes.iter().next().map(String::as_str)
    }
}

/// Ordered lifecycle events emitted to the external alert stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertEvent {
    Created { alert: Alert },
    SeverityRaised {
        alert_id: u64,
        equipment_id: String,
        from: AlertSeverity,
        to: AlertSeverity,
        at: i64,
    },
    Refreshed {
        alert_id: u64,
        equipment_id: String,
        suppressed_until: i64,
        at: i64,
    },
    Resolved {
        alert_id: u64,
        equipment_id: String,
        at: i64,
    },
}

/// Active alert bookkeeping.
#[derive(Debug, Clone)]
struct ActiveAlert {
    alert: Alert,
    last_signal_at: i64,
}

/// Fuses model outputs into deduplicated, severity-ranked alerts.
///
/// Holds explicit, owned state (active alerts and their suppression
/// windows); no process-wide globals.
pub struct AlertSynthesizer {
    config: FusionConfig,
    actions: ActionTable,
    active: Vec<ActiveAlert>,
    resolved: Vec<Alert>,
    next_alert_id: u64,
}

impl AlertSynthesizer {
    pub fn new(config: FusionConfig, actions: ActionTable) -> Self {
        Self {
            config,
            actions,
            active: Vec::new(),
            resolved: Vec::new(),
            next_alert_id: 1,
        }
    }

    /// Fuse one anomaly result and one failure forecast for the same
    /// equipment at the same (or nearest) timestamp. Emits zero or one
    /// creation plus any suppression-driven events. Call [`Self::tick`]
    /// separately to resolve quiet alerts.
    pub fn fuse(
        &mut self,
        equipment_class: &str,
        anomaly: Option<&AnomalyResult>,
        forecast: Option<&FailureForecast>,
        now: i64,
    ) -> Vec<AlertEvent> {
        let Some((severity, reason_codes)) = self.classify(anomaly, forecast) else {
            return Vec::new();
        };

        let equipment_id = anomaly
            .map(|a| a.equipment_id.as_str())
            .or(forecast.map(|f| f.equipment_id.as_str()))
            .unwrap_or_default()
            .to_string();

        // Dedup: an active alert for this equipment sharing any reason code
        // absorbs the signal inside its cool-down.
        if let Some(existing) = self.active.iter_mut().find(|a| {
            a.alert.equipment_id == equipment_id
                && !a.alert.reason_codes.is_disjoint(&reason_codes)
        }) {
            existing.last_signal_at = now;
            let suppressed_until = now + self.config.cooldown_secs;
            existing.alert.suppressed_until = Some(suppressed_until);

            if severity > existing.alert.severity {
                let from = existing.alert.severity;
                existing.alert.severity = severity;
                return vec![AlertEvent::SeverityRaised {
                    alert_id: existing.alert.alert_id,
                    equipment_id,
                    from,
                    to: severity,
                    at: now,
                }];
            }
            return vec![AlertEvent::Refreshed {
                alert_id: existing.alert.alert_id,
                equipment_id,
                suppressed_until,
                at: now,
            }];
        }

        let dominant = reason_codes
            .iter()
            .find(|c| reason::PRIORITY.contains(&c.as_str()))
            .or_else(|| reason_codes.iter().next())
            .cloned()
            .unwrap_or_default();
        let recommended_action = self.actions.lookup(equipment_class, &dominant).to_string();

        let alert = Alert {
            alert_id: self.next_alert_id,
            equipment_id,
            equipment_class: equipment_class.to_string(),
            created_at: now,
            severity,
            reason_codes,
            recommended_action,
            suppressed_until: Some(now + self.config.cooldown_secs),
            state: AlertState::Active,
        };
        self.next_alert_id += 1;
        self.active.push(ActiveAlert {
            alert: alert.clone(),
            last_signal_at: now,
        });

        vec![AlertEvent::Created { alert }]
    }

    /// Resolve alerts with no qualifying signal for longer than the clear
    /// window. Each alert resolves exactly once.
    pub fn tick(&mut self, now: i64) -> Vec<AlertEvent> {
        let clear_window = self.config.clear_window_secs;
        let mut events = Vec::new();
        let mut still_active = Vec::with_capacity(self.active.len());

        for mut entry in self.active.drain(..) {
            if now - entry.last_signal_at >= clear_window {
                entry.alert.state = AlertState::Resolved;
                events.push(AlertEvent::Resolved {
                    alert_id: entry.alert.alert_id,
                    equipment_id: entry.alert.equipment_id.clone(),
                    at: now,
                });
                self.resolved.push(entry.alert);
            } else {
                still_active.push(entry);
            }
        }
        self.active = still_active;
        events
    }

    /// Severity and reason codes for a fused signal pair, or `None` when no
    /// alert qualifies.
    fn classify(
        &self,
        anomaly: Option<&AnomalyResult>,
        forecast: Option<&FailureForecast>,
    ) -> Option<(AlertSeverity, BTreeSet<String>)> {
        let flagged = anomaly.map(|a| a.is_anomalous).unwrap_or(false);
        let shortest_p = forecast
            .and_then(|f| f.shortest_horizon())
            .map(|h| h.probability)
            .unwrap_or(0.0);
        let longest_p = forecast
            .and_then(|f| f.longest_horizon())
            .map(|h| h.probability)
            .unwrap_or(0.0);
        let rul = forecast.and_then(|f| f.remaining_life_secs);

        let mut codes = BTreeSet::new();
        if let Some(anomaly) = anomaly {
            if anomaly.is_anomalous {
                for channel in &anomaly.unusual_channels {
                    codes.insert(format!("{}_anomaly", channel.name()));
                }
            }
        }

        let imminent = shortest_p >= self.config.critical_probability;
        let short_life = rul.map(|r| r < self.config.critical_rul_secs).unwrap_or(false);
        if imminent || short_life {
            if imminent {
                codes.insert(reason::IMMINENT_FAILURE.to_string());
            }
            if short_life {
                codes.insert(reason::SHORT_REMAINING_LIFE.to_string());
            }
            return Some((AlertSeverity::Critical, codes));
        }

        if flagged && longest_p >= self.config.warning_probability {
            codes.insert(reason::FAILURE_RISK.to_string());
            return Some((AlertSeverity::Warning, codes));
        }

        if flagged {
            return Some((AlertSeverity::Info, codes));
        }

        None
    }

    /// Active alerts, most recent last.
    pub fn active_alerts(&self) -> Vec<&Alert> {
        self.active.iter().map(|a| &a.alert).collect()
    }

    /// Resolved alert history.
    pub fn resolved_alerts(&self) -> &[Alert] {
        &self.resolved
    }
}
