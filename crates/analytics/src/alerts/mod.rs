//! Alert synthesis and recommended actions
//!
//! Fuses anomaly and failure signals into classified, deduplicated alerts
//! with explicit lifecycle events for the external alert stream.

mod actions;
mod synthesizer;

pub use actions::ActionTable;
pub use synthesizer::{
    reason, Alert, AlertEvent, AlertSeverity, AlertState, AlertSynthesizer,
};
