//! Utility functions shared by the CLI commands.

use crate::probe::orchestrator::DiscoveryReport;
use crate::probe::stats::StatisticsSnapshot;
use log::info;

/// Logs session counters, including the share of invocations that produced
/// an event.
///
/// # Arguments
///
/// * `snapshot` - Counters captured at the end of the session
pub fn log_session_summary(snapshot: &StatisticsSnapshot) {
    info!(
        "Invocations: {}, Fragments: {}, Events: {} - {:.2}%",
        snapshot.invocations,
        snapshot.fragments,
        snapshot.events,
        emitting_ratio(snapshot)
    );

    if snapshot.failed_fields > 0 || snapshot.malformed_names > 0 {
        info!(
            "Unreadable fields: {}, Malformed symbol names: {}",
            snapshot.failed_fields, snapshot.malformed_names
        );
    }
}

/// Logs what discovery installed and skipped.
pub fn log_discovery_report(report: &DiscoveryReport) {
    match &report.primary {
        Some(module) => info!("Primary module: {} at {}", module.name, module.base),
        None => info!("Primary module: not loaded"),
    }
    info!(
        "Hooks installed: {}, skipped: {}",
        report.installed.len(),
        report.skipped.len()
    );
    for skipped in &report.skipped {
        info!("  skipped {}: {}", skipped.label, skipped.reason);
    }
}

/// Percentage of invocations that completed an event, for display.
pub fn emitting_ratio(snapshot: &StatisticsSnapshot) -> f64 {
    if snapshot.invocations == 0 {
        0.0
    } else {
        (snapshot.events as f64 / snapshot.invocations as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emitting_ratio() {
        assert_eq!(emitting_ratio(&StatisticsSnapshot::default()), 0.0);

        let snapshot = StatisticsSnapshot {
            invocations: 4,
            events: 1,
            ..Default::default()
        };
        assert!((emitting_ratio(&snapshot) - 25.0).abs() < f64::EPSILON);
    }
}
