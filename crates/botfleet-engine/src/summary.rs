//! Tick callback that logs periodic fleet summaries.

use botfleet_core::runner::TickCallback;
use botfleet_core::{Fleet, TickSummary};
use tracing::{debug, info};

/// Logs a fleet summary every `interval` ticks, plus every cleanup that
/// removed someone.
pub struct SummaryLogger {
    interval: u64,
    logged: u64,
}

impl SummaryLogger {
    /// Create a logger. An interval of 0 turns the periodic summary off.
    pub const fn new(interval: u64) -> Self {
        Self {
            interval,
            logged: 0,
        }
    }

    /// Number of summaries written so far.
    pub const fn logged(&self) -> u64 {
        self.logged
    }

    const fn is_due(&self, tick: u64) -> bool {
        matches!(tick.checked_rem(self.interval), Some(0))
    }
}

impl TickCallback for SummaryLogger {
    fn on_tick(&mut self, summary: &TickSummary, fleet: &Fleet) {
        if !summary.removed.is_empty() {
            info!(
                tick = summary.tick,
                removed = summary.removed.len(),
                population = fleet.population(),
                "cleanup removed agents"
            );
        }
        if !self.is_due(summary.tick) {
            return;
        }
        self.logged = self.logged.saturating_add(1);
        info!(
            tick = summary.tick,
            population = fleet.population(),
            groups = fleet.group_count(),
            agents_alive = summary.agents_alive,
            failures = summary.failures.len(),
            modes = ?summary.modes,
            "fleet summary"
        );
        for group in fleet.group_views() {
            debug!(
                group = %group.name,
                size = group.size,
                leader = ?group.leader,
                "group status"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use botfleet_agents::AgentTuning;

    use super::*;

    fn summary(tick: u64) -> TickSummary {
        TickSummary {
            tick,
            ai_pass: false,
            agents_alive: 0,
            agents_evaluated: 0,
            transitions: 0,
            failures: Vec::new(),
            removed: Vec::new(),
            modes: BTreeMap::new(),
        }
    }

    #[test]
    fn logs_on_the_interval() {
        let fleet = Fleet::new(4, AgentTuning::default()).unwrap();
        let mut logger = SummaryLogger::new(10);
        for tick in 1..=35 {
            logger.on_tick(&summary(tick), &fleet);
        }
        assert_eq!(logger.logged(), 3);
    }

    #[test]
    fn zero_interval_never_logs() {
        let fleet = Fleet::new(4, AgentTuning::default()).unwrap();
        let mut logger = SummaryLogger::new(0);
        for tick in 1..=20 {
            logger.on_tick(&summary(tick), &fleet);
        }
        assert_eq!(logger.logged(), 0);
    }
}
