//! Tick clock and scheduling cadence.
//!
//! The clock is the single source of truth for simulation time. It tracks
//! the current tick and derives from it whether this tick runs the AI pass
//! and whether it runs the liveness sweep. Nothing derived is stored: the
//! tick number is the source of truth.

use crate::config::FleetConfig;

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// Tick counter would overflow.
    #[error("tick counter overflow: cannot advance beyond u64::MAX")]
    TickOverflow,

    /// An interval was zero.
    #[error("invalid clock configuration: {name} must be at least 1")]
    InvalidInterval {
        /// Which interval was rejected.
        name: &'static str,
    },
}

/// Simulation clock with the fleet's AI and cleanup cadence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickClock {
    /// Current tick number. Starts at 0; the first tick run is tick 1.
    tick: u64,

    /// The AI pass runs on ticks divisible by this.
    ai_interval: u64,

    /// The cleanup sweep runs on ticks divisible by this.
    cleanup_interval: u64,
}

impl TickClock {
    /// Create a clock at tick 0 from the fleet configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidInterval`] if either interval is zero.
    pub fn new(config: &FleetConfig) -> Result<Self, ClockError> {
        Self::from_parts(0, config.ai_interval_ticks, config.cleanup_interval_ticks)
    }

    /// Create a clock from explicit parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidInterval`] if either interval is zero.
    pub const fn from_parts(
        tick: u64,
        ai_interval: u64,
        cleanup_interval: u64,
    ) -> Result<Self, ClockError> {
        if ai_interval == 0 {
            return Err(ClockError::InvalidInterval {
                name: "ai_interval_ticks",
            });
        }
        if cleanup_interval == 0 {
            return Err(ClockError::InvalidInterval {
                name: "cleanup_interval_ticks",
            });
        }
        Ok(Self {
            tick,
            ai_interval,
            cleanup_interval,
        })
    }

    /// Advance the clock by one tick. Returns the new tick number.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::TickOverflow`] if the counter would exceed
    /// `u64::MAX`.
    pub fn advance(&mut self) -> Result<u64, ClockError> {
        self.tick = self.tick.checked_add(1).ok_or(ClockError::TickOverflow)?;
        Ok(self.tick)
    }

    /// Current tick number.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Configured AI interval.
    pub const fn ai_interval(&self) -> u64 {
        self.ai_interval
    }

    /// Whether the current tick runs the AI pass.
    pub const fn is_ai_tick(&self) -> bool {
        matches!(self.tick.checked_rem(self.ai_interval), Some(0))
    }

    /// Index of the AI pass that runs on the current tick (or last ran).
    pub const fn ai_pass(&self) -> u64 {
        match self.tick.checked_div(self.ai_interval) {
            Some(pass) => pass,
            None => 0,
        }
    }

    /// Whether the current tick runs the liveness sweep.
    pub const fn is_cleanup_tick(&self) -> bool {
        matches!(self.tick.checked_rem(self.cleanup_interval), Some(0))
    }

    /// Ticks until the next AI pass (0 when this tick runs one).
    pub const fn ticks_until_ai(&self) -> u64 {
        match self.tick.checked_rem(self.ai_interval) {
            Some(0) | None => 0,
            Some(phase) => self.ai_interval.saturating_sub(phase),
        }
    }
}
