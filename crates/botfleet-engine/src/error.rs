//! Error types for the fleet engine binary.
//!
//! [`EngineError`] wraps every failure mode during startup and the run, so
//! `main` can propagate with `?`.

/// Top-level error for the fleet engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: botfleet_core::config::ConfigError,
    },

    /// Building the arena or placing an entity failed.
    #[error("world error: {source}")]
    World {
        /// The underlying world error.
        #[from]
        source: botfleet_world::WorldError,
    },

    /// A fleet registry operation failed.
    #[error("registry error: {source}")]
    Registry {
        /// The underlying registry error.
        #[from]
        source: botfleet_core::RegistryError,
    },

    /// Simulation state setup or a spawn failed.
    #[error("tick error: {source}")]
    Tick {
        /// The underlying tick error.
        #[from]
        source: botfleet_core::TickError,
    },

    /// Simulation runner failed.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: botfleet_core::runner::RunnerError,
    },

    /// The scenario refers to something that does not exist.
    #[error("scenario error: {message}")]
    Scenario {
        /// Description of the problem.
        message: String,
    },
}
