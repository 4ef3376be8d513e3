//! Configuration loading and typed config structures for botfleet.
//!
//! The canonical configuration lives in `botfleet-config.yaml` in the
//! working directory; the `BOTFLEET_CONFIG` environment variable points the
//! engine at another file. Every field has a default, so an empty file (or
//! no file at all) yields a runnable configuration.
//!
//! Agent tunables (`behavior`, `positioning`, `construction`) deserialize
//! straight into the structs owned by `botfleet-agents`.

use std::path::Path;

use serde::Deserialize;

use botfleet_agents::{AgentTuning, BehaviorConfig, ConstructionConfig, PositioningConfig};
use botfleet_types::{Relationship, Vec3};

/// Default config file name, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "botfleet-config.yaml";

/// Environment variable overriding the config path.
pub const CONFIG_PATH_ENV: &str = "BOTFLEET_CONFIG";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
///
/// Mirrors the structure of `botfleet-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// World-level settings.
    #[serde(default)]
    pub world: WorldConfig,

    /// Fleet size and scheduling cadence.
    #[serde(default)]
    pub fleet: FleetConfig,

    /// Behavior scheduler tunables.
    #[serde(default)]
    pub behavior: BehaviorConfig,

    /// Follow positioning tunables.
    #[serde(default)]
    pub positioning: PositioningConfig,

    /// Construction planner tunables.
    #[serde(default)]
    pub construction: ConstructionConfig,

    /// Run boundaries.
    #[serde(default)]
    pub simulation: SimulationBoundsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Initial groups, players and relationships for the engine binary.
    #[serde(default)]
    pub scenario: ScenarioConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `BOTFLEET_CONFIG`, else `botfleet-config.yaml`, else
    /// defaults when neither file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if a file exists but cannot be read or parsed. An
    /// explicitly named file that is missing is an error too.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(explicit) = std::env::var(CONFIG_PATH_ENV) {
            return Self::from_file(Path::new(&explicit));
        }
        let path = Path::new(DEFAULT_CONFIG_FILE);
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Agent tunables gathered into one value.
    pub fn tuning(&self) -> AgentTuning {
        AgentTuning {
            behavior: self.behavior.clone(),
            positioning: self.positioning.clone(),
            construction: self.construction.clone(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.fleet.max_agents == 0 {
            return Err(invalid("fleet.max_agents", "must be at least 1"));
        }
        if self.fleet.ai_interval_ticks == 0 {
            return Err(invalid("fleet.ai_interval_ticks", "must be at least 1"));
        }
        if self.fleet.cleanup_interval_ticks == 0 {
            return Err(invalid("fleet.cleanup_interval_ticks", "must be at least 1"));
        }
        self.tuning()
            .validate()
            .map_err(|err| ConfigError::Invalid {
                field: "agent tuning".to_owned(),
                reason: err.to_string(),
            })
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
}

/// World-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorldConfig {
    /// Human-readable run name.
    #[serde(default = "default_world_name")]
    pub name: String,

    /// Seed for the scenario spawner's scatter.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Real-time milliseconds per tick.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            name: default_world_name(),
            seed: default_seed(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

/// Fleet size and scheduling cadence.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FleetConfig {
    /// Population cap.
    #[serde(default = "default_max_agents")]
    pub max_agents: usize,

    /// The AI pass runs every this many ticks.
    #[serde(default = "default_ai_interval_ticks")]
    pub ai_interval_ticks: u64,

    /// The liveness sweep runs every this many ticks.
    #[serde(default = "default_cleanup_interval_ticks")]
    pub cleanup_interval_ticks: u64,

    /// Worker threads for the AI pass (0 = one per core).
    #[serde(default)]
    pub worker_threads: usize,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            max_agents: default_max_agents(),
            ai_interval_ticks: default_ai_interval_ticks(),
            cleanup_interval_ticks: default_cleanup_interval_ticks(),
            worker_threads: 0,
        }
    }
}

/// Simulation boundary configuration.
///
/// A value of 0 for either bound means unlimited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SimulationBoundsConfig {
    /// Maximum number of ticks before the run ends (0 = unlimited).
    #[serde(default)]
    pub max_ticks: u64,

    /// Maximum wall-clock seconds before the run ends (0 = unlimited).
    #[serde(default)]
    pub max_real_time_seconds: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log a tick summary at `info` every this many ticks (0 = never).
    #[serde(default = "default_summary_interval_ticks")]
    pub summary_interval_ticks: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            summary_interval_ticks: default_summary_interval_ticks(),
        }
    }
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

/// What the engine binary spawns before the first tick.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ScenarioConfig {
    /// Groups of agents.
    #[serde(default)]
    pub groups: Vec<GroupSpec>,

    /// External players placed in the world.
    #[serde(default)]
    pub players: Vec<PlayerSpec>,

    /// Initial relationships.
    #[serde(default)]
    pub relationships: Vec<RelationshipSpec>,
}

/// One group to spawn.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GroupSpec {
    /// Group name.
    pub name: String,

    /// Number of agents.
    #[serde(default = "default_group_size")]
    pub size: u32,

    /// Where the group spawns; members scatter around it.
    #[serde(default)]
    pub spawn: Vec3,

    /// Who the group follows: a player name, or `first` for the group's
    /// first agent. Unset means nobody.
    #[serde(default)]
    pub leader: Option<String>,

    /// Group follow radius. Falls back to the behavior default.
    #[serde(default)]
    pub follow_radius: Option<f64>,

    /// Spawn the members static.
    #[serde(default, rename = "static")]
    pub is_static: bool,

    /// Guard this position.
    #[serde(default)]
    pub home: Option<Vec3>,

    /// Patrol these waypoints.
    #[serde(default)]
    pub patrol: Vec<Vec3>,

    /// Whether members may build.
    #[serde(default = "default_true")]
    pub can_build: bool,
}

/// An external player.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlayerSpec {
    /// Name used to refer to the player elsewhere in the scenario.
    pub name: String,

    /// Starting position.
    #[serde(default)]
    pub position: Vec3,

    /// Maximum health.
    #[serde(default = "default_player_health")]
    pub max_health: f64,
}

/// An initial relationship. `from` is a group or player name; `to` is a
/// group name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RelationshipSpec {
    /// Subject: group or player name.
    pub from: String,
    /// Group the relationship applies to.
    pub to: String,
    /// The relationship.
    pub relationship: Relationship,
}

// ---------------------------------------------------------------------------
// Default value functions for serde
// ---------------------------------------------------------------------------

fn default_world_name() -> String {
    String::from("botfleet")
}

const fn default_seed() -> u64 {
    42
}

const fn default_tick_interval_ms() -> u64 {
    50
}

const fn default_max_agents() -> usize {
    500
}

const fn default_ai_interval_ticks() -> u64 {
    4
}

const fn default_cleanup_interval_ticks() -> u64 {
    100
}

fn default_log_level() -> String {
    String::from("info")
}

const fn default_summary_interval_ticks() -> u64 {
    100
}

const fn default_group_size() -> u32 {
    5
}

const fn default_player_health() -> f64 {
    20.0
}

const fn default_true() -> bool {
    true
}
