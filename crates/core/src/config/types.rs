use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("lottery.db")
}

/// Which strategy assigns units to families.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    /// Sorted index-for-index pairing. For tests.
    Deterministic,
    /// Shuffled index-for-index pairing. For tests.
    Random,
    /// Greedy first-available-preference assignment.
    Greedy,
    /// Two-phase max-min fairness optimization through GLPK.
    #[default]
    Glpk,
}

/// Solver configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SolverConfig {
    #[serde(default)]
    pub kind: SolverKind,
    #[serde(default)]
    pub glpk: GlpkConfig,
    #[serde(default)]
    pub degeneracy: DegeneracyConfig,
}

/// External optimizer configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlpkConfig {
    /// Path or name of the `glpsol` binary
    #[serde(default = "default_glpk_binary")]
    pub binary: PathBuf,
    /// Directory for model/data/solution artifacts (system temp dir when unset)
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    /// Optimization budget per group, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Budget for the phase-1 (min satisfaction) model, in milliseconds
    #[serde(default = "default_phase1_timeout_ms")]
    pub phase1_timeout_ms: u64,
    /// Groups with at least this many families skip straight to the hybrid search
    #[serde(default = "default_phase1_max_size")]
    pub phase1_max_size: usize,
    /// Wall-clock kill deadline as a multiple of the optimizer's own time limit
    #[serde(default = "default_failsafe_factor")]
    pub failsafe_factor: f64,
    /// Add a per-family random fractional offset to ranks
    #[serde(default = "default_true")]
    pub tie_break: bool,
    /// Pass `--scale` to the optimizer
    #[serde(default)]
    pub scale: bool,
}

impl Default for GlpkConfig {
    fn default() -> Self {
        Self {
            binary: default_glpk_binary(),
            temp_dir: None,
            timeout_ms: default_timeout_ms(),
            phase1_timeout_ms: default_phase1_timeout_ms(),
            phase1_max_size: default_phase1_max_size(),
            failsafe_factor: default_failsafe_factor(),
            tie_break: true,
            scale: false,
        }
    }
}

impl GlpkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn phase1_timeout(&self) -> Duration {
        Duration::from_millis(self.phase1_timeout_ms)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_phase1_timeout_ms(mut self, phase1_timeout_ms: u64) -> Self {
        self.phase1_timeout_ms = phase1_timeout_ms;
        self
    }

    pub fn with_phase1_max_size(mut self, size: usize) -> Self {
        self.phase1_max_size = size;
        self
    }

    pub fn with_tie_break(mut self, tie_break: bool) -> Self {
        self.tie_break = tie_break;
        self
    }
}

fn default_glpk_binary() -> PathBuf {
    PathBuf::from("glpsol")
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_phase1_timeout_ms() -> u64 {
    500
}

fn default_phase1_max_size() -> usize {
    25
}

fn default_failsafe_factor() -> f64 {
    1.2
}

fn default_true() -> bool {
    true
}

/// Thresholds for spotting preference structures that stall the optimizer
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DegeneracyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Groups with this many families or units (either axis) are flagged
    #[serde(default = "default_size_threshold")]
    pub size_threshold: usize,
    /// Share of families with an identical 5-unit prefix that flags the group
    #[serde(default = "default_ratio_threshold")]
    pub similarity_threshold: f64,
    /// Share of families covered by two mutually reversed 3-unit prefixes
    #[serde(default = "default_ratio_threshold")]
    pub opposition_threshold: f64,
}

impl Default for DegeneracyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            size_threshold: default_size_threshold(),
            similarity_threshold: default_ratio_threshold(),
            opposition_threshold: default_ratio_threshold(),
        }
    }
}

fn default_size_threshold() -> usize {
    11
}

fn default_ratio_threshold() -> f64 {
    0.8
}

/// Execution pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Send the manifest to the worker from a detached task instead of inline
    #[serde(default = "default_true")]
    pub defer_dispatch: bool,
    /// Capacity of the manifest queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            defer_dispatch: true,
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_queue_capacity() -> usize {
    16
}
