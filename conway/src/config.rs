// config.rs - Render service connection and simulation session settings

use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::codec::is_valid_alive_char;
use crate::grid::Dimensions;

pub const DEFAULT_CHAIN_ID: &str = "dev";
pub const DEFAULT_REMOTE_RPC: &str = "http://127.0.0.1:26657";
pub const DEFAULT_REALM_PATH: &str = "gno.land/r/wyhaines/gameoflife";
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 5_000;

pub const CHAIN_ID_VAR: &str = "CONWAY_CHAIN_ID";
pub const REMOTE_RPC_VAR: &str = "CONWAY_REMOTE_RPC";
pub const REALM_PATH_VAR: &str = "CONWAY_REALM_PATH";
pub const RPC_TIMEOUT_VAR: &str = "CONWAY_RPC_TIMEOUT_MS";

pub const DEFAULT_WIDTH: usize = 20;
pub const DEFAULT_HEIGHT: usize = 20;
pub const DEFAULT_DENSITY: f64 = 0.3;
pub const DEFAULT_ALIVE_CHARS: &str = "O";
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(200);

/// A configuration value was rejected before reaching the session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("board width and height must both be at least 1 (got {width}x{height})")]
    ZeroDimension { width: usize, height: usize },
    #[error("density must be within [0, 1] (got {0})")]
    DensityOutOfRange(f64),
    #[error("{0:?} cannot mark a live cell")]
    InvalidAliveChar(char),
    #[error("tick period must be non-zero")]
    ZeroTickPeriod,
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}

/// Where and how the render service is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub chain_id: String,
    pub remote_rpc: String,
    pub realm_path: String,
    pub request_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID.to_string(),
            remote_rpc: DEFAULT_REMOTE_RPC.to_string(),
            realm_path: DEFAULT_REALM_PATH.to_string(),
            request_timeout: Duration::from_millis(DEFAULT_RPC_TIMEOUT_MS),
        }
    }
}

impl ServiceConfig {
    /// Reads `CONWAY_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup; unset or blank keys
    /// fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let request_timeout = match get(RPC_TIMEOUT_VAR) {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: RPC_TIMEOUT_VAR,
                        value: raw,
                    });
                }
            },
            None => defaults.request_timeout,
        };

        Ok(Self {
            chain_id: get(CHAIN_ID_VAR).unwrap_or(defaults.chain_id),
            remote_rpc: get(REMOTE_RPC_VAR).unwrap_or(defaults.remote_rpc),
            realm_path: get(REALM_PATH_VAR).unwrap_or(defaults.realm_path),
            request_timeout,
        })
    }
}

/// Seeding and pacing knobs for a session.
///
/// Replaced wholesale on edit; only [`SessionConfigBuilder::build`] produces
/// one, so a held value is always valid.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    dimensions: Dimensions,
    density: f64,
    alive_chars: Vec<char>,
    tick_period: Duration,
    seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dimensions: Dimensions::clamped(DEFAULT_WIDTH, DEFAULT_HEIGHT),
            density: DEFAULT_DENSITY,
            alive_chars: DEFAULT_ALIVE_CHARS.chars().collect(),
            tick_period: DEFAULT_TICK_PERIOD,
            seed: None,
        }
    }
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::from(&Self::default())
    }

    /// Starts a builder pre-filled with this config's values.
    pub fn to_builder(&self) -> SessionConfigBuilder {
        SessionConfigBuilder::from(self)
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn density(&self) -> f64 {
        self.density
    }

    /// Candidate live-cell characters; duplicates weight the draw.
    pub fn alive_chars(&self) -> &[char] {
        &self.alive_chars
    }

    pub fn tick_period(&self) -> Duration {
        self.tick_period
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// True when switching to `other` changes what a fresh board looks like.
    pub fn seeding_differs(&self, other: &SessionConfig) -> bool {
        self.dimensions != other.dimensions
            || self.density != other.density
            || self.alive_chars != other.alive_chars
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfigBuilder {
    width: usize,
    height: usize,
    density: f64,
    alive_chars: String,
    tick_period: Duration,
    seed: Option<u64>,
}

impl From<&SessionConfig> for SessionConfigBuilder {
    fn from(config: &SessionConfig) -> Self {
        Self {
            width: config.dimensions.width(),
            height: config.dimensions.height(),
            density: config.density,
            alive_chars: config.alive_chars.iter().collect(),
            tick_period: config.tick_period,
            seed: config.seed,
        }
    }
}

impl SessionConfigBuilder {
    pub fn dimensions(mut self, width: usize, height: usize) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn density(mut self, density: f64) -> Self {
        self.density = density;
        self
    }

    /// Spaces are the dead marker and are dropped here; an empty result is
    /// allowed and seeds all-dead boards.
    pub fn alive_chars(mut self, chars: impl Into<String>) -> Self {
        self.alive_chars = chars.into();
        self
    }

    pub fn tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn build(self) -> Result<SessionConfig, ConfigError> {
        let dimensions =
            Dimensions::new(self.width, self.height).ok_or(ConfigError::ZeroDimension {
                width: self.width,
                height: self.height,
            })?;

        if !(0.0..=1.0).contains(&self.density) {
            return Err(ConfigError::DensityOutOfRange(self.density));
        }

        let mut alive_chars = Vec::with_capacity(self.alive_chars.len());
        for c in self.alive_chars.chars().filter(|&c| c != ' ') {
            if !is_valid_alive_char(c) {
                return Err(ConfigError::InvalidAliveChar(c));
            }
            alive_chars.push(c);
        }

        if self.tick_period.is_zero() {
            return Err(ConfigError::ZeroTickPeriod);
        }

        Ok(SessionConfig {
            dimensions,
            density: self.density,
            alive_chars,
            tick_period: self.tick_period,
            seed: self.seed,
        })
    }
}
