//! Runtime configuration read from environment variables.
//!
//! # Environment Variables
//!
//! - `BPINDEX_ORDER`: branching factor of the in-memory tree (default: `5`)
//! - `BPINDEX_LOG`: `tracing` filter directive (default: `bpindex=info,bplus_index=info`)
//!
//! # Invariants
//!
//! - `order` is always at least [`Order::MIN`]

use thiserror::Error;

use crate::order::Order;

/// Environment variable holding the branching factor.
pub const ORDER_VAR: &str = "BPINDEX_ORDER";
/// Environment variable holding the log filter.
pub const LOG_VAR: &str = "BPINDEX_LOG";
/// Filter used when [`LOG_VAR`] is unset.
pub const DEFAULT_LOG_FILTER: &str = "bpindex=info,bplus_index=info";

/// Error returned when loading configuration fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
}

/// Settings shared by every command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub order: Order,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            order: Order::DEFAULT,
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `BPINDEX_ORDER` is set but is not an integer of at
    /// least 3.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value
    /// or `None` when it is unset.
    ///
    /// # Errors
    ///
    /// See [`Config::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let order = Self::load_order(lookup(ORDER_VAR))?;
        let log_filter = lookup(LOG_VAR)
            .filter(|filter| !filter.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_owned());

        Ok(Self { order, log_filter })
    }

    fn load_order(value: Option<String>) -> Result<Order, ConfigError> {
        let Some(value) = value else {
            return Ok(Order::DEFAULT);
        };
        let invalid = |message: String| ConfigError::InvalidValue {
            name: ORDER_VAR.to_owned(),
            message,
        };

        let m = value
            .trim()
            .parse::<usize>()
            .map_err(|_| invalid(format!("'{value}' is not a non-negative integer")))?;
        Order::new(m).map_err(|err| invalid(err.to_string()))
    }
}
