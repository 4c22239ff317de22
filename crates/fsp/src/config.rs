//! Configuration Module - Safepoint Tuning Parameters
//!
//! The pause protocol has no knobs that change its semantics. Configuration
//! only controls what gets observed about it: logging, statistics and the
//! threshold at which a slow time-to-safepoint is reported.

use crate::logging::{LogLevel, SafepointLoggerConfig};

/// Configuration for a runtime's safepoint machinery
///
/// # Examples
///
/// ```rust
/// use fsp::SafepointConfig;
///
/// let config = SafepointConfig {
///     verbose: true,
///     slow_safepoint_threshold_ms: 5,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct SafepointConfig {
    /// Emit safepoint events to the structured logger
    ///
    /// Default: false
    pub verbose: bool,

    /// Collect pause statistics
    ///
    /// Records time-to-safepoint and pause duration histograms.
    /// Default: true
    pub stats_enabled: bool,

    /// Time-to-safepoint threshold in milliseconds
    ///
    /// A pause that takes longer than this to bring every running thread
    /// to a safepoint is reported with `log::warn!` and a `SlowSafepoint`
    /// event. Usually means some mutator polls too rarely.
    ///
    /// Default: 10ms
    pub slow_safepoint_threshold_ms: u64,

    /// Structured logger settings, used when `verbose` is set
    pub logger: SafepointLoggerConfig,
}

impl Default for SafepointConfig {
    fn default() -> Self {
        SafepointConfig {
            verbose: false,
            stats_enabled: true,
            slow_safepoint_threshold_ms: 10,
            logger: SafepointLoggerConfig {
                console: false,
                ..Default::default()
            },
        }
    }
}

impl SafepointConfig {
    /// Validate configuration
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fsp::SafepointConfig;
    ///
    /// let config = SafepointConfig {
    ///     slow_safepoint_threshold_ms: 0,
    ///     ..Default::default()
    /// };
    ///
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slow_safepoint_threshold_ms == 0 {
            return Err(ConfigError::InvalidThreshold(
                "slow_safepoint_threshold_ms must be > 0".to_string(),
            ));
        }

        if self.verbose && self.logger.level < LogLevel::Warn {
            return Err(ConfigError::InvalidLogger(
                "verbose logging at level Error records no safepoint events".to_string(),
            ));
        }

        if self.verbose && self.logger.max_events == 0 {
            return Err(ConfigError::InvalidLogger(
                "verbose logging with max_events = 0 records no safepoint events".to_string(),
            ));
        }

        Ok(())
    }

    /// Build configuration from environment variables
    ///
    /// Overrides defaults with environment variables:
    /// - FSP_VERBOSE
    /// - FSP_STATS
    /// - FSP_SLOW_SAFEPOINT_MS
    ///
    /// # Examples
    ///
    /// ```bash
    /// export FSP_VERBOSE=1
    /// export FSP_SLOW_SAFEPOINT_MS=2
    /// ```
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("FSP_VERBOSE") {
            config.verbose = parse_flag(&val);
        }

        if let Ok(val) = std::env::var("FSP_STATS") {
            config.stats_enabled = parse_flag(&val);
        }

        if let Ok(val) = std::env::var("FSP_SLOW_SAFEPOINT_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                config.slow_safepoint_threshold_ms = ms;
            }
        }

        config
    }

    /// Slow-safepoint threshold in nanoseconds
    pub fn slow_safepoint_threshold_ns(&self) -> u64 {
        self.slow_safepoint_threshold_ms.saturating_mul(1_000_000)
    }
}

fn parse_flag(val: &str) -> bool {
    val == "1" || val.eq_ignore_ascii_case("true")
}

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("Invalid logger: {0}")]
    InvalidLogger(String),
}
