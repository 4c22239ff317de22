//! Safepoint Logging
//!
//! Structured record of safepoint activity, useful for:
//! - Finding mutators that poll too rarely
//! - Debugging nested pause requests
//! - Production monitoring of time-to-safepoint
//!
//! Log Levels:
//! - WARN: Slow time-to-safepoint
//! - INFO: Pause reached / released
//! - DEBUG: Pause requested, thread attach/detach

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Log level for safepoint events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

/// Safepoint event types
#[derive(Debug, Clone)]
pub enum SafepointEvent {
    /// Outermost pause requested
    PauseRequested {
        pause: u64,
        stop_main_thread: bool,
        registered_threads: usize,
    },

    /// All running threads reported parked
    PauseReached {
        pause: u64,
        running_threads: usize,
        time_to_safepoint_us: u64,
    },

    /// Outermost pause released
    PauseReleased { pause: u64, duration_us: u64 },

    /// Mutator thread registered with the coordinator
    ThreadAttached { thread: u64, main: bool },

    /// Mutator thread removed from the coordinator
    ThreadDetached { thread: u64 },

    /// Time-to-safepoint exceeded the configured threshold
    SlowSafepoint {
        pause: u64,
        time_to_safepoint_us: u64,
        threshold_ms: u64,
    },
}

impl SafepointEvent {
    /// Level this event is logged at
    pub fn level(&self) -> LogLevel {
        match self {
            SafepointEvent::SlowSafepoint { .. } => LogLevel::Warn,
            SafepointEvent::PauseReached { .. } | SafepointEvent::PauseReleased { .. } => {
                LogLevel::Info
            },
            SafepointEvent::PauseRequested { .. }
            | SafepointEvent::ThreadAttached { .. }
            | SafepointEvent::ThreadDetached { .. } => LogLevel::Debug,
        }
    }
}

/// Safepoint logger configuration
#[derive(Debug, Clone)]
pub struct SafepointLoggerConfig {
    /// Minimum log level
    pub level: LogLevel,

    /// Enable console output
    pub console: bool,

    /// Enable JSON format
    pub json: bool,

    /// Enable timestamps
    pub timestamps: bool,

    /// Number of recorded events kept; the oldest is dropped first
    pub max_events: usize,
}

impl Default for SafepointLoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            console: true,
            json: false,
            timestamps: true,
            max_events: 1024,
        }
    }
}

/// Safepoint logger - records and optionally prints safepoint events
pub struct SafepointLogger {
    config: SafepointLoggerConfig,
    events: Mutex<VecDeque<(Instant, SafepointEvent)>>,
    enabled: AtomicBool,
}

impl SafepointLogger {
    /// Create new logger
    pub fn new(config: SafepointLoggerConfig) -> Self {
        Self {
            config,
            events: Mutex::new(VecDeque::new()),
            enabled: AtomicBool::new(true),
        }
    }

    /// Enable logging
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    /// Disable logging
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    /// Check if logging is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Log a safepoint event
    pub fn log(&self, event: SafepointEvent) {
        if !self.is_enabled() {
            return;
        }

        if event.level() > self.config.level {
            return;
        }

        if self.config.console {
            self.output_console(&event);
        }

        if self.config.max_events == 0 {
            return;
        }
        let mut events = self.events.lock();
        if events.len() == self.config.max_events {
            events.pop_front();
        }
        events.push_back((Instant::now(), event));
    }

    fn output_console(&self, event: &SafepointEvent) {
        if self.config.timestamps {
            let now = chrono::Local::now();
            print!("[{}] ", now.format("%Y-%m-%d %H:%M:%S%.3f"));
        }

        if self.config.json {
            println!("{}", Self::to_json(event));
        } else {
            println!("{}", Self::to_human(event));
        }
    }

    /// Human-readable rendering
    pub fn to_human(event: &SafepointEvent) -> String {
        match event {
            SafepointEvent::PauseRequested {
                pause,
                stop_main_thread,
                registered_threads,
            } => format!(
                "[Safepoint] Pause {} requested ({} threads registered, stop main: {})",
                pause, registered_threads, stop_main_thread
            ),
            SafepointEvent::PauseReached {
                pause,
                running_threads,
                time_to_safepoint_us,
            } => format!(
                "[Safepoint] Pause {} reached: {} running threads parked in {} us",
                pause, running_threads, time_to_safepoint_us
            ),
            SafepointEvent::PauseReleased { pause, duration_us } => {
                format!("[Safepoint] Pause {} released after {} us", pause, duration_us)
            },
            SafepointEvent::ThreadAttached { thread, main } => {
                let kind = if *main { "main" } else { "background" };
                format!("[Safepoint] Thread {} attached ({})", thread, kind)
            },
            SafepointEvent::ThreadDetached { thread } => {
                format!("[Safepoint] Thread {} detached", thread)
            },
            SafepointEvent::SlowSafepoint {
                pause,
                time_to_safepoint_us,
                threshold_ms,
            } => format!(
                "[Safepoint] Pause {} slow: {} us to safepoint (threshold {} ms)",
                pause, time_to_safepoint_us, threshold_ms
            ),
        }
    }

    /// JSON rendering
    pub fn to_json(event: &SafepointEvent) -> String {
        let json = match event {
            SafepointEvent::PauseRequested {
                pause,
                stop_main_thread,
                registered_threads,
            } => serde_json::json!({
                "type": "pause_requested",
                "pause": pause,
                "stop_main_thread": stop_main_thread,
                "registered_threads": registered_threads
            }),
            SafepointEvent::PauseReached {
                pause,
                running_threads,
                time_to_safepoint_us,
            } => serde_json::json!({
                "type": "pause_reached",
                "pause": pause,
                "running_threads": running_threads,
                "time_to_safepoint_us": time_to_safepoint_us
            }),
            SafepointEvent::PauseReleased { pause, duration_us } => serde_json::json!({
                "type": "pause_released",
                "pause": pause,
                "duration_us": duration_us
            }),
            SafepointEvent::ThreadAttached { thread, main } => serde_json::json!({
                "type": "thread_attached",
                "thread": thread,
                "main": main
            }),
            SafepointEvent::ThreadDetached { thread } => serde_json::json!({
                "type": "thread_detached",
                "thread": thread
            }),
            SafepointEvent::SlowSafepoint {
                pause,
                time_to_safepoint_us,
                threshold_ms,
            } => serde_json::json!({
                "type": "slow_safepoint",
                "pause": pause,
                "time_to_safepoint_us": time_to_safepoint_us,
                "threshold_ms": threshold_ms
            }),
        };

        json.to_string()
    }

    /// Get recorded events, oldest first
    pub fn get_events(&self) -> Vec<(Instant, SafepointEvent)> {
        self.events.lock().iter().cloned().collect()
    }

    /// Clear all events
    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    /// Get event count
    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }
}

impl Default for SafepointLogger {
    fn default() -> Self {
        Self::new(SafepointLoggerConfig::default())
    }
}

/// Global safepoint logger
lazy_static::lazy_static! {
    static ref GLOBAL_LOGGER: Mutex<SafepointLogger> = Mutex::new(SafepointLogger::default());
}

/// Log a safepoint event to the global logger
pub fn log_event(event: SafepointEvent) {
    GLOBAL_LOGGER.lock().log(event);
}

/// Configure global logger
pub fn configure_logger(config: SafepointLoggerConfig) {
    *GLOBAL_LOGGER.lock() = SafepointLogger::new(config);
}

/// Get global logger event count
pub fn get_event_count() -> usize {
    GLOBAL_LOGGER.lock().event_count()
}
