//! The `log` module configures logging for the simulation binary. Logging is
//! not to be confused with _reporting_, which records model output (count
//! curves, time series) to CSV files.
//!
//! This module (re)exports the five logging macros: `error!`, `warn!`,
//! `info!`, `debug!` and `trace!` where `error!` represents the
//! highest-priority log messages and `trace!` the lowest. To emit a log
//! message, simply use one of these macros in your code:
//!
//! ```rust
//! use episim::log::info;
//!
//! pub fn do_a_thing() {
//!     info!("A thing is being done.");
//! }
//! ```
//!
//! Logging is _disabled_ by default. Log messages are enabled/disabled using
//! the functions:
//!
//!  - `enable_logging()`: turns on all log messages
//!  - `disable_logging()`: turns off all log messages
//!  - `set_log_level(level: LevelFilter)`: enables only log messages with
//!    priority at least `level`
//!
//! Per-module filtering of messages can be configured with
//! `set_module_filter()`.

pub use log::{debug, error, info, trace, warn, LevelFilter};

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, MutexGuard};

use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::Handle;

// Use an ISO 8601 timestamp format and color coded level tag
const DEFAULT_LOG_PATTERN: &str = "{d(%Y-%m-%dT%H:%M:%SZ)} {h({l})} {t} - {m}{n}";

// Logging disabled
const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Off;

/// A global instance of the logging configuration.
static LOG_CONFIGURATION: LazyLock<Mutex<LogConfiguration>> = LazyLock::new(Mutex::default);

/// Holds logging configuration. Its primary responsibility is to keep track
/// of the global and per-module filter levels and hold a handle to the global
/// logger.
///
/// Because loggers are globally installed, only one instance of this struct
/// should exist. The public API are free functions which fetch the singleton
/// and call the appropriate member function.
#[derive(Debug)]
struct LogConfiguration {
    /// The "default" level filter for modules ("targets") without an
    /// explicitly set filter. A global filter level of `LevelFilter::Off`
    /// disables logging.
    global_log_level: LevelFilter,
    /// Level filters keyed by module path (e.g. `"episim::grid"`)
    module_levels: HashMap<String, LevelFilter>,
    /// Handle to the `log4rs` logger, retained so the configuration can be
    /// swapped after the logger has been installed.
    root_handle: Option<Handle>,
}

impl Default for LogConfiguration {
    fn default() -> Self {
        Self {
            global_log_level: DEFAULT_LOG_LEVEL,
            module_levels: HashMap::new(),
            root_handle: None,
        }
    }
}

impl LogConfiguration {
    /// Sets the global logger to conform to this `LogConfiguration`.
    fn set_config(&mut self) {
        let encoder = Box::new(PatternEncoder::new(DEFAULT_LOG_PATTERN));
        let stdout: ConsoleAppender = ConsoleAppender::builder().encoder(encoder).build();
        let mut config =
            Config::builder().appender(Appender::builder().build("stdout", Box::new(stdout)));

        for (module, level) in &self.module_levels {
            config = config.logger(Logger::builder().build(module.clone(), *level));
        }

        // The `Root` determines the global log level
        let root = Root::builder()
            .appender("stdout")
            .build(self.global_log_level);
        let new_config = match config.build(root) {
            Err(e) => {
                panic!("failed to build log config: {e}");
            }
            Ok(config) => config,
        };

        match self.root_handle {
            Some(ref mut handle) => {
                // The global logger has already been initialized
                handle.set_config(new_config);
            }
            None => {
                // The global logger has not yet been initialized
                self.root_handle = Some(log4rs::init_config(new_config).unwrap());
            }
        }
    }
}

fn get_log_configuration() -> MutexGuard<'static, LogConfiguration> {
    LOG_CONFIGURATION.lock().unwrap()
}

/// Enables the logger with no global level filter / full logging. Equivalent
/// to `set_log_level(LevelFilter::Trace)`.
pub fn enable_logging() {
    set_log_level(LevelFilter::Trace);
}

/// Disables logging completely. Equivalent to
/// `set_log_level(LevelFilter::Off)`.
pub fn disable_logging() {
    set_log_level(LevelFilter::Off);
}

/// Sets the global log level. A global filter level of `LevelFilter::Off`
/// disables logging.
pub fn set_log_level(level: LevelFilter) {
    let mut config = get_log_configuration();
    config.global_log_level = level;
    config.set_config();
}

/// Sets a level filter for the given module path.
pub fn set_module_filter(module_path: &str, level: LevelFilter) {
    let mut config = get_log_configuration();
    config.module_levels.insert(module_path.to_string(), level);
    config.set_config();
}
