//! Logging to the terminal and to the session's log file

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use colored::{ColoredString, Colorize};
use log::{info, Level};
use std::{fmt, thread};
use thiserror::Error;

// Internal imports
use crate::session::{self, Session};

// Re-exports
pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("The log level must include info messages, found `{0}`")]
    InvalidMinLogLevel(LevelFilter),

    #[error("Could not open the log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("A logger has already been installed: {0}")]
    FernInitError(log::SetLoggerError),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Install the logger, writing to stdout and to the session's log file.
///
/// `min_level` must be `Info` or more verbose. Only the first call in a process succeeds.
pub fn logger_init(min_level: LevelFilter, session: &Session) -> Result<(), LoggerInitError> {
    if min_level < Level::Info {
        return Err(LoggerInitError::InvalidMinLogLevel(min_level));
    }

    let log_file = fern::log_file(&session.log_file_path)
        .map_err(LoggerInitError::LogFileInitError)?;

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}",
                format_line(
                    session::get_elapsed_seconds(),
                    record.level(),
                    record.target(),
                    thread::current().name(),
                    message
                )
            ))
        })
        .level(min_level)
        .level_for("zmq", LevelFilter::Info)
        .chain(std::io::stdout())
        .chain(log_file)
        .apply()
        .map_err(LoggerInitError::FernInitError)?;

    info!("Logging initialised");
    if let Some(epoch) = session::get_epoch() {
        info!("    Session epoch: {}", epoch);
    }
    info!("    Log level: {:?}", min_level);
    info!("    Log file path: {:?}", session.log_file_path);

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Format one record. Debug and trace records also name their target and, for the background
/// threads of a solver, the thread they come from.
fn format_line(
    elapsed: f64,
    level: Level,
    target: &str,
    thread: Option<&str>,
    message: &fmt::Arguments,
) -> String {
    if level <= Level::Info {
        return format!("[{:10.6} {}] {}", elapsed, level_to_str(level), message);
    }

    match thread {
        Some(t) if t != "main" => format!(
            "[{:10.6} {}] {} ({}): {}",
            elapsed,
            level_to_str(level),
            target,
            t,
            message
        ),
        _ => format!("[{:10.6} {}] {}: {}", elapsed, level_to_str(level), target, message),
    }
}

fn level_to_str(level: Level) -> ColoredString {
    match level {
        Level::Trace => "TRC".dimmed().italic(),
        Level::Debug => "DBG".dimmed(),
        Level::Info => "INF".normal(),
        Level::Warn => "WRN".yellow(),
        Level::Error => "ERR".red().bold(),
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn line(level: Level, thread: Option<&str>) -> String {
        colored::control::set_override(false);
        format_line(1.5, level, "slv_lib::solver", thread, &format_args!("solved"))
    }

    #[test]
    fn test_format_line() {
        assert_eq!(line(Level::Info, Some("slv")), "[  1.500000 INF] solved");
        assert_eq!(line(Level::Warn, None), "[  1.500000 WRN] solved");
        assert_eq!(line(Level::Debug, Some("main")), "[  1.500000 DBG] slv_lib::solver: solved");
        assert_eq!(
            line(Level::Trace, Some("slv")),
            "[  1.500000 TRC] slv_lib::solver (slv): solved"
        );
    }
}
