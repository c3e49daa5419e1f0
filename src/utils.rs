use anyhow::Result;
use chrono::{DateTime, Local};
use log::{LevelFilter, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Where log lines end up
enum Sink {
    File(Mutex<File>),
    Stdout,
}

/// Timestamped logger for the binary; tests use env_logger instead
pub struct SimpleLogger {
    sink: Sink,
}

impl SimpleLogger {
    pub fn new(log_file: Option<&Path>) -> Result<Self> {
        let sink = match log_file {
            Some(path) => Sink::File(Mutex::new(OpenOptions::new().create(true).append(true).open(path)?)),
            None => Sink::Stdout,
        };
        Ok(SimpleLogger { sink })
    }

    fn format(record: &Record) -> String {
        let now: DateTime<Local> = Local::now();
        format!(
            "[{}] {:<5} [{}:{}] {}\n",
            now.format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.file().unwrap_or("unknown"),
            record.line().unwrap_or(0),
            record.args()
        )
    }
}

impl log::Log for SimpleLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = Self::format(record);
        match &self.sink {
            Sink::File(file) => {
                // A poisoned lock only means another thread panicked mid-write
                let mut file = match file.lock() {
                    Ok(file) => file,
                    Err(poisoned) => poisoned.into_inner(),
                };
                let _ = file.write_all(line.as_bytes());
            }
            Sink::Stdout => print!("{}", line),
        }
    }

    fn flush(&self) {
        match &self.sink {
            Sink::File(file) => {
                if let Ok(mut file) = file.lock() {
                    let _ = file.flush();
                }
            }
            Sink::Stdout => {
                let _ = std::io::stdout().flush();
            }
        }
    }
}

/// Install the logger. `None` logs to stdout, interleaved with the chat output.
pub fn setup_logging(log_file: Option<&Path>, level: LevelFilter) -> Result<()> {
    let logger = SimpleLogger::new(log_file)?;
    log::set_boxed_logger(Box::new(logger)).map(|()| log::set_max_level(level))?;

    match log_file {
        Some(path) => log::info!("Logging to {} at level {}", path.display(), level),
        None => log::info!("Logging to stdout at level {}", level),
    }
    log::info!("{} version {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::{Level, Log};

    fn record_to(logger: &SimpleLogger, message: &str) {
        logger.log(
            &Record::builder()
                .args(format_args!("{}", message))
                .level(Level::Error)
                .file(Some("chat/lifecycle.rs"))
                .line(Some(42))
                .build(),
        );
        logger.flush();
    }

    #[test]
    fn test_file_sink_appends_formatted_lines() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let logger = SimpleLogger::new(Some(file.path())).unwrap();
        record_to(&logger, "Failed to send message 7");

        let written = std::fs::read_to_string(file.path()).unwrap();
        assert!(written.contains("ERROR [chat/lifecycle.rs:42] Failed to send message 7"));
        assert!(written.ends_with('\n'));
    }

    #[test]
    fn test_stdout_sink_without_log_file() {
        let logger = SimpleLogger::new(None).unwrap();
        assert!(matches!(logger.sink, Sink::Stdout));
        record_to(&logger, "printed, not written");
    }
}
