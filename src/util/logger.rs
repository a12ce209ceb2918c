use crate::error::PregelError;
use chrono::Local;
use log::{Level, Log, Metadata, Record};

/// Writes `<timestamp> <level> [<thread>] <message>` lines to stdout.
struct PregelLogger {
    level: Level,
}

impl Log for PregelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    #[allow(clippy::print_stdout)]
    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let thread = std::thread::current();
            println!(
                "{} {:<5} [{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.6f"),
                record.level().to_string(),
                thread.name().unwrap_or("-"),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}

pub fn init_logger_with_level(level: Level) -> Result<(), PregelError> {
    let logger = PregelLogger { level };
    log::set_boxed_logger(Box::new(logger))
        .map_err(|e| PregelError::Generic(format!("Could not set logger: {}", e)))?;
    log::set_max_level(level.to_level_filter());
    Ok(())
}

/// Reads the level from `PREGEL_LOG` (`error`..`trace`), defaulting to `info`.
pub fn init_logger_from_env() -> Result<(), PregelError> {
    let level = std::env::var("PREGEL_LOG")
        .ok()
        .and_then(|value| value.parse::<Level>().ok())
        .unwrap_or(Level::Info);
    init_logger_with_level(level)
}
