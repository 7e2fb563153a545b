use colored::{ColoredString, Colorize};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::io::{self, IsTerminal, Write};
use std::sync::Mutex;

/**
 * Colored stderr logger. Until `print_deferred` is called, records are held
 * back so that messages emitted while the configuration is still being
 * resolved can be filtered by the level it finally specifies.
 */
pub struct SeneschalLogger {
    level: Mutex<LevelFilter>,
    output: Mutex<Box<dyn Write + Send>>,
    deferred: Mutex<Vec<(Level, ColoredString)>>,
    defer_output: Mutex<bool>,
}

impl SeneschalLogger {
    pub fn new(level: LevelFilter) -> &'static Self {
        // Journald and friends don't want escape codes
        if !io::stderr().is_terminal() {
            colored::control::set_override(false);
        }
        Box::leak(Box::new(Self {
            level: Mutex::new(level),
            output: Mutex::new(Box::new(io::stderr())),
            deferred: Mutex::new(Vec::new()),
            defer_output: Mutex::new(true),
        }))
    }

    pub fn init(&'static self) -> Result<&'static Self, log::SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(LevelFilter::Trace);
        Ok(self)
    }

    pub fn set_level(&self, level: LevelFilter) {
        *self.level.lock().expect("Failed to lock level") = level;
    }

    pub fn print_deferred(&self) {
        {
            let deferred =
                self.deferred.lock().expect("Failed to lock deferred");
            let level_filter =
                *self.level.lock().expect("Failed to lock level");
            let mut output = self.output.lock().expect("Failed to lock output");
            for (level, message) in deferred.iter() {
                if level <= &level_filter {
                    let _ = writeln!(output, "{}", message);
                }
            }
        }
        self.deferred
            .lock()
            .expect("Failed to lock deferred")
            .clear();
        *self
            .defer_output
            .lock()
            .expect("Failed to lock defer_output") = false;
    }
}

fn format_record(record: &Record) -> ColoredString {
    let color = match record.level() {
        Level::Error => colored::Color::Red,
        Level::Warn => colored::Color::Yellow,
        Level::Info => colored::Color::White,
        Level::Debug => colored::Color::Blue,
        Level::Trace => colored::Color::BrightBlack,
    };
    let target = record
        .target()
        .strip_prefix("seneschal::")
        .unwrap_or(record.target());
    format!("[{:<5}] {}: {}", record.level(), target, record.args()).color(color)
}

impl Log for SeneschalLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= *self.level.lock().expect("Failed to lock level")
    }

    fn log(&self, record: &Record) {
        let line = format_record(record);
        if *self
            .defer_output
            .lock()
            .expect("Failed to lock defer_output")
        {
            self.deferred
                .lock()
                .expect("Failed to lock deferred")
                .push((record.level(), line));
        } else if self.enabled(record.metadata()) {
            let mut output = self.output.lock().expect("Failed to lock output");
            let _ = writeln!(output, "{}", line);
        }
    }

    fn flush(&self) {
        let _ = self.output.lock().expect("Failed to lock output").flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_record() {
        colored::control::set_override(false);
        let line = format_record(
            &Record::builder()
                .level(Level::Warn)
                .target("seneschal::service::reaper")
                .args(format_args!("server {} gone", 3))
                .build(),
        );
        assert_eq!(line.to_string(), "[WARN ] service::reaper: server 3 gone");
    }
}
