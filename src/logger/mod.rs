use colored::*;
use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::sync::Mutex;

/// 带颜色标签的日志输出，写到stderr，不干扰stdout上的结果
pub struct Logger {
    use_colors: bool,
    max_level: LevelFilter,
    mutex: Mutex<()>,
}

impl Logger {
    pub fn new(max_level: LevelFilter) -> Self {
        Logger {
            use_colors: true,
            max_level,
            mutex: Mutex::new(()),
        }
    }

    pub fn without_colors(mut self) -> Self {
        self.use_colors = false;
        self
    }

    fn label(level: Level) -> &'static str {
        match level {
            Level::Error => "ERR",
            Level::Warn => "WRN",
            Level::Info => "INF",
            Level::Debug => "DBG",
            Level::Trace => "TRC",
        }
    }

    fn wrap(&self, level: Level) -> String {
        let label = Self::label(level);
        if !self.use_colors {
            return label.to_string();
        }

        match level {
            Level::Error => label.red().to_string(),
            Level::Warn => label.yellow().to_string(),
            Level::Info => label.blue().to_string(),
            Level::Debug => label.magenta().to_string(),
            Level::Trace => label.normal().to_string(),
        }
    }

    pub fn format(&self, level: Level, args: &std::fmt::Arguments) -> String {
        format!("[{}] {}", self.wrap(level), args)
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = self.format(record.level(), record.args());
        let _guard = match self.mutex.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = writeln!(std::io::stderr(), "{}", line);
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// 安装全局日志，只能调用一次
pub fn init_logger(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_boxed_logger(Box::new(Logger::new(level)))?;
    log::set_max_level(level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Log;

    #[test]
    fn labels_and_levels() {
        let logger = Logger::new(LevelFilter::Info).without_colors();
        assert_eq!(logger.format(Level::Warn, &format_args!("磁盘 {}", 1)), "[WRN] 磁盘 1");
        assert_eq!(logger.format(Level::Info, &format_args!("ok")), "[INF] ok");

        let debug = Metadata::builder().level(Level::Debug).build();
        assert!(!logger.enabled(&debug));
        let error = Metadata::builder().level(Level::Error).build();
        assert!(logger.enabled(&error));
    }
}
