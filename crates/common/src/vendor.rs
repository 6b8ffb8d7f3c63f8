//! Third party facilities shared by every crate of the workspace, the
//! logging macros here write to a process wide logger which is installed
//! by [`init_logger_factory`](logger::init_logger_factory). Before that,
//! every record is discarded.

pub use slog;

#[doc(hidden)]
#[inline]
pub fn __logger() -> slog::Logger {
    slog_scope::logger()
}

#[macro_export]
macro_rules! crit {
    ($($args:tt)+) => { $crate::vendor::slog::crit!($crate::vendor::__logger(), $($args)+) };
}

#[macro_export]
macro_rules! error {
    ($($args:tt)+) => { $crate::vendor::slog::error!($crate::vendor::__logger(), $($args)+) };
}

#[macro_export]
macro_rules! warn {
    ($($args:tt)+) => { $crate::vendor::slog::warn!($crate::vendor::__logger(), $($args)+) };
}

#[macro_export]
macro_rules! info {
    ($($args:tt)+) => { $crate::vendor::slog::info!($crate::vendor::__logger(), $($args)+) };
}

#[macro_export]
macro_rules! debug {
    ($($args:tt)+) => { $crate::vendor::slog::debug!($crate::vendor::__logger(), $($args)+) };
}

#[macro_export]
macro_rules! trace {
    ($($args:tt)+) => { $crate::vendor::slog::trace!($crate::vendor::__logger(), $($args)+) };
}

pub mod logger {
    use std::{fs::OpenOptions, path::Path};

    use slog::{o, Drain, Level, Logger};

    const DEFAULT_CHAN_SIZE: usize = 4096;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum LogLevel {
        Critical,
        Error,
        Warning,
        Info,
        Debug,
        Trace,
    }

    impl From<LogLevel> for Level {
        fn from(level: LogLevel) -> Self {
            match level {
                LogLevel::Critical => Level::Critical,
                LogLevel::Error => Level::Error,
                LogLevel::Warning => Level::Warning,
                LogLevel::Info => Level::Info,
                LogLevel::Debug => Level::Debug,
                LogLevel::Trace => Level::Trace,
            }
        }
    }

    #[derive(Debug, Clone, Copy)]
    pub struct LoggerConfig {
        pub level: LogLevel,
        /// capacity of the async drain, records beyond it are dropped.
        pub chan_size: usize,
    }

    impl Default for LoggerConfig {
        fn default() -> Self {
            Self::in_level(LogLevel::Info)
        }
    }

    impl LoggerConfig {
        pub fn in_level(level: LogLevel) -> Self {
            Self {
                level,
                chan_size: DEFAULT_CHAN_SIZE,
            }
        }
    }

    /// Terminal logger of given config.
    impl From<LoggerConfig> for Logger {
        fn from(conf: LoggerConfig) -> Self {
            let decorator = slog_term::TermDecorator::new().build();
            let drain = slog_term::FullFormat::new(decorator).build().fuse();
            let drain = drain.filter_level(conf.level.into()).fuse();
            let drain = slog_async::Async::new(drain)
                .chan_size(conf.chan_size)
                .build()
                .fuse();
            Logger::root(drain, o!())
        }
    }

    /// Create a logger which appends plain records to the file at `path`,
    /// fallback to terminal if the file can't be opened.
    pub fn conf_file_logger<P: AsRef<Path>>(path: P, conf: LoggerConfig) -> Logger {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref());
        let file = match file {
            Ok(file) => file,
            Err(_) => return conf.into(),
        };
        let decorator = slog_term::PlainDecorator::new(file);
        let drain = slog_term::FullFormat::new(decorator).build().fuse();
        let drain = drain.filter_level(conf.level.into()).fuse();
        let drain = slog_async::Async::new(drain)
            .chan_size(conf.chan_size)
            .build()
            .fuse();
        Logger::root(drain, o!())
    }

    pub struct LogFactory {
        default: Logger,
    }

    impl Default for LogFactory {
        fn default() -> Self {
            Self {
                default: LoggerConfig::default().into(),
            }
        }
    }

    impl LogFactory {
        pub fn use_logger(mut self, logger: Logger) -> Self {
            self.default = logger;
            self
        }
    }

    /// Install the default logger of factory as the process wide logger
    /// that all logging macros write to. Later calls replace it.
    pub fn init_logger_factory(factory: LogFactory) {
        let guard = slog_scope::set_global_logger(factory.default);
        guard.cancel_reset();
    }
}

pub mod prelude {
    pub use crate::{crit, debug, error, info, trace, warn};
    pub use super::logger::{
        conf_file_logger, init_logger_factory, LogFactory, LogLevel, LoggerConfig,
    };
    pub use dashmap::{DashMap, DashSet};

    pub mod lock {
        pub use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
    }
}
