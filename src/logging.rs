use log::LevelFilter;

/// Log level named by the `LOG` build-time variable, off when unset or unknown.
pub fn level_filter(name: Option<&str>) -> LevelFilter {
    match name {
        Some("error") => LevelFilter::Error,
        Some("warn") => LevelFilter::Warn,
        Some("info") => LevelFilter::Info,
        Some("debug") => LevelFilter::Debug,
        Some("trace") => LevelFilter::Trace,
        _ => LevelFilter::Off,
    }
}

#[cfg(all(target_arch = "riscv64", target_os = "none"))]
mod logger {
    use log::{Level, Metadata, Record};

    struct SimpleLogger;

    impl log::Log for SimpleLogger {
        fn enabled(&self, _metadata: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            if !self.enabled(record.metadata()) {
                return;
            }
            println!(
                "\x1b[{}m[{}] {}\x1b[0m",
                level_to_color_code(record.level()),
                record.level(),
                record.args()
            );
        }

        fn flush(&self) {}
    }

    pub fn init() {
        static LOGGER: SimpleLogger = SimpleLogger;
        if let Err(err) = log::set_logger(&LOGGER) {
            panic!("set LOGGER ERROR, {}", err);
        }
        log::set_max_level(super::level_filter(option_env!("LOG")));
    }

    fn level_to_color_code(level: Level) -> u8 {
        match level {
            Level::Error => 31, // Red
            Level::Warn => 93,  // BrightYellow
            Level::Info => 34,  // Blue
            Level::Debug => 32, // Green
            Level::Trace => 90, // BrightBlack
        }
    }
}

#[cfg(all(target_arch = "riscv64", target_os = "none"))]
pub use logger::init;
