//! Logging: `env_logger` behind the `log` facade, written to stderr
//!
//! stdout carries the message stream, so nothing here ever writes to it.
//! In TTY mode lines go through indicatif so stream spinners are not torn.

use std::fmt::Write as _;

use indicatif::MultiProgress;

/// Crates whose logs follow the requested verbosity; everything else
/// (reqwest, hyper, ...) stays at `warn`.
const OWN_CRATES: &[&str] = &["syncline", "syncline_core", "syncline_engine"];

/// Filter used when `RUST_LOG` is unset
pub fn default_filter(quiet: bool, debug: bool) -> String {
    let level = if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let mut filter = String::from("warn");
    for krate in OWN_CRATES {
        let _ = write!(filter, ",{krate}={level}");
    }
    filter
}

/// ANSI color code and padded label for a log level.
fn level_style(level: log::Level, color: bool) -> (&'static str, &'static str, &'static str) {
    let label = match level {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARN ",
        log::Level::Info => "INFO ",
        log::Level::Debug => "DEBUG",
        log::Level::Trace => "TRACE",
    };
    if !color {
        return ("", label, "");
    }
    let ansi = match level {
        log::Level::Error => "\x1b[31m",
        log::Level::Warn => "\x1b[33m",
        log::Level::Info => "\x1b[32m",
        log::Level::Debug => "\x1b[36m",
        log::Level::Trace => "\x1b[35m",
    };
    (ansi, label, "\x1b[0m")
}

/// `syncline_engine::paginator` -> `paginator`
fn short_target(target: &str) -> &str {
    target.rsplit("::").next().unwrap_or(target)
}

fn format_line(record: &log::Record, color: bool, with_target: bool) -> String {
    let (pre, label, post) = level_style(record.level(), color);
    if with_target {
        format!(
            "[{pre}{label}{post} {}] {}",
            short_target(record.target()),
            record.args()
        )
    } else {
        format!("[{pre}{label}{post}] {}", record.args())
    }
}

/// Logger that prints through indicatif MultiProgress so stream spinners stay intact.
pub struct IndicatifLogger {
    inner: env_logger::Logger,
    multi: MultiProgress,
    with_target: bool,
}

impl IndicatifLogger {
    pub fn new(inner: env_logger::Logger, multi: MultiProgress, with_target: bool) -> Self {
        Self {
            inner,
            multi,
            with_target,
        }
    }
}

impl log::Log for IndicatifLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if self.inner.enabled(record.metadata()) {
            let line = format_line(record, true, self.with_target);
            self.multi.suspend(|| eprintln!("{line}"));
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Initialize logging once per process. `RUST_LOG` overrides the default filter.
///
/// With `multi` (TTY mode) lines are colored and routed around spinners;
/// otherwise they are plain `[LEVEL] message` lines. `debug` also shows the
/// emitting module.
pub fn init_logging(quiet: bool, debug: bool, multi: Option<&MultiProgress>) {
    use std::io::Write;

    let filter = default_filter(quiet, debug);
    let env = env_logger::Env::default().default_filter_or(filter);

    if let Some(multi) = multi {
        let logger = env_logger::Builder::from_env(env).build();
        let max_level = logger.filter();
        let installed = log::set_boxed_logger(Box::new(IndicatifLogger::new(
            logger,
            multi.clone(),
            debug,
        )));
        if installed.is_ok() {
            log::set_max_level(max_level);
        }
    } else {
        let _ = env_logger::Builder::from_env(env)
            .target(env_logger::Target::Stderr)
            .format(move |buf, record| writeln!(buf, "{}", format_line(record, false, debug)))
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_scopes_verbosity_to_own_crates() {
        assert_eq!(
            default_filter(false, false),
            "warn,syncline=info,syncline_core=info,syncline_engine=info"
        );
        assert!(default_filter(true, false).ends_with("syncline_engine=warn"));
        assert!(default_filter(true, true).contains("syncline_core=debug"));
    }

    #[test]
    fn plain_labels_have_no_ansi() {
        let (pre, label, post) = level_style(log::Level::Warn, false);
        assert_eq!((pre, label, post), ("", "WARN ", ""));
    }

    #[test]
    fn short_target_keeps_last_segment() {
        assert_eq!(short_target("syncline_engine::paginator"), "paginator");
        assert_eq!(short_target("syncline"), "syncline");
    }

    #[test]
    fn line_format() {
        let record = log::Record::builder()
            .args(format_args!("3 records"))
            .level(log::Level::Info)
            .target("syncline_engine::engine")
            .build();
        assert_eq!(format_line(&record, false, false), "[INFO ] 3 records");
        assert_eq!(format_line(&record, false, true), "[INFO  engine] 3 records");
    }
}
