use std::str::FromStr;

use tracing::metadata::LevelFilter;
use tracing_subscriber::EnvFilter;

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:expr),*) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg),*)
    }};
}

/// Log an internal lifecycle event (startup, shutdown, wiring).
#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::internal!(level = INFO, $($msg),*)
    };
}

/// Initialise the global tracing subscriber.
///
/// The level defaults to `INFO` (`TRACE` in debug builds) and can be
/// overridden through the `LOG_LEVEL` environment variable, which accepts
/// either a bare level or a full env-filter directive.
pub fn init() {
    let default = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    let filter = std::env::var("LOG_LEVEL").map_or_else(
        |_| EnvFilter::default().add_directive(default.into()),
        |level| {
            EnvFilter::from_str(&level).unwrap_or_else(|_| {
                eprintln!("Invalid log level specified {level}, defaulting to {default}");
                EnvFilter::default().add_directive(default.into())
            })
        },
    );

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
