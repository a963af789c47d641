//! Logging setup for the daemon and CLI.
//!
//! Binaries call [`init_journald_or_stdout`] once at startup. Library code
//! pulls the level macros in with `use crate::tracing::prelude::*`.

use std::env;
use std::fmt;

use time::OffsetDateTime;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{format::Writer, time::FormatTime},
    prelude::*,
};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

use prelude::*;

const CRATE_TARGET_PREFIX: &str = "whatsminer_monitor::";

/// Install the global subscriber.
///
/// Under systemd (`JOURNAL_STREAM` set) events go to journald, otherwise to
/// stdout filtered by `RUST_LOG` with INFO as the default level.
pub fn init_journald_or_stdout() {
    if env::var("JOURNAL_STREAM").is_ok() {
        match tracing_journald::layer() {
            Ok(layer) => tracing_subscriber::registry().with(layer).init(),
            Err(e) => {
                use_stdout();
                error!(error = %e, "Failed to initialize journald logging, using stdout");
            }
        }
    } else {
        use_stdout();
    }
}

fn use_stdout() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(LocalTimer)
                .fmt_fields(tracing_subscriber::fmt::format::DefaultFields::new())
                .event_format(CompactFormatter),
        )
        .init();
}

/// One event per line: time, level, short target, message, then fields.
struct CompactFormatter;

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    fields: Vec<(&'static str, String)>,
}

impl tracing::field::Visit for FieldCollector {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.push((field.name(), value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        } else {
            self.fields.push((field.name(), format!("{value:?}")));
        }
    }
}

fn short_target(target: &str) -> &str {
    target.strip_prefix(CRATE_TARGET_PREFIX).unwrap_or(target)
}

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for CompactFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let mut visitor = FieldCollector::default();
        event.record(&mut visitor);

        LocalTimer.format_time(&mut writer)?;

        let (color, level) = match *event.metadata().level() {
            tracing::Level::ERROR => ("\x1b[31m", "ERROR"),
            tracing::Level::WARN => ("\x1b[33m", "WARN "),
            tracing::Level::INFO => ("\x1b[32m", "INFO "),
            tracing::Level::DEBUG => ("\x1b[34m", "DEBUG"),
            tracing::Level::TRACE => ("\x1b[35m", "TRACE"),
        };
        write!(
            writer,
            " {color}{level}\x1b[0m {}: ",
            short_target(event.metadata().target())
        )?;

        if let Some(message) = &visitor.message {
            write!(writer, "{message}")?;
        }
        for (key, value) in &visitor.fields {
            write!(writer, " \x1b[90m{key}={value}\x1b[0m")?;
        }
        writeln!(writer)
    }
}

/// Local wall-clock time to the second.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let stamp = now
            .format(time::macros::format_description!(
                "[hour]:[minute]:[second]"
            ))
            .map_err(|_| fmt::Error)?;
        write!(w, "{stamp}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_own_crate_prefix_only() {
        assert_eq!(short_target("whatsminer_monitor::coordinator"), "coordinator");
        assert_eq!(short_target("tokio::net"), "tokio::net");
    }
}
