use std::{
    collections::HashMap,
    fs::OpenOptions,
    path::PathBuf,
};
use nu_ansi_term::{Color, Style};
use serde::Deserialize;
use termcolor::ColorChoice;
use tracing::{field::Visit, Level};
use tracing_log::NormalizeEvent;
use tracing_subscriber::{
    filter::{FilterFn, LevelFilter},
    fmt::FormatEvent,
    prelude::*,
};

use crate::{prelude::*, args::Args};


#[derive(Debug, confique::Config)]
pub(crate) struct LogConfig {
    /// Specifies what log messages to emit, based on the module path and log level.
    ///
    /// This is a map where the key specifies a module path prefix, and the
    /// value specifies a minimum log level. For each log message, the map
    /// entry with the longest prefix matching the log's module path is chosen.
    /// If no such entry exists, the log is not emitted. Otherwise, that
    /// entry's level is used to check whether the log message should be
    /// emitted.
    ///
    /// Take the following example: it only allows ≥"info" logs from Agora
    /// generally, but also ≥"trace" messages from the `db` submodule. But it
    /// completely disables all logs from `agora::db::tx`. Finally, it also
    /// enables ≥"debug" messages from one of Agora's dependencies, the HTTP
    /// library `hyper`.
    ///
    ///    [log]
    ///    filters.agora = "info"
    ///    filters."agora::db" = "trace"
    ///    filters."agora::db::tx" = "off"
    ///    filters.hyper = "debug"
    #[config(default = { "agora": "debug" })]
    pub(crate) filters: Filters,

    /// If this is set, log messages are also written to this file. The string
    /// `${cmd}` in this value is replaced by the subcommand name of the Agora
    /// process, e.g. `serve` or `db`. Example: "/var/log/agora-${cmd}.log".
    pub(crate) file: Option<PathBuf>,

    /// If this is set to `false`, log messages are not written to stdout.
    #[config(default = true)]
    pub(crate) stdout: bool,

    /// If set to `true`, HTTP headers of each incoming request are logged
    /// (with 'trace' level).
    #[config(default = false)]
    pub(crate) log_http_headers: bool,
}

#[derive(Debug, Deserialize)]
#[serde(try_from = "HashMap<String, String>")]
pub(crate) struct Filters(HashMap<String, LevelFilter>);

impl TryFrom<HashMap<String, String>> for Filters {
    type Error = String;
    fn try_from(value: HashMap<String, String>) -> Result<Self, Self::Error> {
        value.into_iter()
            .map(|(target_prefix, level)| {
                let level = parse_level_filter(&level)?;
                Ok((target_prefix, level))
            })
            .collect::<Result<_, _>>()
            .map(Self)
    }
}

fn parse_level_filter(s: &str) -> Result<LevelFilter, String> {
    match s {
        "off" => Ok(LevelFilter::OFF),
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" => Ok(LevelFilter::WARN),
        "error" => Ok(LevelFilter::ERROR),
        other => Err(format!("invalid log level '{other}'")),
    }
}

/// Installs our own logger globally. Must only be called once!
pub(crate) fn init(config: &LogConfig, args: &Args, cmd: &str) -> Result<()> {
    let filter = {
        let filters = config.filters.0.clone();
        let max_level = filters.values().max().copied().unwrap_or(LevelFilter::OFF);
        let filter = FilterFn::new(move |metadata| {
            // If there are many filters, it might be worth to build an extra
            // prefix data structure, but in practice we only expect very few
            // entries.
            filters.iter()
                .filter(|(target_prefix, _)| metadata.target().starts_with(*target_prefix))
                .max_by_key(|(target_prefix, _)| target_prefix.len())
                .map(|(_, level_filter)| metadata.level() <= level_filter)
                .unwrap_or(false)
        });
        filter.with_max_level_hint(max_level)
    };

    macro_rules! subscriber {
        ($writer:expr) => {
            tracing_subscriber::fmt::layer()
                .event_format(EventFormatter(args.stdout_color()))
                .with_writer($writer)
        };
    }

    let stdout_output = if config.stdout {
        Some(subscriber!(std::io::stdout))
    } else {
        None
    };

    let file_output = config.file.as_ref()
        .map(|path| -> Result<std::fs::File> {
            use std::io::Write;

            let new_path = path.to_str()
                .ok_or_else(|| anyhow!("log file path is not valid UTF-8"))?
                .replace("${cmd}", cmd);

            let mut file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(new_path)
                .with_context(|| format!("failed to open/create log file '{}'", path.display()))?;

            // Add an empty line separator to see process restarts easier.
            file.write_all(b"\n").context("could not write to log file")?;

            Ok(file)
        })
        .transpose()?
        .map(|file| subscriber!(file).with_ansi(false));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_output)
        .with(stdout_output)
        .init();

    Ok(())
}

type TracingWriter<'a> = tracing_subscriber::fmt::format::Writer<'a>;

#[derive(Clone, Copy)]
struct EventFormatter(ColorChoice);

impl<S, N> FormatEvent<S, N> for EventFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: TracingWriter<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        use std::fmt::Write as _;

        let use_ansi = self.0 == ColorChoice::Always
            || (writer.has_ansi_escapes() && self.0 != ColorChoice::Never);

        // Helper macro to conditionally emit ANSI control codes.
        macro_rules! wr {
            ($style:expr, $fmt:literal $($args:tt)*) => {{
                let style: Style = $style;
                if use_ansi {
                    write!(writer, "{}", style.prefix())?;
                }
                write!(writer, $fmt $($args)*)?;
                if use_ansi {
                    write!(writer, "{}", style.suffix())?;
                }
            }};
        }

        // Normalize metadata of log events (e.g. those forwarded from `log`).
        let normalized_metadata = event.normalized_metadata();
        let metadata = normalized_metadata.as_ref().unwrap_or(event.metadata());

        let dim_style = Style::new().dimmed();
        let level_style = match *metadata.level() {
            Level::ERROR => Style::new().fg(Color::Red).bold(),
            Level::WARN => Style::new().fg(Color::Yellow).bold(),
            Level::INFO => Style::new().fg(Color::Green),
            Level::DEBUG => Style::new().fg(Color::Blue),
            Level::TRACE => Style::new().fg(Color::Magenta),
        };
        let body_style = match *metadata.level() {
            Level::ERROR => Style::new().fg(Color::Red),
            Level::WARN => Style::new().fg(Color::Yellow),
            Level::INFO => Style::new(),
            Level::DEBUG => Style::new().dimmed(),
            Level::TRACE => Style::new().fg(Color::DarkGray),
        };

        // Print time, level and target.
        wr!(dim_style, "{} ", chrono::Local::now().format("%Y-%m-%d %H:%M:%S.%3f"));
        wr!(level_style, "{:5}", metadata.level());
        wr!(dim_style, " {} >  ", metadata.target());

        // Gather the message and all remaining fields into one string. We keep
        // this deliberately simple: the message first, then `key=value` pairs
        // separated by spaces.
        struct Collector {
            message: String,
            fields: String,
        }

        impl Visit for Collector {
            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                use std::fmt::Write;

                let name = field.name();
                if name == "message" {
                    write!(self.message, "{value:?}").unwrap();
                } else if !name.starts_with("log.") {
                    if !self.fields.is_empty() {
                        self.fields.push(' ');
                    }
                    write!(self.fields, "{name}={value:?}").unwrap();
                }
            }
        }

        let mut collector = Collector {
            message: String::new(),
            fields: String::new(),
        };
        event.record(&mut collector);

        wr!(body_style, "{}", collector.message);
        if !collector.fields.is_empty() {
            if !collector.message.is_empty() {
                wr!(level_style, " ~~ ");
            }
            wr!(body_style.italic(), "{}", collector.fields);
        }

        writeln!(writer)
    }
}


#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use tracing_subscriber::filter::LevelFilter;
    use super::Filters;

    #[test]
    fn parse_filters() {
        let map = HashMap::from([
            ("agora".to_owned(), "info".to_owned()),
            ("agora::db".to_owned(), "trace".to_owned()),
            ("hyper".to_owned(), "off".to_owned()),
        ]);
        let filters = Filters::try_from(map).unwrap();
        assert_eq!(filters.0["agora"], LevelFilter::INFO);
        assert_eq!(filters.0["agora::db"], LevelFilter::TRACE);
        assert_eq!(filters.0["hyper"], LevelFilter::OFF);
    }

    #[test]
    fn parse_filters_invalid_level() {
        let map = HashMap::from([("agora".to_owned(), "verbose".to_owned())]);
        assert!(Filters::try_from(map).is_err());
    }
}
