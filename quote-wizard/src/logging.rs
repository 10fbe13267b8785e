//! Process-wide tracing setup for the wizard.
//!
//! Two layers share one reloadable level filter: a stdout layer that can be
//! muted, and a file layer that writes nowhere until a log file is chosen.

use std::fs::File;
use std::io::{self, IsTerminal, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use anyhow::{Context, Result, anyhow, bail};
use chrono::Local;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::{FmtContext, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, reload};

pub const DEFAULT_FILTER: &str = "info,quote_wizard=debug,quote_core=debug";

// ---------------------------------------------------------------------------
// Event format
// ---------------------------------------------------------------------------

/// `2025-04-25T10:15:00.123456+09:00  INFO store.rs:42 message key=value`
struct WizardFormat;

fn level_color(level: Level) -> &'static str {
    match level {
        Level::ERROR => "\x1b[1;31m",
        Level::WARN => "\x1b[1;33m",
        Level::INFO => "\x1b[1;32m",
        Level::DEBUG => "\x1b[1;34m",
        Level::TRACE => "\x1b[1;35m",
    }
}

impl<S, N> FormatEvent<S, N> for WizardFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let meta = event.metadata();
        let ansi = writer.has_ansi_escapes();
        let stamp = Local::now().format("%Y-%m-%dT%H:%M:%S%.6f%:z");
        let location = meta
            .file()
            .map(|f| f.rsplit(['/', '\\']).next().unwrap_or(f))
            .zip(meta.line());

        if ansi {
            write!(
                writer,
                "\x1b[2m{stamp}\x1b[0m {}{:>5}\x1b[0m ",
                level_color(*meta.level()),
                meta.level()
            )?;
            if let Some((file, line)) = location {
                write!(writer, "\x1b[36m{file}:{line}\x1b[0m ")?;
            }
        } else {
            write!(writer, "{stamp} {:>5} ", meta.level())?;
            if let Some((file, line)) = location {
                write!(writer, "{file}:{line} ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

// ---------------------------------------------------------------------------
// File sink
// ---------------------------------------------------------------------------

type SharedFile = Arc<Mutex<Option<File>>>;

fn lock_file(file: &SharedFile) -> MutexGuard<'_, Option<File>> {
    file.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Writer target that can be pointed at a file after startup. Records are
/// dropped while it is empty.
#[derive(Clone)]
struct FileSink(SharedFile);

struct FileSinkWriter<'a>(MutexGuard<'a, Option<File>>);

impl Write for FileSinkWriter<'_> {
    fn write(
        &mut self,
        buf: &[u8],
    ) -> io::Result<usize> {
        self.0.as_mut().map_or(Ok(buf.len()), |f| f.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.as_mut().map_or(Ok(()), |f| f.flush())
    }
}

impl<'a> MakeWriter<'a> for FileSink {
    type Writer = FileSinkWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        FileSinkWriter(lock_file(&self.0))
    }
}

// ---------------------------------------------------------------------------
// Runtime controls
// ---------------------------------------------------------------------------

type Reloader = Box<dyn Fn(EnvFilter) -> Result<()> + Send + Sync>;

struct Controls {
    level: Reloader,
    stdout: Reloader,
    file: SharedFile,
}

static CONTROLS: OnceLock<Controls> = OnceLock::new();

fn controls() -> Result<&'static Controls> {
    CONTROLS
        .get()
        .ok_or_else(|| anyhow!("logging not yet initialized"))
}

fn reloader<S>(handle: reload::Handle<EnvFilter, S>) -> Reloader
where
    S: Subscriber + Send + Sync + 'static,
{
    Box::new(move |filter| {
        handle
            .reload(filter)
            .map_err(|e| anyhow!("filter reload failed: {e}"))
    })
}

fn initial_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber. Later calls are ignored.
///
/// The level comes from `RUST_LOG`, falling back to [`DEFAULT_FILTER`].
/// Stdout is colored only when attached to a terminal.
pub fn init_default_logging() {
    let file: SharedFile = Arc::new(Mutex::new(None));

    let (level_layer, level_handle) = reload::Layer::new(initial_filter());
    let (stdout_gate, stdout_handle) = reload::Layer::new(EnvFilter::new("trace"));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .event_format(WizardFormat)
        .with_ansi(io::stdout().is_terminal())
        .with_filter(stdout_gate);

    let file_layer = tracing_subscriber::fmt::layer()
        .event_format(WizardFormat)
        .with_ansi(false)
        .with_writer(FileSink(file.clone()));

    let installed = tracing_subscriber::registry()
        .with(level_layer)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed {
        let _ = CONTROLS.set(Controls {
            level: reloader(level_handle),
            stdout: reloader(stdout_handle),
            file,
        });
    }
}

/// Replaces the level filter. Accepts a bare level or any `EnvFilter` directive.
pub fn set_log_level(directive: &str) -> Result<()> {
    let filter = EnvFilter::try_new(directive)
        .with_context(|| format!("invalid log level '{directive}'"))?;
    (controls()?.level)(filter)
}

/// Mutes or unmutes stdout. File output is unaffected.
pub fn set_stdout_enabled(enabled: bool) -> Result<()> {
    let gate = if enabled { "trace" } else { "off" };
    (controls()?.stdout)(EnvFilter::new(gate))
}

/// Appends log output to `path`, replacing any file already open.
pub fn enable_file_logging(path: &Path) -> Result<()> {
    let controls = controls()?;
    let file = File::options()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("cannot open log file '{}'", path.display()))?;

    *lock_file(&controls.file) = Some(file);
    Ok(())
}

pub fn disable_file_logging() -> Result<()> {
    let Some(controls) = CONTROLS.get() else {
        bail!("logging not yet initialized");
    };
    *lock_file(&controls.file) = None;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controls_report_missing_initialization() {
        if CONTROLS.get().is_some() {
            return;
        }
        assert!(set_stdout_enabled(false).is_err());
        assert!(disable_file_logging().is_err());
    }

    #[test]
    fn invalid_directive_is_rejected_before_reload() {
        assert!(set_log_level("quote_wizard=loud").is_err());
    }

    #[test]
    fn file_sink_discards_without_file() {
        let sink = FileSink(Arc::new(Mutex::new(None)));
        let mut writer = sink.make_writer();

        assert_eq!(writer.write(b"dropped").unwrap(), 7);
        writer.flush().unwrap();
    }

    #[test]
    fn file_sink_writes_once_pointed_at_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wizard.log");
        let file = File::create(&path).unwrap();
        let sink = FileSink(Arc::new(Mutex::new(Some(file))));

        {
            let mut writer = sink.make_writer();
            writer.write_all(b"hello\n").unwrap();
            writer.flush().unwrap();
        }

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\n");
    }
}
