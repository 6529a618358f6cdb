//! Log sink: console plus the configured log file, filtered at one level.
//!
//! The level comes from configuration only; `RUST_LOG` is not consulted.
//! Records emitted through the `log` facade (the sync engine) are bridged
//! into the same subscriber.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use foldersync_core::LogLevel;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. A second call is a no-op.
pub fn init(log_file: &Path, level: LogLevel) {
    let console_layer = tracing_subscriber::fmt::layer().with_target(false);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(AppendingFile::new(log_file));

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new(level.as_str()))
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

/// Opens the log file in append mode for every event, so a rotated file is
/// picked up without coordination with the rotation task.
#[derive(Debug, Clone)]
pub struct AppendingFile {
    path: Arc<PathBuf>,
}

impl AppendingFile {
    pub fn new(path: &Path) -> Self {
        Self {
            path: Arc::new(path.to_path_buf()),
        }
    }
}

impl<'a> MakeWriter<'a> for AppendingFile {
    type Writer = LogFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        match OpenOptions::new().create(true).append(true).open(&*self.path) {
            Ok(file) => LogFileWriter::File(file),
            Err(_) => LogFileWriter::Unavailable,
        }
    }
}

/// Writer handed to the fmt layer; drops output if the file cannot be opened.
#[derive(Debug)]
pub enum LogFileWriter {
    File(File),
    Unavailable,
}

impl Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            LogFileWriter::File(file) => file.write(buf),
            LogFileWriter::Unavailable => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            LogFileWriter::File(file) => file.flush(),
            LogFileWriter::Unavailable => Ok(()),
        }
    }
}
