//! Tracing subscriber setup
//!
//! Console output always goes to stderr because stdout carries MCP frames.
//! An optional file layer mirrors the same events without ANSI colors.

use crate::config::{LogFormat, LoggingConfig, RuntimeOptions};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber
///
/// Returns the path of the log file when file logging ended up enabled.
pub fn init(logging: &LoggingConfig, options: &RuntimeOptions, verbosity: u8) -> Option<PathBuf> {
    let level = effective_level(&logging.level, verbosity);

    let mut layers: Vec<BoxedLayer> = Vec::new();

    let stderr = fmt::layer().with_writer(std::io::stderr);
    layers.push(match logging.format {
        LogFormat::Json => stderr.json().boxed(),
        LogFormat::Pretty => stderr.boxed(),
    });

    let requested = if options.disable_file_log {
        None
    } else {
        options.log_file.clone().or_else(|| logging.file.clone())
    };

    let mut opened_path = None;
    if let Some(requested) = requested {
        match open_log_file(&requested) {
            Some((path, file)) => {
                let file_layer = fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file));
                layers.push(match logging.format {
                    LogFormat::Json => file_layer.json().boxed(),
                    LogFormat::Pretty => file_layer.boxed(),
                });
                opened_path = Some(path);
            }
            None => {
                eprintln!(
                    "proxmox-mcp: could not open log file {}, file logging disabled",
                    requested.display()
                );
            }
        }
    }

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init();

    opened_path
}

/// Level from config, raised by `-v` flags
pub fn effective_level(configured: &str, verbosity: u8) -> Level {
    match verbosity {
        0 => configured.parse().unwrap_or(Level::INFO),
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Candidate locations for a log file, in preference order
///
/// Relative paths resolve against the working directory, then the home
/// directory, then the temp dir. Absolute paths fall back to the temp dir
/// under the same file name.
pub fn candidate_paths(path: &Path) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if path.is_absolute() {
        candidates.push(path.to_path_buf());
    } else {
        if let Ok(cwd) = std::env::current_dir() {
            candidates.push(cwd.join(path));
        }
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(path));
        }
    }

    let file_name = path
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("proxmox_mcp.log"));
    candidates.push(std::env::temp_dir().join(file_name));

    candidates.dedup();
    candidates
}

/// Open the first candidate that accepts an append handle
pub fn open_log_file(path: &Path) -> Option<(PathBuf, File)> {
    candidate_paths(path).into_iter().find_map(|candidate| {
        if let Some(parent) = candidate.parent() {
            if !parent.as_os_str().is_empty() && std::fs::create_dir_all(parent).is_err() {
                return None;
            }
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
            .ok()
            .map(|file| (candidate, file))
    })
}
