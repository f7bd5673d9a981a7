//! Host abstraction - all I/O the core ever performs.
//!
//! The core has no I/O of its own: the loader is driven by a
//! [`CompilerHost`] that supplies file bytes, path metadata, and the
//! reflected exports of external decorator modules. [`RealHost`] is the
//! `std::fs`-backed implementation used by the CLI; tests substitute an
//! in-memory host.
//!
//! External module handles are opaque: the only permitted operation from
//! the core is enumerating exports at load time.

use crate::checker::types::{DecoratorArgValue, TypeId};
use crate::program::{DecoratorContext, Program};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// =============================================================================
// Errors
// =============================================================================

/// Failure modes of host operations.
#[derive(Clone, Debug)]
pub enum HostError {
    /// The path does not exist.
    NotFound(PathBuf),
    /// The path exists but could not be read.
    Io { path: PathBuf, message: String },
    /// The host cannot perform the operation at all (e.g. loading a JS
    /// module without a JS engine).
    Unsupported(String),
    /// The host was cancelled; aborts compilation, preserving diagnostics.
    Cancelled,
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::NotFound(path) => write!(f, "file not found: {}", path.display()),
            HostError::Io { path, message } => {
                write!(f, "io error reading {}: {}", path.display(), message)
            }
            HostError::Unsupported(message) => write!(f, "unsupported: {}", message),
            HostError::Cancelled => write!(f, "cancelled"),
        }
    }
}

// =============================================================================
// Host data
// =============================================================================

/// Result of [`CompilerHost::read_file`].
#[derive(Clone, Debug)]
pub struct SourceText {
    pub path: PathBuf,
    pub text: String,
}

/// Result of [`CompilerHost::stat`].
#[derive(Clone, Copy, Debug, Default)]
pub struct FileStat {
    pub is_file: bool,
    pub is_directory: bool,
}

/// A structured log entry sent to the host's log sink.
#[derive(Clone, Debug)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

// =============================================================================
// External module exports
// =============================================================================

/// A decorator implementation from an external module. Invoked once per
/// fully-instantiated target with the program context, the target type,
/// and the evaluated arguments. Decorators may not return values; an `Err`
/// aborts the current declaration's checking.
pub type DecoratorFn = Arc<
    dyn Fn(&mut DecoratorContext<'_>, TypeId, &[DecoratorArgValue]) -> Result<(), String>
        + Send
        + Sync,
>;

/// A `$onValidate` / `$onEmit` callback, invoked with the completed program.
pub type ProgramCallback = Arc<dyn Fn(&mut Program) + Send + Sync>;

/// One export of an external module, as reflected by the host.
#[derive(Clone)]
pub enum ExportValue {
    /// A function whose key begins with `$`: a decorator handle, with an
    /// optional per-function namespace attribute.
    Decorator {
        implementation: DecoratorFn,
        namespace: Option<String>,
    },
    /// A `$onValidate`/`$onEmit` callback.
    Callback(ProgramCallback),
    /// A string export; `namespace` is read as a dotted namespace path.
    Str(String),
    /// Anything else; opaque to the core.
    Opaque,
}

impl fmt::Debug for ExportValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportValue::Decorator { namespace, .. } => {
                write!(f, "Decorator(namespace: {:?})", namespace)
            }
            ExportValue::Callback(_) => write!(f, "Callback"),
            ExportValue::Str(value) => write!(f, "Str({:?})", value),
            ExportValue::Opaque => write!(f, "Opaque"),
        }
    }
}

/// The flat export map of an external module, in the host's enumeration
/// order (deterministic).
#[derive(Clone, Debug, Default)]
pub struct ModuleExports {
    pub entries: Vec<(String, ExportValue)>,
}

// =============================================================================
// CompilerHost
// =============================================================================

/// Everything the compiler core needs from its environment.
pub trait CompilerHost {
    /// Read a file's text. Fails with `NotFound` or `Io`.
    fn read_file(&self, path: &Path) -> Result<SourceText, HostError>;

    /// Query a path's kind.
    fn stat(&self, path: &Path) -> Result<FileStat, HostError>;

    /// Resolve symlinks; identity-preserving otherwise.
    fn realpath(&self, path: &Path) -> Result<PathBuf, HostError>;

    /// Reflect the exports of a JS/MJS module.
    fn get_external_module_exports(&self, path: &Path) -> Result<ModuleExports, HostError>;

    /// Standard-library search paths.
    fn get_lib_dirs(&self) -> Vec<PathBuf>;

    /// Write an output file; used only by emitters.
    fn write_file(&self, path: &Path, content: &str) -> Result<(), HostError>;

    /// Make a path absolute without touching the filesystem.
    fn resolve_absolute_path(&self, path: &Path) -> PathBuf;

    /// Receive a structured log entry. The default forwards to `tracing`.
    fn log(&self, entry: LogEntry) {
        match entry.level {
            LogLevel::Debug => tracing::debug!("{}", entry.message),
            LogLevel::Info => tracing::info!("{}", entry.message),
            LogLevel::Warn => tracing::warn!("{}", entry.message),
            LogLevel::Error => tracing::error!("{}", entry.message),
        }
    }
}

// =============================================================================
// RealHost
// =============================================================================

/// The `std::fs`-backed host used by the CLI.
///
/// It cannot reflect JS modules; compiling a program that imports one
/// through this host produces a diagnostic.
#[derive(Debug, Default)]
pub struct RealHost {
    lib_dirs: Vec<PathBuf>,
}

impl RealHost {
    pub fn new() -> RealHost {
        RealHost::default()
    }

    pub fn with_lib_dirs(lib_dirs: Vec<PathBuf>) -> RealHost {
        RealHost { lib_dirs }
    }
}

impl CompilerHost for RealHost {
    fn read_file(&self, path: &Path) -> Result<SourceText, HostError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(SourceText {
                path: path.to_path_buf(),
                text,
            }),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Err(HostError::NotFound(path.to_path_buf()))
            }
            Err(error) => Err(HostError::Io {
                path: path.to_path_buf(),
                message: error.to_string(),
            }),
        }
    }

    fn stat(&self, path: &Path) -> Result<FileStat, HostError> {
        match std::fs::metadata(path) {
            Ok(metadata) => Ok(FileStat {
                is_file: metadata.is_file(),
                is_directory: metadata.is_dir(),
            }),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Err(HostError::NotFound(path.to_path_buf()))
            }
            Err(error) => Err(HostError::Io {
                path: path.to_path_buf(),
                message: error.to_string(),
            }),
        }
    }

    fn realpath(&self, path: &Path) -> Result<PathBuf, HostError> {
        match std::fs::canonicalize(path) {
            Ok(resolved) => Ok(resolved),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Err(HostError::NotFound(path.to_path_buf()))
            }
            Err(error) => Err(HostError::Io {
                path: path.to_path_buf(),
                message: error.to_string(),
            }),
        }
    }

    fn get_external_module_exports(&self, path: &Path) -> Result<ModuleExports, HostError> {
        Err(HostError::Unsupported(format!(
            "cannot load external module {}: no JS engine in this host",
            path.display()
        )))
    }

    fn get_lib_dirs(&self) -> Vec<PathBuf> {
        self.lib_dirs.clone()
    }

    fn write_file(&self, path: &Path, content: &str) -> Result<(), HostError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| HostError::Io {
                path: parent.to_path_buf(),
                message: error.to_string(),
            })?;
        }
        std::fs::write(path, content).map_err(|error| HostError::Io {
            path: path.to_path_buf(),
            message: error.to_string(),
        })
    }

    fn resolve_absolute_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        }
    }
}
