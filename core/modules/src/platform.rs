//! Platform facade (C3): the minimal capability set the module subsystem
//! needs from its embedder, grounded on `jjs-core/api/jjs-platform.c` and
//! the `boa_runtime` pattern of a swappable, `std`-backed default behind a
//! trait object.

use crate::error::{ModuleError, ModuleResult};
use crate::scratch::ReadBufferPool;
use std::fs::{self, File};
use std::io::Read as _;
use std::path::{Path, PathBuf};

/// How [`PlatformFacade::read_file`] should interpret the bytes it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadEncoding {
    /// Return raw bytes (used for snapshots and other binary formats).
    None,
    /// Validate and return a UTF-8 string.
    Utf8,
    /// Validate and return a CESU-8 string.
    Cesu8,
}

/// The bytes or string produced by [`PlatformFacade::read_file`].
#[derive(Debug, Clone)]
pub enum FileContents {
    /// Raw bytes, for [`ReadEncoding::None`].
    Bytes(Vec<u8>),
    /// A decoded string, for [`ReadEncoding::Utf8`]/[`ReadEncoding::Cesu8`].
    Text(String),
}

/// Capabilities the module subsystem requires from its host. Every method
/// has a default, `std`-backed implementation on [`StdPlatform`]; embedders
/// that need sandboxing, virtual filesystems, or WASI-style hosts implement
/// this trait directly instead.
pub trait PlatformFacade {
    /// The current working directory, as an absolute path.
    ///
    /// # Errors
    /// Returns [`ModuleError::Common`] with `"platform cwd api not installed"`
    /// if the capability is unavailable.
    fn cwd(&self) -> ModuleResult<PathBuf>;

    /// Resolves symlinks and `.`/`..` components in `path`.
    ///
    /// # Errors
    /// Returns [`ModuleError::Common`] with
    /// `"platform api 'path_realpath' not installed"` if unavailable, or if
    /// the path does not exist.
    fn realpath(&self, path: &Path) -> ModuleResult<PathBuf>;

    /// Reads `path`, interpreting the bytes per `encoding`.
    ///
    /// # Errors
    /// Returns [`ModuleError::Common`] on I/O failure or invalid encoding.
    fn read_file(&self, path: &Path, encoding: ReadEncoding) -> ModuleResult<FileContents>;

    /// Writes `message` to the host's standard output stream.
    fn write_stdout(&self, message: &str);

    /// Writes `message` to the host's standard error stream.
    fn write_stderr(&self, message: &str);

    /// Called on an unrecoverable invariant violation. Does not return.
    fn fatal(&self, code: i32) -> ! {
        log::error!("fatal: engine invariant violated (code {code})");
        std::process::abort();
    }
}

/// The default, `std`-backed platform facade. Holds its own [`ReadBufferPool`]
/// so repeated [`PlatformFacade::read_file`] calls (one per resolved module,
/// typically) recycle the same handful of `Vec<u8>` buffers instead of
/// allocating a fresh one on every read.
#[derive(Debug, Default)]
pub struct StdPlatform {
    pool: ReadBufferPool,
}

impl StdPlatform {
    /// Creates a platform facade with an empty scratch pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlatformFacade for StdPlatform {
    fn cwd(&self) -> ModuleResult<PathBuf> {
        std::env::current_dir()
            .map_err(|e| ModuleError::common_error(format!("platform cwd api not installed: {e}")))
    }

    fn realpath(&self, path: &Path) -> ModuleResult<PathBuf> {
        fs::canonicalize(path).map_err(|e| {
            ModuleError::common_error(format!(
                "platform api 'path_realpath' not installed: {e}"
            ))
        })
    }

    fn read_file(&self, path: &Path, encoding: ReadEncoding) -> ModuleResult<FileContents> {
        let mut guard = self.pool.acquire();
        let mut file = File::open(path)
            .map_err(|e| ModuleError::common_error(format!("{}: {e}", path.display())))?;
        file.read_to_end(guard.as_mut())
            .map_err(|e| ModuleError::common_error(format!("{}: {e}", path.display())))?;

        match encoding {
            ReadEncoding::None => Ok(FileContents::Bytes(guard.into_owned())),
            ReadEncoding::Utf8 | ReadEncoding::Cesu8 => {
                let bytes = guard.into_owned();
                String::from_utf8(bytes)
                    .map(FileContents::Text)
                    .map_err(|e| ModuleError::common_error(format!("{}: {e}", path.display())))
            }
        }
    }

    fn write_stdout(&self, message: &str) {
        print!("{message}");
    }

    fn write_stderr(&self, message: &str) {
        eprint!("{message}");
    }
}
