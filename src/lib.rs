pub mod config;
pub mod discovery;
pub mod gateway;
pub mod probe;
pub mod registry;
pub mod server;

#[cfg(test)]
mod test_support;

use std::fs::{File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

pub use config::GatewayConfig;
pub use gateway::Gateway;
pub use registry::RegistryStore;

/// Default `EnvFilter` directive when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "mcp_gateway=info,warn";

/// Set to `json` for JSON log lines.
pub const ENV_LOG_FORMAT: &str = "MCP_LOG_FORMAT";

/// When set, logs go to `<dir>/gateway.log` instead of stderr.
pub const ENV_LOG_DIR: &str = "MCP_LOG_DIR";

const LOG_FILE_NAME: &str = "gateway.log";
const LOG_FILES_KEPT: u32 = 3;

/// Return the platform-standard data directory for the gateway.
///
/// - macOS: `~/Library/Application Support/mcp-gateway/`
/// - Windows: `{FOLDERID_RoamingAppData}\mcp-gateway\`
/// - Linux: `$XDG_DATA_HOME/mcp-gateway/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.mcp-gateway/` only if none of the above can be resolved.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("mcp-gateway");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mcp-gateway")
}

/// Initialize the tracing subscriber.
///
/// Filter comes from `RUST_LOG` (default [`DEFAULT_LOG_FILTER`]). Output is
/// stderr unless `MCP_LOG_DIR` names a directory, in which case existing
/// logs are rotated and a fresh line-flushed `gateway.log` is opened there.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var(ENV_LOG_FORMAT)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let log_file = std::env::var_os(ENV_LOG_DIR)
        .map(PathBuf::from)
        .and_then(|dir| match LogFile::open_rotated(&dir, LOG_FILES_KEPT) {
            Ok(log) => Some(log),
            Err(e) => {
                eprintln!("cannot open log file in {}: {e}; logging to stderr", dir.display());
                None
            }
        });

    let builder = fmt().with_env_filter(filter).with_target(true);
    let _ = match (json, log_file) {
        (true, Some(writer)) => builder.json().with_ansi(false).with_writer(writer).try_init(),
        (true, None) => builder.json().with_writer(std::io::stderr).try_init(),
        (false, Some(writer)) => builder.with_ansi(false).with_writer(writer).try_init(),
        (false, None) => builder.with_writer(std::io::stderr).try_init(),
    };
}

/// Log file shared by every tracing writer.
///
/// Opening rotates `gateway.log` to `gateway.log.1` and so on, dropping the
/// file past `keep`. `LineWriter` pushes each completed line to disk, so a
/// killed process loses at most a partial line.
#[derive(Clone)]
struct LogFile(Arc<Mutex<LineWriter<File>>>);

impl LogFile {
    fn open_rotated(dir: &Path, keep: u32) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let numbered = |n: u32| dir.join(format!("{LOG_FILE_NAME}.{n}"));

        match std::fs::remove_file(numbered(keep)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
            _ => {}
        }
        for n in (1..keep).rev() {
            rename_if_exists(&numbered(n), &numbered(n + 1))?;
        }
        let current = dir.join(LOG_FILE_NAME);
        rename_if_exists(&current, &numbered(1))?;

        let file = OpenOptions::new().create(true).append(true).open(&current)?;
        Ok(Self(Arc::new(Mutex::new(LineWriter::new(file)))))
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, LineWriter<File>>> {
        self.0
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))
    }
}

fn rename_if_exists(from: &Path, to: &Path) -> io::Result<()> {
    match std::fs::rename(from, to) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

impl io::Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock()?.flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogFile {
    type Writer = LogFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_dir_is_named() {
        let dir = data_dir();
        let name = dir.file_name().unwrap().to_string_lossy().to_string();
        assert!(name == "mcp-gateway" || name == ".mcp-gateway");
    }

    #[test]
    fn test_open_rotated_keeps_last_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        for round in 0..5 {
            let mut log = LogFile::open_rotated(tmp.path(), 3).unwrap();
            writeln!(log, "round {round}").unwrap();
        }
        let read = |name: &str| std::fs::read_to_string(tmp.path().join(name)).unwrap();
        assert_eq!(read("gateway.log"), "round 4\n");
        assert_eq!(read("gateway.log.1"), "round 3\n");
        assert_eq!(read("gateway.log.3"), "round 1\n");
        assert!(!tmp.path().join("gateway.log.4").exists());
    }

    #[test]
    fn test_completed_lines_reach_disk() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut log = LogFile::open_rotated(tmp.path(), 3).unwrap();
        log.write_all(b"hello\npart").unwrap();
        let content = std::fs::read_to_string(tmp.path().join(LOG_FILE_NAME)).unwrap();
        assert_eq!(content, "hello\n");
    }

    #[test]
    fn test_open_rotated_fails_on_file_as_dir() {
        let tmp = tempfile::TempDir::new().unwrap();
        let not_a_dir = tmp.path().join("plain");
        std::fs::write(&not_a_dir, "x").unwrap();
        assert!(LogFile::open_rotated(&not_a_dir, 3).is_err());
    }
}
