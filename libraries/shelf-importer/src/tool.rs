//! External tagging tool invocation
//!
//! [`BatchImporter`] is the seam between the coordinator and the tool. The
//! real implementation, [`BeetImporter`], runs `beet` (or a compatible
//! program) as a subprocess:
//!
//! - quiet batch: `<tool> import --quiet -l <log> <albums...>`
//! - interactive batch: `<tool> import -l <log> <albums...>`
//! - removal: `<tool> rm <query words...>`
//!
//! The tool's exit status alone is not trusted. Any output line starting with
//! `error` or `traceback` fails the whole batch even after a clean exit.
//!
//! Only quiet batches are bounded by the run timeout. Interactive batches and
//! removals wait on the operator and run until the tool exits.

use crate::log_parser::SkipLogParser;
use crate::scanner::validate_album_id;
use crate::ToolError;
use async_trait::async_trait;
use shelf_core::{AlbumId, ShelfConfig};
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

const LOG_FILE: &str = "import.log";

/// Runs batches of albums through the external tool
#[async_trait]
pub trait BatchImporter: Send + Sync {
    /// Import without interaction, returning the albums the tool skipped
    async fn import_batch(&self, albums: &[AlbumId]) -> Result<Vec<AlbumId>, ToolError>;

    /// Import with the operator answering the tool's prompts
    async fn import_batch_interactive(&self, albums: &[AlbumId]) -> Result<(), ToolError>;

    /// Remove library entries matching `query`
    async fn remove(&self, query: &str) -> Result<(), ToolError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Quiet,
    Interactive,
}

/// Output of one finished tool run
struct Captured {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

/// [`BatchImporter`] backed by the `beet` command line
#[derive(Debug, Clone)]
pub struct BeetImporter {
    program: String,
    albums_root: PathBuf,
    scratch_dir: PathBuf,
    timeout: Duration,
    parser: SkipLogParser,
}

impl BeetImporter {
    /// Relative directories are resolved against the current directory, since
    /// the tool logs skipped albums by absolute path
    pub fn new(
        program: impl Into<String>,
        albums_root: impl AsRef<Path>,
        scratch_dir: impl AsRef<Path>,
        timeout: Duration,
    ) -> Result<Self, ToolError> {
        let albums_root = std::path::absolute(albums_root)?;
        Ok(Self {
            program: program.into(),
            parser: SkipLogParser::new(&albums_root),
            albums_root,
            scratch_dir: std::path::absolute(scratch_dir)?,
            timeout,
        })
    }

    pub fn from_config(config: &ShelfConfig) -> Result<Self, ToolError> {
        Self::new(
            config.tool.clone(),
            &config.albums_dir,
            config.scratch_dir(),
            config.import_timeout(),
        )
    }

    /// Absolute albums root the tool is pointed at
    pub fn albums_root(&self) -> &Path {
        &self.albums_root
    }

    /// Path of the per-run log the tool writes
    pub fn log_path(&self) -> PathBuf {
        self.scratch_dir.join(LOG_FILE)
    }

    async fn run_import(&self, albums: &[AlbumId], mode: Mode) -> Result<Vec<AlbumId>, ToolError> {
        let log_path = self.log_path();
        prepare_log(&log_path).await?;

        let result = self.run_import_inner(albums, mode, &log_path).await;

        if let Err(e) = remove_if_exists(&log_path).await {
            tracing::warn!("Failed to remove import log {}: {}", log_path.display(), e);
        }

        result
    }

    async fn run_import_inner(
        &self,
        albums: &[AlbumId],
        mode: Mode,
        log_path: &Path,
    ) -> Result<Vec<AlbumId>, ToolError> {
        let mut args: Vec<OsString> = vec!["import".into()];
        if mode == Mode::Quiet {
            args.push("--quiet".into());
        }
        args.push("-l".into());
        args.push(log_path.into());
        args.extend(albums.iter().map(|id| self.albums_root.join(id.as_str()).into()));

        tracing::info!(
            "Running {} import on {} album(s){}",
            self.program,
            albums.len(),
            if mode == Mode::Interactive { " interactively" } else { "" }
        );

        let captured = self.run_captured(&args, mode).await?;
        let stdout = String::from_utf8_lossy(&captured.stdout);
        let stderr = String::from_utf8_lossy(&captured.stderr);

        if mode == Mode::Quiet {
            for line in stdout.lines().chain(stderr.lines()) {
                tracing::debug!("{}: {}", self.program, line);
            }
        }

        if let Some(line) = first_error_line(&stderr).or_else(|| first_error_line(&stdout)) {
            return Err(ToolError::BatchFailure {
                failed: albums.to_vec(),
                detail: line.to_string(),
            });
        }

        if !captured.status.success() {
            return Err(ToolError::RunFailure {
                status: captured.status.to_string(),
                detail: last_line(&stderr).unwrap_or_default().to_string(),
            });
        }

        match mode {
            Mode::Quiet => self.parser.parse_skipped(log_path).await,
            Mode::Interactive => Ok(Vec::new()),
        }
    }

    async fn run_captured(&self, args: &[OsString], mode: Mode) -> Result<Captured, ToolError> {
        let stdin = match mode {
            Mode::Quiet => Stdio::null(),
            Mode::Interactive => Stdio::inherit(),
        };

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ToolError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let echo = mode == Mode::Interactive;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("child stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("child stderr was not captured"))?;

        let stdout_task = tokio::spawn(capture(stdout, echo.then(tokio::io::stdout)));
        let stderr_task = tokio::spawn(capture(stderr, echo.then(tokio::io::stderr)));

        let status = match mode {
            Mode::Interactive => child.wait().await?,
            Mode::Quiet => match tokio::time::timeout(self.timeout, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    tracing::warn!(
                        "{} did not finish within {}s, killing it",
                        self.program,
                        self.timeout.as_secs()
                    );
                    if let Err(e) = child.kill().await {
                        tracing::warn!("Failed to kill {}: {}", self.program, e);
                    }
                    stdout_task.abort();
                    stderr_task.abort();
                    return Err(ToolError::Timeout(self.timeout));
                }
            },
        };

        Ok(Captured {
            status,
            stdout: join_capture(stdout_task).await?,
            stderr: join_capture(stderr_task).await?,
        })
    }
}

#[async_trait]
impl BatchImporter for BeetImporter {
    async fn import_batch(&self, albums: &[AlbumId]) -> Result<Vec<AlbumId>, ToolError> {
        check_album_ids(albums)?;
        if albums.is_empty() {
            return Ok(Vec::new());
        }
        self.run_import(albums, Mode::Quiet).await
    }

    async fn import_batch_interactive(&self, albums: &[AlbumId]) -> Result<(), ToolError> {
        check_album_ids(albums)?;
        if albums.is_empty() {
            return Ok(());
        }
        self.run_import(albums, Mode::Interactive).await.map(|_| ())
    }

    async fn remove(&self, query: &str) -> Result<(), ToolError> {
        let words: Vec<&str> = query.split_whitespace().collect();
        if words.is_empty() {
            return Err(ToolError::InvalidInput("removal query is empty".to_string()));
        }

        tracing::info!("Running {} rm {}", self.program, words.join(" "));

        // The tool asks for confirmation on the inherited terminal
        let status = Command::new(&self.program)
            .arg("rm")
            .args(&words)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|source| ToolError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(ToolError::RunFailure {
                status: status.to_string(),
                detail: format!("{} rm failed", self.program),
            });
        }

        Ok(())
    }
}

fn check_album_ids(albums: &[AlbumId]) -> Result<(), ToolError> {
    for id in albums {
        validate_album_id(id).map_err(|_| {
            ToolError::InvalidInput(format!(
                "album ids must be plain names under the albums root: {id:?}"
            ))
        })?;
    }
    Ok(())
}

/// First line that marks the batch as failed
pub fn first_error_line(output: &str) -> Option<&str> {
    output.lines().map(str::trim).find(|line| {
        let lower = line.to_lowercase();
        lower.starts_with("error") || lower.starts_with("traceback")
    })
}

fn last_line(output: &str) -> Option<&str> {
    output.lines().rev().map(str::trim).find(|l| !l.is_empty())
}

/// Collect everything from `reader`, copying it to `echo` as it arrives
async fn capture<R, W>(mut reader: R, mut echo: Option<W>) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut captured = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        captured.extend_from_slice(&buf[..n]);
        if let Some(out) = echo.as_mut() {
            out.write_all(&buf[..n]).await?;
            out.flush().await?;
        }
    }
    Ok(captured)
}

async fn join_capture(task: JoinHandle<std::io::Result<Vec<u8>>>) -> Result<Vec<u8>, ToolError> {
    task.await
        .map_err(|e| ToolError::Io(std::io::Error::other(e)))?
        .map_err(ToolError::Io)
}

async fn prepare_log(log_path: &Path) -> Result<(), ToolError> {
    if let Some(dir) = log_path.parent() {
        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o700);
        builder.create(dir).await?;
    }
    remove_if_exists(log_path).await?;
    Ok(())
}

async fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_first_error_line() {
        assert_eq!(
            first_error_line("ok\n  Error: something broke\n"),
            Some("Error: something broke")
        );
        assert_eq!(
            first_error_line("Traceback (most recent call last):\n"),
            Some("Traceback (most recent call last):")
        );
        assert_eq!(first_error_line("ERRORS found"), Some("ERRORS found"));
        assert_eq!(first_error_line("no error here\nskip /a"), None);
    }

    #[tokio::test]
    async fn test_absolute_album_is_rejected_before_spawning() {
        let temp = TempDir::new().unwrap();
        let importer = BeetImporter::new(
            "/nonexistent/tool",
            temp.path(),
            temp.path().join("tmp"),
            Duration::from_secs(5),
        )
        .unwrap();

        let result = importer.import_batch(&[AlbumId::new("/etc")]).await;
        assert!(matches!(result, Err(ToolError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_escaping_album_is_rejected_before_spawning() {
        let temp = TempDir::new().unwrap();
        let importer = BeetImporter::new(
            "/nonexistent/tool",
            temp.path(),
            temp.path().join("tmp"),
            Duration::from_secs(5),
        )
        .unwrap();

        for id in ["../x", "a/../../x", ".", ""] {
            let result = importer.import_batch(&[AlbumId::new(id)]).await;
            assert!(
                matches!(result, Err(ToolError::InvalidInput(_))),
                "{id:?} was accepted"
            );
            let result = importer.import_batch_interactive(&[AlbumId::new(id)]).await;
            assert!(matches!(result, Err(ToolError::InvalidInput(_))));
        }
    }

    #[test]
    fn test_relative_albums_root_is_made_absolute() {
        let importer = BeetImporter::new(
            "beet",
            "music/flac",
            "data/tmp",
            Duration::from_secs(5),
        )
        .unwrap();

        let cwd = std::env::current_dir().unwrap();
        assert_eq!(importer.albums_root(), cwd.join("music/flac"));
        assert_eq!(importer.log_path(), cwd.join("data/tmp").join(LOG_FILE));
    }

    #[tokio::test]
    async fn test_empty_batch_does_not_spawn() {
        let temp = TempDir::new().unwrap();
        let importer = BeetImporter::new(
            "/nonexistent/tool",
            temp.path(),
            temp.path().join("tmp"),
            Duration::from_secs(5),
        )
        .unwrap();

        assert!(importer.import_batch(&[]).await.unwrap().is_empty());
        importer.import_batch_interactive(&[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let temp = TempDir::new().unwrap();
        let importer = BeetImporter::new(
            "/nonexistent/tool",
            temp.path(),
            temp.path().join("tmp"),
            Duration::from_secs(5),
        )
        .unwrap();

        let result = importer.import_batch(&[AlbumId::new("a")]).await;
        assert!(matches!(result, Err(ToolError::Spawn { .. })));
        assert!(!importer.log_path().exists());
    }

    #[tokio::test]
    async fn test_capture_echoes_and_collects() {
        let input: &[u8] = b"line one\nline two\n";
        let mut echo = Vec::new();
        let captured = capture(input, Some(&mut echo)).await.unwrap();
        assert_eq!(captured, input);
        assert_eq!(echo, input);
    }
}
