//! Test helpers for importer integration tests
//!
//! `TestEnv` is a throwaway data directory plus albums directory. `FakeImporter`
//! stands in for the external tool: it answers from a script of responses and
//! records every call.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use shelf_core::{AlbumId, AlbumRecord, ShelfConfig};
use shelf_importer::prompt::ScriptedPrompt;
use shelf_importer::{BatchImporter, ImportCoordinator, ToolError};
use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Fixed timestamp `secs` seconds after 2024-01-01T00:00:00Z
pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(secs)
}

pub fn ids(names: &[&str]) -> Vec<AlbumId> {
    names.iter().map(|n| AlbumId::new(*n)).collect()
}

/// One scripted answer from the fake tool
#[derive(Debug, Clone)]
pub enum Response {
    /// Success; these albums were skipped
    Skipped(Vec<&'static str>),
    /// The tool printed an error line
    BatchFailure,
    /// Non-zero exit without an error line
    RunFailure,
    /// The run was killed after its time limit
    Timeout,
}

impl Response {
    fn into_result(self, albums: &[AlbumId]) -> Result<Vec<AlbumId>, ToolError> {
        match self {
            Self::Skipped(names) => Ok(ids(&names)),
            Self::BatchFailure => Err(ToolError::BatchFailure {
                failed: albums.to_vec(),
                detail: "Error: something broke".to_string(),
            }),
            Self::RunFailure => Err(ToolError::RunFailure {
                status: "exit status: 1".to_string(),
                detail: String::new(),
            }),
            Self::Timeout => Err(ToolError::Timeout(Duration::from_secs(1))),
        }
    }
}

/// A call the fake tool received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Quiet(Vec<String>),
    Interactive(Vec<String>),
    Remove(String),
}

#[derive(Default)]
struct FakeState {
    responses: Mutex<VecDeque<Response>>,
    removals_fail: Mutex<bool>,
    cancel_on_import: Mutex<Option<CancellationToken>>,
    calls: Mutex<Vec<Call>>,
}

/// Scripted [`BatchImporter`]; clones share state
#[derive(Clone, Default)]
pub struct FakeImporter {
    state: Arc<FakeState>,
}

impl FakeImporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue responses; once they run out every batch imports cleanly
    pub fn respond(&self, responses: impl IntoIterator<Item = Response>) -> &Self {
        self.state.responses.lock().unwrap().extend(responses);
        self
    }

    pub fn fail_removals(&self) {
        *self.state.removals_fail.lock().unwrap() = true;
    }

    /// Cancel `token` while the first import call is running
    pub fn cancel_during_import(&self, token: CancellationToken) {
        *self.state.cancel_on_import.lock().unwrap() = Some(token);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.calls.lock().unwrap().clone()
    }

    fn next(&self) -> Response {
        self.state
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Response::Skipped(Vec::new()))
    }

    fn record(&self, call: Call) {
        self.state.calls.lock().unwrap().push(call);
        if let Some(token) = self.state.cancel_on_import.lock().unwrap().take() {
            token.cancel();
        }
    }
}

fn names(albums: &[AlbumId]) -> Vec<String> {
    albums.iter().map(|a| a.to_string()).collect()
}

#[async_trait]
impl BatchImporter for FakeImporter {
    async fn import_batch(&self, albums: &[AlbumId]) -> Result<Vec<AlbumId>, ToolError> {
        self.record(Call::Quiet(names(albums)));
        self.next().into_result(albums)
    }

    async fn import_batch_interactive(&self, albums: &[AlbumId]) -> Result<(), ToolError> {
        self.record(Call::Interactive(names(albums)));
        self.next().into_result(albums).map(|_| ())
    }

    async fn remove(&self, query: &str) -> Result<(), ToolError> {
        self.record(Call::Remove(query.to_string()));
        if *self.state.removals_fail.lock().unwrap() {
            return Err(ToolError::RunFailure {
                status: "exit status: 1".to_string(),
                detail: "no matching items".to_string(),
            });
        }
        Ok(())
    }
}

/// Temp data directory and albums directory
pub struct TestEnv {
    pub config: ShelfConfig,
    temp_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::in_temp_dir(tempfile::tempdir().expect("Failed to create temp dir"))
    }

    /// Like `new`, but every configured path is relative to the working directory
    pub fn relative() -> Self {
        Self::in_temp_dir(tempfile::tempdir_in(".").expect("Failed to create temp dir"))
    }

    fn in_temp_dir(temp_dir: TempDir) -> Self {
        let albums_dir = temp_dir.path().join("albums");
        fs::create_dir(&albums_dir).expect("Failed to create albums dir");

        Self {
            config: ShelfConfig::new(temp_dir.path().join("data"), albums_dir),
            temp_dir,
        }
    }

    pub fn albums_dir(&self) -> PathBuf {
        self.config.albums_dir.clone()
    }

    /// Create an album directory whose mtime is `ts(mtime_secs)`
    pub fn create_album(&self, name: &str, mtime_secs: i64) -> AlbumId {
        let path = self.config.albums_dir.join(name);
        fs::create_dir_all(&path).expect("Failed to create album");
        let mtime = SystemTime::from(ts(mtime_secs));
        fs::File::open(&path)
            .and_then(|dir| dir.set_modified(mtime))
            .expect("Failed to set album mtime");
        AlbumId::new(name)
    }

    /// Write a previous import log in the tool's format
    pub fn write_log(&self, lines: &[String]) -> PathBuf {
        let path = self.temp_dir.path().join("previous.log");
        fs::write(&path, lines.join("\n")).expect("Failed to write log");
        path
    }

    pub async fn coordinator(&self, importer: &FakeImporter) -> ImportCoordinator<FakeImporter> {
        self.coordinator_with_answers(importer, Vec::<String>::new())
            .await
    }

    pub async fn coordinator_with_answers(
        &self,
        importer: &FakeImporter,
        answers: impl IntoIterator<Item = impl Into<String>>,
    ) -> ImportCoordinator<FakeImporter> {
        ImportCoordinator::with_importer(
            &self.config,
            importer.clone(),
            Box::new(ScriptedPrompt::new(answers)),
        )
        .await
        .expect("Failed to open coordinator")
    }
}

pub async fn record(
    coordinator: &ImportCoordinator<FakeImporter>,
    id: &AlbumId,
) -> AlbumRecord {
    shelf_storage::albums::get(coordinator.pool(), id)
        .await
        .expect("Failed to read album")
        .expect("Album missing")
}
