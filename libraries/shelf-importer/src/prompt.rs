//! Operator prompts for error handling

use crate::{ImportError, Result};
use async_trait::async_trait;
use shelf_core::AlbumId;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

/// Asks the operator which library entries to remove before a retry
#[async_trait]
pub trait RemovalPrompt: Send + Sync {
    /// One removal query for `album`, or `None` when the operator is done
    async fn ask(&self, album: &AlbumId) -> Result<Option<String>>;
}

/// [`RemovalPrompt`] on the terminal
pub struct StdinPrompt {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl StdinPrompt {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

impl Default for StdinPrompt {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemovalPrompt for StdinPrompt {
    async fn ask(&self, album: &AlbumId) -> Result<Option<String>> {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(
                format!(
                    "Processing failed album: {album}\nEnter removal query (press Enter to skip removal): "
                )
                .as_bytes(),
            )
            .await?;
        stdout.flush().await?;

        let line = self.lines.lock().await.next_line().await?;
        Ok(line.and_then(non_empty_query))
    }
}

/// Trimmed query, `None` when blank
pub fn non_empty_query(line: String) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Prompt answering from a fixed list of queries
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: std::sync::Mutex<std::collections::VecDeque<String>>,
}

impl ScriptedPrompt {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: std::sync::Mutex::new(answers.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait]
impl RemovalPrompt for ScriptedPrompt {
    async fn ask(&self, _album: &AlbumId) -> Result<Option<String>> {
        let next = self
            .answers
            .lock()
            .map_err(|_| ImportError::InvalidInput("prompt script poisoned".to_string()))?
            .pop_front();
        Ok(next.and_then(non_empty_query))
    }
}
