//! Shelf Importer
//!
//! Drives album directories through an external tagging tool and records the
//! outcome of every attempt in the status store.
//!
//! # Architecture
//!
//! - `scanner`: lists album directories under the albums root
//! - `log_parser`: reads the tool's import log for skipped albums
//! - `tool`: the `BatchImporter` seam and the `beet` subprocess behind it
//! - `lock`: single-writer lock on the data directory
//! - `prompt`: operator prompts used while handling errors
//! - `coordinator`: the album lifecycle operations (setup, import, re-drives)
//!
//! # Example
//!
//! ```rust,no_run
//! use shelf_core::ShelfConfig;
//! use shelf_importer::ImportCoordinator;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> shelf_importer::Result<()> {
//! let config = ShelfConfig::new("/var/lib/shelf", "/music/flac");
//! let coordinator = ImportCoordinator::open(&config).await?;
//!
//! coordinator.import(&CancellationToken::new()).await?;
//! println!("{:?}", coordinator.stats().await?);
//! coordinator.close().await?;
//! # Ok(())
//! # }
//! ```

mod error;

pub mod coordinator;
pub mod lock;
pub mod log_parser;
pub mod prompt;
pub mod scanner;
pub mod tool;

pub use coordinator::{BatchStep, ImportCoordinator, StatusReader};
pub use error::{ImportError, ToolError};
pub use log_parser::SkipLogParser;
pub use scanner::AlbumScanner;
pub use tool::{BatchImporter, BeetImporter};

/// Re-export commonly used types
pub type Result<T> = std::result::Result<T, ImportError>;
