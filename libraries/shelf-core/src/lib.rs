//! Shelf Core
//!
//! Shared types, configuration and error handling for Shelf.
//!
//! Shelf tracks music album directories through an import pipeline driven by
//! an external tagging tool. This crate holds what every other crate agrees on:
//!
//! - **Domain Types**: `AlbumId`, `AlbumStatus`, `AlbumRecord`, `StatusCounts`
//! - **Configuration**: `ShelfConfig`, loaded from defaults, a TOML file and
//!   `SHELF_*` environment variables
//! - **Error Handling**: `CoreError` and `Result`
//!
//! # Example
//!
//! ```rust
//! use shelf_core::{AlbumId, AlbumStatus};
//!
//! let album = AlbumId::new("Artist - Album (2004) [FLAC]");
//! assert_eq!(album.as_str(), "Artist - Album (2004) [FLAC]");
//! assert_eq!(AlbumStatus::from_str("skipped"), Some(AlbumStatus::Skipped));
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod time;
pub mod types;

pub use config::ShelfConfig;
pub use error::{CoreError, Result};
pub use types::{AlbumId, AlbumRecord, AlbumStatus, StatusCounts};

/// Number of albums submitted to the external tool per invocation
pub const BATCH_SIZE: usize = 10;
