mod album;
mod ids;

pub use album::{AlbumRecord, AlbumStatus, StatusCounts};
pub use ids::AlbumId;
