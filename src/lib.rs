//! Tiled raster paging engine for paged documents.
//!
//! Pages are cut into fixed-size tiles at the current zoom. Each load pass
//! plans the tiles the viewport needs, reuses what is already cached and
//! queues the rest on two background dispatchers. Rendered tiles land in a
//! priority-ordered cache whose budget is shared by every open view.

pub mod backend;
pub mod cache;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod pages;
pub mod planner;
pub mod raster;
pub mod render;
pub mod synthetic;
pub mod tile;
pub mod viewport;

pub use cache::{CacheOccupancy, CacheRegistry, CachedTile, TileCache};
pub use config::EngineConfig;
pub use document::{Document, DocumentProvider, DocumentRegistry, DocumentSource, PageDecoder};
pub use engine::{Command, Effect, EngineStats, PagingEngine, RedrawSink};
pub use error::{ConfigError, DecodeFailure, DocumentOpenFailure, EngineError};
pub use geometry::{Point, RelRect, Size};
pub use pages::PageOrder;
pub use tile::{Tile, TileKey};
pub use viewport::{Orientation, ScrollDirection, Viewport};
