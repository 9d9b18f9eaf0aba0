//! Render request and event types

use crate::error::DecodeFailure;
use crate::tile::{Tile, TileKey};

/// Which dispatcher served a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DispatcherKind {
    /// Viewport tiles, rebuilt on every pass
    Primary,
    /// Background thumbnail preloads
    Secondary,
}

impl DispatcherKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }
}

/// Identity of a render request: tile identity plus quality flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub tile: TileKey,
    pub best_quality: bool,
    pub annotations: bool,
}

/// An ask for one tile's pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderRequest {
    pub tile: TileKey,
    /// Priority order the tile is cached under. Not part of the identity.
    pub order: u64,
    /// Keep RGBA instead of reducing to RGB565
    pub best_quality: bool,
    pub annotations: bool,
}

impl RenderRequest {
    #[must_use]
    pub fn key(&self) -> RequestKey {
        RequestKey {
            tile: self.tile,
            best_quality: self.best_quality,
            annotations: self.annotations,
        }
    }
}

/// Completion sent from a render worker to the control thread.
#[derive(Debug)]
pub enum RenderEvent {
    TileReady {
        dispatcher: DispatcherKind,
        generation: u64,
        order: u64,
        tile: Tile,
    },
    Failed {
        dispatcher: DispatcherKind,
        generation: u64,
        key: TileKey,
        error: DecodeFailure,
    },
}

impl RenderEvent {
    #[must_use]
    pub fn dispatcher(&self) -> DispatcherKind {
        match self {
            Self::TileReady { dispatcher, .. } | Self::Failed { dispatcher, .. } => *dispatcher,
        }
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        match self {
            Self::TileReady { generation, .. } | Self::Failed { generation, .. } => *generation,
        }
    }
}

/// Message on a dispatcher's command queue.
#[derive(Debug)]
pub(crate) enum WorkerCommand {
    Render {
        generation: u64,
        request: RenderRequest,
    },
    Shutdown,
}
