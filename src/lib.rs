//! Tile-tracked raster layer editing engine.
//!
//! A [`Project`] owns the layers of one document ([`CanvasState`]) and its
//! undo/redo history. Each layer is driven through a [`LayerEditAgent`],
//! which keeps a [`TileGrid`] of dirty and uniform-color flags next to the
//! pixels and records every write of the current gesture as diffs. Closing
//! a gesture turns those diffs into one history entry.

pub mod canvas;
pub mod cli;
pub mod components;
pub mod error;
pub mod events;
pub mod io;
pub mod logger;
pub mod ops;
pub mod project;
pub mod settings;
pub mod tiles;

pub use canvas::{CanvasState, LayerId, PixelBuffer, Position, Rgba, Size};
pub use components::diff::{Diff, DiffAction, DiffKey, DiffRecorder, PixelDiff, TileDiff, WholeDiff};
pub use components::history::{
    CanvasSizeCommand, HistoryAction, HistoryController, HistoryState, LayerBufferCommand, ListenerId,
};
pub use components::layers::LayerEditAgent;
pub use error::EngineError;
pub use events::{RenderEvent, RenderNotifier};
pub use io::{PngSnapshotCodec, RawSnapshotCodec, SnapshotCodec};
pub use ops::fill::{FillReport, LimitMode, SelectionMask};
pub use project::Project;
pub use settings::{EngineSettings, SnapshotCodecKind};
pub use tiles::{Tile, TileGrid, TileIndex, TileRect};
