// ============================================================================
// LAYER EDIT AGENT – the per-layer facade drawing tools talk to
// ============================================================================

use crate::canvas::{LayerId, PixelBuffer, Position, Rgba, Size};
use crate::components::diff::{Diff, DiffAction, DiffRecorder, PixelDiff, TileDiff, WholeDiff};
use crate::components::history::{HistoryController, LayerBufferCommand};
use crate::error::EngineError;
use crate::events::RenderNotifier;
use crate::tiles::{TileFill, TileGrid, TileIndex};

/// Owns one layer's pixels, its tile grid and the diff recorder of the
/// gesture in progress.
///
/// Tools write through [`draw_pixel`](Self::draw_pixel) or
/// [`fill_whole_tile`](Self::fill_whole_tile) and finish the gesture with
/// [`register_to_history`](Self::register_to_history). History replay goes
/// through [`undo_action`](Self::undo_action) / [`redo_action`](Self::redo_action)
/// and never records diffs of its own.
pub struct LayerEditAgent {
    id: LayerId,
    buffer: PixelBuffer,
    tiles: TileGrid,
    recorder: DiffRecorder,
    notifier: RenderNotifier,
}

impl LayerEditAgent {
    pub fn new(
        id: LayerId,
        buffer: PixelBuffer,
        tile_size: u32,
        diff_batch_size: usize,
        notifier: RenderNotifier,
    ) -> Self {
        let tiles = TileGrid::new(&buffer, tile_size);
        Self {
            id,
            buffer,
            recorder: DiffRecorder::new(tiles.tile_size(), diff_batch_size),
            tiles,
            notifier,
        }
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    pub fn tiles(&self) -> &TileGrid {
        &self.tiles
    }

    pub fn recorder(&self) -> &DiffRecorder {
        &self.recorder
    }

    pub fn size(&self) -> Size {
        self.buffer.size()
    }

    pub(crate) fn set_notifier(&mut self, notifier: RenderNotifier) {
        self.notifier = notifier;
    }

    pub fn get_pixel(&self, pos: Position) -> Rgba {
        self.buffer.get_pixel(pos)
    }

    // ---- drawing ------------------------------------------------------------

    /// Write one pixel and keep the tile grid in sync. Returns the diff for the
    /// caller to pass to [`record_pixel_diff`](Self::record_pixel_diff);
    /// nothing is recorded here.
    ///
    /// Unless `skip_dedupe_check` is set, positions the current gesture has
    /// already touched are left alone and `None` is returned.
    pub fn set_pixel(&mut self, pos: Position, color: Rgba, skip_dedupe_check: bool) -> Option<PixelDiff> {
        if !self.buffer.is_in_bounds(pos) {
            return None;
        }
        if !skip_dedupe_check && self.recorder.is_diff_exists(pos) {
            return None;
        }
        let diff = self.buffer.set_raw_pixel(pos, color)?;
        self.tiles.note_pixel_write(pos, color);
        Some(diff)
    }

    /// Add a diff returned by [`set_pixel`](Self::set_pixel) to the current
    /// gesture. Writes that changed nothing are dropped unless the position
    /// already has an entry.
    pub fn record_pixel_diff(&mut self, diff: PixelDiff) {
        if diff.before != diff.after || self.recorder.is_diff_exists(diff.position) {
            self.recorder.add_pixel_diff(diff);
        }
    }

    /// Write one pixel as part of the current gesture and record it.
    pub fn draw_pixel(&mut self, pos: Position, color: Rgba) -> Option<PixelDiff> {
        let diff = self.set_pixel(pos, color, true)?;
        self.record_pixel_diff(diff);
        Some(diff)
    }

    /// Paint a whole tile. With `record`, a uniform tile is recorded as one
    /// [`TileDiff`]; a mixed tile records a pixel diff for every pixel that changed.
    pub fn fill_whole_tile(&mut self, index: TileIndex, color: Rgba, record: bool) -> TileFill {
        if !self.tiles.is_tile_in_bounds(index) {
            return TileFill::Unchanged;
        }

        let was_uniform = self.tiles.tile(index).is_uniform;
        if record && !was_uniform {
            let rect = self.tiles.tile_rect(index);
            let changed: Vec<(Position, Rgba)> = rect
                .positions()
                .map(|p| (p, self.buffer.get_pixel(p)))
                .filter(|(_, before)| *before != color)
                .collect();
            let outcome = self.tiles.fill_whole_tile(&mut self.buffer, index, color);
            for (position, before) in changed {
                self.recorder.add_pixel_diff(PixelDiff {
                    position,
                    before,
                    after: color,
                });
            }
            return outcome;
        }

        let outcome = self.tiles.fill_whole_tile(&mut self.buffer, index, color);
        if record {
            if let TileFill::Filled {
                previous_uniform: Some(before),
            } = outcome
            {
                self.recorder.add_tile_diff(TileDiff {
                    index,
                    before,
                    after: color,
                });
            }
        }
        outcome
    }

    /// Fill the entire layer with `color`, recorded as a whole-buffer diff.
    pub fn clear(&mut self, color: Rgba) {
        let before = self.buffer.snapshot();
        let (width, height) = (self.buffer.width(), self.buffer.height());
        self.buffer = PixelBuffer::filled(width, height, color);
        self.tiles.rebuild(&self.buffer);
        self.recorder.add_whole_diff(WholeDiff {
            width,
            height,
            before,
            after: self.buffer.snapshot(),
        });
        self.notify("cleared");
    }

    // ---- buffer replacement -------------------------------------------------

    /// Swap in raw bytes of the current dimensions. Every tile is rescanned
    /// and marked dirty. Nothing is recorded.
    pub fn set_buffer(&mut self, data: Vec<u8>, silent: bool) -> Result<(), EngineError> {
        self.buffer.replace_data(data)?;
        self.tiles.scan_uniformity(&self.buffer);
        self.tiles.set_all_dirty();
        if !silent {
            self.notify("buffer set");
        }
        Ok(())
    }

    /// Swap in a buffer of any size (canvas-size history replay).
    pub(crate) fn replace_buffer(&mut self, buffer: PixelBuffer) {
        self.buffer = buffer;
        self.tiles.rebuild(&self.buffer);
        self.drop_pending("buffer replaced");
        self.notify("buffer replaced");
    }

    /// Reallocate the layer to `new_size`. See [`PixelBuffer::resize`] for origin semantics.
    pub fn change_buffer_size(
        &mut self,
        new_size: Size,
        dest_origin: (u32, u32),
        src_origin: (u32, u32),
        emit_event: bool,
    ) {
        self.buffer.resize(new_size, dest_origin, src_origin);
        self.tiles.rebuild(&self.buffer);
        self.drop_pending("buffer size changed");
        if emit_event {
            self.notify("buffer size changed");
        }
    }

    fn drop_pending(&mut self, why: &str) {
        if self.recorder.has_pending() {
            log::debug!("Layer({}) {}: discarding uncommitted gesture", self.id, why);
            self.recorder.reset();
        }
    }

    // ---- history ------------------------------------------------------------

    /// Commit the current gesture to `history`. Empty gestures are dropped.
    /// The recorder always starts fresh afterwards.
    pub fn register_to_history(&mut self, history: &mut HistoryController, context: Option<&str>) {
        let action = self.recorder.take();
        if action.is_empty() {
            return;
        }
        log::debug!("Layer({}) committing {} diffs", self.id, action.len());
        history.add_action(Box::new(LayerBufferCommand::new(
            self.id,
            action,
            context.map(str::to_owned),
        )));
    }

    /// Restore every diff's `before`.
    pub fn undo_action(&mut self, action: &DiffAction) -> Result<(), EngineError> {
        for diff in action.undo_order() {
            match diff {
                Diff::Pixel(d) => {
                    self.set_pixel(d.position, d.before, true);
                }
                Diff::Tile(d) => {
                    self.fill_whole_tile(d.index, d.before, false);
                }
                Diff::Whole(d) => self.apply_whole(d.width, d.height, &d.before)?,
            }
        }
        self.notify("undo");
        Ok(())
    }

    /// Re-apply every diff's `after`.
    pub fn redo_action(&mut self, action: &DiffAction) -> Result<(), EngineError> {
        for diff in action.redo_order() {
            match diff {
                Diff::Pixel(d) => {
                    self.set_pixel(d.position, d.after, true);
                }
                Diff::Tile(d) => {
                    self.fill_whole_tile(d.index, d.after, false);
                }
                Diff::Whole(d) => self.apply_whole(d.width, d.height, &d.after)?,
            }
        }
        self.notify("redo");
        Ok(())
    }

    fn apply_whole(&mut self, width: u32, height: u32, data: &[u8]) -> Result<(), EngineError> {
        if self.buffer.size() != Size::new(width, height) {
            return Err(EngineError::BufferSizeMismatch {
                expected: self.buffer.memory_bytes(),
                actual: Size::new(width, height).byte_len(),
            });
        }
        self.set_buffer(data.to_vec(), true)
    }

    // ---- dirty tracking -----------------------------------------------------

    pub fn dirty_tiles(&self) -> Vec<TileIndex> {
        self.tiles.dirty_tiles()
    }

    pub fn reset_dirty_states(&mut self) {
        self.tiles.reset_dirty_states();
    }

    pub(crate) fn notify(&self, context: &str) {
        self.notifier.request_update(self.id, true, context);
        self.notifier.request_preview(self.id);
    }
}
