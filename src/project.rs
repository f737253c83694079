use std::sync::Arc;

use crossbeam_channel::Receiver;
use uuid::Uuid;

use crate::canvas::{CanvasState, LayerId, PixelBuffer, Position, Rgba, Size};
use crate::components::diff::PixelDiff;
use crate::components::history::{HistoryController, HistoryListener, ListenerId};
use crate::error::EngineError;
use crate::events::RenderEvent;
use crate::io::{self, SnapshotCodec};
use crate::ops::canvas_ops;
use crate::ops::fill::{self, FillReport, LimitMode, SelectionMask};
use crate::settings::EngineSettings;
use crate::tiles::TileIndex;

/// Single open document: its layers plus its own undo/redo history.
pub struct Project {
    pub id: Uuid,
    pub canvas_state: CanvasState,
    pub history: HistoryController,
    pub is_dirty: bool,

    /// Display name ("Untitled-X" until the host renames it)
    pub name: String,

    codec: Arc<dyn SnapshotCodec>,
}

impl Project {
    pub fn new_untitled(untitled_counter: usize, width: u32, height: u32, settings: &EngineSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            canvas_state: CanvasState::new(width, height, settings.tile_size, settings.diff_batch_size),
            history: HistoryController::new(settings.max_history_items)
                .with_memory_limit(settings.max_history_memory_bytes),
            is_dirty: false,
            name: format!("Untitled-{}", untitled_counter),
            codec: io::codec_for(settings.snapshot_codec),
        }
    }

    /// Single-layer project around existing pixels.
    pub fn from_buffer(name: impl Into<String>, buffer: PixelBuffer, settings: &EngineSettings) -> Result<Self, EngineError> {
        let mut project = Self::new_untitled(0, buffer.width(), buffer.height(), settings);
        project.name = name.into();
        project.canvas_state.add_layer_from_buffer(buffer)?;
        Ok(project)
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    pub fn size(&self) -> Size {
        self.canvas_state.size()
    }

    // ---- layers -------------------------------------------------------------

    pub fn add_layer(&mut self, color: Rgba) -> LayerId {
        self.canvas_state.add_layer(color)
    }

    pub fn active_layer(&self) -> Option<LayerId> {
        self.canvas_state.active_layer
    }

    pub fn get_pixel(&self, layer_id: LayerId, pos: Position) -> Rgba {
        self.canvas_state
            .layer(layer_id)
            .map_or(Rgba::TRANSPARENT, |agent| agent.get_pixel(pos))
    }

    // ---- drawing ------------------------------------------------------------

    /// Draw one pixel into the open gesture of `layer_id`.
    pub fn set_pixel(&mut self, layer_id: LayerId, pos: Position, color: Rgba) -> Option<PixelDiff> {
        let diff = self.canvas_state.layer_mut(layer_id)?.draw_pixel(pos, color)?;
        self.is_dirty = true;
        Some(diff)
    }

    /// Close the open gesture of `layer_id` as one history entry.
    pub fn register_to_history(&mut self, layer_id: LayerId) {
        if let Some(agent) = self.canvas_state.layer_mut(layer_id) {
            agent.register_to_history(&mut self.history, None);
        }
    }

    pub fn flood_fill(&mut self, layer_id: LayerId, seed: Position, color: Rgba) -> FillReport {
        let Some(agent) = self.canvas_state.layer_mut(layer_id) else {
            return FillReport::default();
        };
        let report = fill::flood_fill(agent, seed, color);
        self.is_dirty |= !report.is_noop();
        report
    }

    pub fn flood_fill_masked(
        &mut self,
        layer_id: LayerId,
        seed: Position,
        color: Rgba,
        mask: &SelectionMask,
        limit: LimitMode,
    ) -> FillReport {
        let Some(agent) = self.canvas_state.layer_mut(layer_id) else {
            return FillReport::default();
        };
        let report = fill::flood_fill_masked(agent, seed, color, mask, limit);
        self.is_dirty |= !report.is_noop();
        report
    }

    pub fn clear_layer(&mut self, layer_id: LayerId, color: Rgba) {
        canvas_ops::clear_layer(&mut self.canvas_state, &mut self.history, layer_id, color);
        self.is_dirty = true;
    }

    pub fn resize_canvas(&mut self, new_size: Size, dest_origin: (u32, u32), src_origin: (u32, u32)) -> Result<(), EngineError> {
        self.commit_open_gestures();
        canvas_ops::resize_canvas(
            &mut self.canvas_state,
            &mut self.history,
            Arc::clone(&self.codec),
            new_size,
            dest_origin,
            src_origin,
        )?;
        self.is_dirty = true;
        Ok(())
    }

    // ---- history ------------------------------------------------------------

    /// Close every layer's open gesture, so replay never runs underneath
    /// uncommitted diffs. Those gestures become the newest history entries.
    fn commit_open_gestures(&mut self) {
        for agent in self.canvas_state.layers_mut() {
            if agent.recorder().has_pending() {
                agent.register_to_history(&mut self.history, None);
            }
        }
    }

    /// Undo the newest entry. An open gesture is committed first, so it is
    /// what gets undone.
    pub fn undo(&mut self) -> Result<Option<String>, EngineError> {
        self.commit_open_gestures();
        let label = self.history.undo(&mut self.canvas_state)?;
        self.is_dirty |= label.is_some();
        Ok(label)
    }

    /// Redo the newest undone entry. Committing an open gesture first
    /// clears the redo stack, like any other new edit.
    pub fn redo(&mut self) -> Result<Option<String>, EngineError> {
        self.commit_open_gestures();
        let label = self.history.redo(&mut self.canvas_state)?;
        self.is_dirty |= label.is_some();
        Ok(label)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn clear_history(&mut self) {
        self.history.clear_history();
    }

    pub fn on_change(&mut self, listener: HistoryListener) -> ListenerId {
        self.history.on_change(listener)
    }

    // ---- rendering hookup ---------------------------------------------------

    pub fn dirty_tiles(&self, layer_id: LayerId) -> Vec<TileIndex> {
        self.canvas_state
            .layer(layer_id)
            .map(|agent| agent.dirty_tiles())
            .unwrap_or_default()
    }

    pub fn reset_dirty_states(&mut self, layer_id: LayerId) {
        if let Some(agent) = self.canvas_state.layer_mut(layer_id) {
            agent.reset_dirty_states();
        }
    }

    /// Start a fresh render channel. A previous receiver stops getting events.
    pub fn subscribe_render_events(&mut self) -> Receiver<RenderEvent> {
        let rx = self.canvas_state.notifier_mut().subscribe();
        self.canvas_state.propagate_notifier();
        rx
    }

    // ---- snapshots ----------------------------------------------------------

    /// Raw RGBA bytes of a layer.
    pub fn export_layer_raw(&self, layer_id: LayerId) -> Option<Vec<u8>> {
        self.canvas_state.layer(layer_id).map(|agent| agent.buffer().snapshot())
    }

    /// Layer bytes through the configured snapshot codec.
    pub fn export_layer_snapshot(&self, layer_id: LayerId) -> Result<Option<Vec<u8>>, EngineError> {
        let Some(agent) = self.canvas_state.layer(layer_id) else { return Ok(None) };
        let buffer = agent.buffer();
        Ok(Some(self.codec.encode(buffer.width(), buffer.height(), buffer.data())?))
    }

    /// Replace a layer's pixels from a codec snapshot of the same size.
    /// Not recorded in history.
    pub fn import_layer_snapshot(&mut self, layer_id: LayerId, bytes: &[u8]) -> Result<(), EngineError> {
        let (width, height, data) = self.codec.decode(bytes)?;
        if Size::new(width, height) != self.size() {
            return Err(EngineError::BufferSizeMismatch {
                expected: self.size().byte_len(),
                actual: data.len(),
            });
        }
        if let Some(agent) = self.canvas_state.layer_mut(layer_id) {
            agent.set_buffer(data, false)?;
            self.is_dirty = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const RED: Rgba = Rgba::new(255, 0, 0, 255);

    #[test]
    fn gesture_commit_and_undo() {
        let mut project = Project::new_untitled(1, 4, 4, &EngineSettings::default());
        let id = project.add_layer(Rgba::WHITE);
        project.set_pixel(id, Position::new(1, 1), RED);
        project.set_pixel(id, Position::new(2, 1), RED);
        assert!(!project.can_undo());
        project.register_to_history(id);
        assert!(project.can_undo());

        assert_eq!(project.undo().unwrap().as_deref(), Some("Layer buffer"));
        assert_eq!(project.get_pixel(id, Position::new(1, 1)), Rgba::WHITE);
        project.redo().unwrap();
        assert_eq!(project.get_pixel(id, Position::new(2, 1)), RED);
    }

    #[test]
    fn undo_commits_open_gesture_first() {
        let mut project = Project::new_untitled(1, 4, 4, &EngineSettings::default());
        let id = project.add_layer(Rgba::WHITE);
        project.set_pixel(id, Position::new(1, 1), RED);
        project.register_to_history(id);

        // Uncommitted stroke over the same pixel.
        project.set_pixel(id, Position::new(1, 1), Rgba::BLACK);
        project.set_pixel(id, Position::new(2, 2), Rgba::BLACK);
        let after = project.export_layer_raw(id).unwrap();

        project.undo().unwrap();
        assert_eq!(project.get_pixel(id, Position::new(1, 1)), RED);
        assert_eq!(project.get_pixel(id, Position::new(2, 2)), Rgba::WHITE);
        assert_eq!(project.history.undo_count(), 1);

        project.redo().unwrap();
        assert_eq!(project.export_layer_raw(id).unwrap(), after);
        project.undo().unwrap();
        project.undo().unwrap();
        assert_eq!(project.get_pixel(id, Position::new(1, 1)), Rgba::WHITE);
    }

    #[test]
    fn redo_is_dropped_by_open_gesture() {
        let mut project = Project::new_untitled(1, 4, 4, &EngineSettings::default());
        let id = project.add_layer(Rgba::WHITE);
        project.set_pixel(id, Position::new(0, 0), RED);
        project.register_to_history(id);
        project.undo().unwrap();

        project.set_pixel(id, Position::new(3, 3), RED);
        assert_eq!(project.redo().unwrap(), None);
        assert_eq!(project.get_pixel(id, Position::new(0, 0)), Rgba::WHITE);
        assert!(project.can_undo());
    }

    #[test]
    fn render_events_after_subscribe() {
        let mut project = Project::new_untitled(1, 4, 4, &EngineSettings::default());
        let id = project.add_layer(Rgba::WHITE);
        let rx = project.subscribe_render_events();
        project.flood_fill(id, Position::new(0, 0), RED);
        assert!(matches!(rx.try_recv(), Ok(RenderEvent::RequestUpdate { layer_id, .. }) if layer_id == id));
    }

    #[test]
    fn listener_sees_commit() {
        let mut project = Project::new_untitled(1, 4, 4, &EngineSettings::default());
        let id = project.add_layer(Rgba::WHITE);
        let states = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&states);
        project.on_change(Box::new(move |s| sink.lock().unwrap().push(s.can_undo)));
        project.set_pixel(id, Position::new(0, 0), RED);
        project.register_to_history(id);
        assert_eq!(*states.lock().unwrap(), vec![false, true]);
    }

    #[test]
    fn snapshot_export_import() {
        let mut project = Project::new_untitled(1, 3, 3, &EngineSettings::default());
        let id = project.add_layer(RED);
        let snapshot = project.export_layer_snapshot(id).unwrap().unwrap();
        project.clear_layer(id, Rgba::TRANSPARENT);
        project.import_layer_snapshot(id, &snapshot).unwrap();
        assert_eq!(project.get_pixel(id, Position::new(2, 2)), RED);
        assert_eq!(project.dirty_tiles(id).len(), project.canvas_state.layer(id).unwrap().tiles().len());
    }
}
