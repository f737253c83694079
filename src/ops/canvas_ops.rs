// ============================================================================
// CANVAS-LEVEL OPERATIONS: each resize, crop or clear is one history entry
// ============================================================================

use std::sync::Arc;

use crate::canvas::{CanvasState, LayerId, Rgba, Size};
use crate::components::history::{CanvasSizeCommand, HistoryController};
use crate::error::EngineError;
use crate::io::SnapshotCodec;

/// Resize every layer to `new_size` and record one undoable step.
///
/// Old pixel `src_origin + d` lands on `dest_origin + d`; uncovered space is
/// transparent. Open gestures on any layer are discarded, so commit them first.
pub fn resize_canvas(
    state: &mut CanvasState,
    history: &mut HistoryController,
    codec: Arc<dyn SnapshotCodec>,
    new_size: Size,
    dest_origin: (u32, u32),
    src_origin: (u32, u32),
) -> Result<(), EngineError> {
    if new_size == state.size() && dest_origin == (0, 0) && src_origin == (0, 0) {
        return Ok(());
    }

    let mut cmd = CanvasSizeCommand::new("Resize canvas", state, codec)?;
    for agent in state.layers_mut() {
        agent.change_buffer_size(new_size, dest_origin, src_origin, true);
    }
    state.set_size(new_size);
    cmd.set_after(state)?;
    log::info!(
        "canvas resized {}x{} -> {}x{}",
        cmd.before_size().width,
        cmd.before_size().height,
        new_size.width,
        new_size.height
    );
    history.add_action(Box::new(cmd));
    Ok(())
}

/// Crop to the rectangle at `(x, y)` of size `size`.
pub fn crop_canvas(
    state: &mut CanvasState,
    history: &mut HistoryController,
    codec: Arc<dyn SnapshotCodec>,
    x: u32,
    y: u32,
    size: Size,
) -> Result<(), EngineError> {
    resize_canvas(state, history, codec, size, (0, 0), (x, y))
}

/// Fill a whole layer with `color` as its own history entry.
/// Anything drawn on the layer but not yet committed becomes part of this entry.
pub fn clear_layer(state: &mut CanvasState, history: &mut HistoryController, layer_id: LayerId, color: Rgba) {
    let Some(agent) = state.layer_mut(layer_id) else { return };
    agent.clear(color);
    agent.register_to_history(history, Some("clear"));
}
