use std::collections::VecDeque;
use std::sync::Arc;

use crate::canvas::{CanvasState, LayerId, PixelBuffer, Size};
use crate::components::diff::DiffAction;
use crate::error::EngineError;
use crate::io::SnapshotCodec;

pub const DEFAULT_MAX_HISTORY_ITEMS: usize = 50;

// ============================================================================
// HISTORY ACTION TRAIT
// ============================================================================

/// A reversible edit. Actions never hold references into the canvas; they
/// receive it on every replay.
pub trait HistoryAction: Send + Sync {
    fn undo(&self, canvas: &mut CanvasState) -> Result<(), EngineError>;
    fn redo(&self, canvas: &mut CanvasState) -> Result<(), EngineError>;
    fn label(&self) -> String;
    fn context(&self) -> Option<&str> {
        None
    }
    fn memory_size(&self) -> usize;
}

// ============================================================================
// LAYER BUFFER COMMAND – one gesture's diffs on one layer
// ============================================================================

pub struct LayerBufferCommand {
    layer_id: LayerId,
    action: DiffAction,
    context: Option<String>,
}

impl LayerBufferCommand {
    pub fn new(layer_id: LayerId, action: DiffAction, context: Option<String>) -> Self {
        Self {
            layer_id,
            action,
            context,
        }
    }

    pub fn layer_id(&self) -> LayerId {
        self.layer_id
    }

    pub fn action(&self) -> &DiffAction {
        &self.action
    }
}

impl HistoryAction for LayerBufferCommand {
    fn undo(&self, canvas: &mut CanvasState) -> Result<(), EngineError> {
        // A deleted layer makes this a no-op; layer_mut already logged it.
        match canvas.layer_mut(self.layer_id) {
            Some(agent) => agent.undo_action(&self.action),
            None => Ok(()),
        }
    }

    fn redo(&self, canvas: &mut CanvasState) -> Result<(), EngineError> {
        match canvas.layer_mut(self.layer_id) {
            Some(agent) => agent.redo_action(&self.action),
            None => Ok(()),
        }
    }

    fn label(&self) -> String {
        "Layer buffer".to_string()
    }

    fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    fn memory_size(&self) -> usize {
        self.action.memory_size()
    }
}

// ============================================================================
// CANVAS SIZE COMMAND – encoded per-layer snapshots around a resize
// ============================================================================

struct EncodedLayer {
    layer_id: LayerId,
    data: Vec<u8>,
}

struct CanvasSnapshot {
    size: Size,
    layers: Vec<EncodedLayer>,
}

impl CanvasSnapshot {
    fn capture(canvas: &CanvasState, codec: &dyn SnapshotCodec) -> Result<Self, EngineError> {
        let mut layers = Vec::with_capacity(canvas.layer_ids().len());
        for &layer_id in canvas.layer_ids() {
            if let Some(agent) = canvas.layer(layer_id) {
                let buffer = agent.buffer();
                layers.push(EncodedLayer {
                    layer_id,
                    data: codec.encode(buffer.width(), buffer.height(), buffer.data())?,
                });
            }
        }
        Ok(Self {
            size: canvas.size(),
            layers,
        })
    }

    /// Decode every layer first so a corrupt snapshot leaves the canvas untouched.
    fn restore_into(&self, canvas: &mut CanvasState, codec: &dyn SnapshotCodec) -> Result<(), EngineError> {
        let mut decoded = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let (width, height, data) = codec.decode(&layer.data)?;
            if Size::new(width, height) != self.size {
                return Err(EngineError::BufferSizeMismatch {
                    expected: self.size.byte_len(),
                    actual: Size::new(width, height).byte_len(),
                });
            }
            decoded.push((layer.layer_id, PixelBuffer::from_raw(width, height, data)?));
        }

        for (layer_id, buffer) in decoded {
            if let Some(agent) = canvas.layer_mut(layer_id) {
                agent.replace_buffer(buffer);
            }
        }
        canvas.set_size(self.size);
        Ok(())
    }

    fn memory_bytes(&self) -> usize {
        self.layers.iter().map(|l| l.data.len()).sum()
    }
}

/// Create BEFORE resizing, then call [`set_after`](Self::set_after) once the
/// resize is done.
pub struct CanvasSizeCommand {
    label: String,
    codec: Arc<dyn SnapshotCodec>,
    before: CanvasSnapshot,
    after: Option<CanvasSnapshot>,
}

impl CanvasSizeCommand {
    pub fn new(label: impl Into<String>, canvas: &CanvasState, codec: Arc<dyn SnapshotCodec>) -> Result<Self, EngineError> {
        let before = CanvasSnapshot::capture(canvas, codec.as_ref())?;
        Ok(Self {
            label: label.into(),
            codec,
            before,
            after: None,
        })
    }

    pub fn set_after(&mut self, canvas: &CanvasState) -> Result<(), EngineError> {
        self.after = Some(CanvasSnapshot::capture(canvas, self.codec.as_ref())?);
        Ok(())
    }

    pub fn before_size(&self) -> Size {
        self.before.size
    }

    pub fn after_size(&self) -> Option<Size> {
        self.after.as_ref().map(|a| a.size)
    }
}

impl HistoryAction for CanvasSizeCommand {
    fn undo(&self, canvas: &mut CanvasState) -> Result<(), EngineError> {
        self.before.restore_into(canvas, self.codec.as_ref())
    }

    fn redo(&self, canvas: &mut CanvasState) -> Result<(), EngineError> {
        match &self.after {
            Some(after) => after.restore_into(canvas, self.codec.as_ref()),
            None => Err(EngineError::MissingSnapshot {
                label: self.label.clone(),
            }),
        }
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    fn memory_size(&self) -> usize {
        self.before.memory_bytes() + self.after.as_ref().map_or(0, |a| a.memory_bytes())
    }
}

// ============================================================================
// HISTORY CONTROLLER – per-document undo/redo stacks
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HistoryState {
    pub can_undo: bool,
    pub can_redo: bool,
    /// Label of the action the next undo would revert.
    pub last_label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type HistoryListener = Box<dyn FnMut(&HistoryState) + Send>;

pub struct HistoryController {
    undo_stack: VecDeque<Box<dyn HistoryAction>>,
    redo_stack: VecDeque<Box<dyn HistoryAction>>,
    max_history_items: usize,
    /// Optional memory cap in bytes.
    max_memory_bytes: Option<usize>,
    /// Running memory total across both stacks.
    total_memory: usize,
    listeners: Vec<(ListenerId, HistoryListener)>,
    next_listener_id: u64,
}

impl Default for HistoryController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY_ITEMS)
    }
}

impl HistoryController {
    pub fn new(max_history_items: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_history_items,
            max_memory_bytes: None,
            total_memory: 0,
            listeners: Vec::new(),
            next_listener_id: 0,
        }
    }

    pub fn with_memory_limit(mut self, max_memory_bytes: Option<usize>) -> Self {
        self.max_memory_bytes = max_memory_bytes;
        self
    }

    pub fn add_action(&mut self, action: Box<dyn HistoryAction>) {
        // A new action invalidates everything that could be redone.
        for cmd in self.redo_stack.drain(..) {
            self.total_memory = self.total_memory.saturating_sub(cmd.memory_size());
        }

        self.total_memory += action.memory_size();
        self.undo_stack.push_back(action);
        self.prune();
        self.notify();
    }

    /// Revert the most recent action. Returns its label, or `None` when there
    /// is nothing to undo. A failing action stays on the undo stack.
    pub fn undo(&mut self, canvas: &mut CanvasState) -> Result<Option<String>, EngineError> {
        let Some(action) = self.undo_stack.pop_back() else {
            return Ok(None);
        };
        let label = action.label();
        if let Err(e) = action.undo(canvas) {
            log::error!("undo of '{}' failed: {}", label, e);
            self.undo_stack.push_back(action);
            return Err(e);
        }
        self.redo_stack.push_back(action);
        self.notify();
        Ok(Some(label))
    }

    pub fn redo(&mut self, canvas: &mut CanvasState) -> Result<Option<String>, EngineError> {
        let Some(action) = self.redo_stack.pop_back() else {
            return Ok(None);
        };
        let label = action.label();
        if let Err(e) = action.redo(canvas) {
            log::error!("redo of '{}' failed: {}", label, e);
            self.redo_stack.push_back(action);
            return Err(e);
        }
        self.undo_stack.push_back(action);
        self.notify();
        Ok(Some(label))
    }

    /// Undo `count` actions (0 = none). Stops at the first error.
    pub fn undo_to(&mut self, count: usize, canvas: &mut CanvasState) -> Result<(), EngineError> {
        for _ in 0..count {
            if self.undo(canvas)?.is_none() {
                break;
            }
        }
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn is_history_available(&self) -> bool {
        self.can_undo() || self.can_redo()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.undo_stack.back().map(|c| c.label())
    }

    /// Get all undo labels (most recent first)
    pub fn undo_history(&self) -> Vec<String> {
        self.undo_stack.iter().rev().map(|c| c.label()).collect()
    }

    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn state(&self) -> HistoryState {
        HistoryState {
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
            last_label: self.undo_description(),
        }
    }

    pub fn clear_history(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.total_memory = 0;
        self.notify();
    }

    // ---- listeners ----------------------------------------------------------

    /// Register a listener. It is called right away with the current state
    /// and again after every change.
    pub fn on_change(&mut self, mut listener: HistoryListener) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        listener(&self.state());
        self.listeners.push((id, listener));
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(l, _)| *l != id);
        self.listeners.len() != before
    }

    fn notify(&mut self) {
        if self.listeners.is_empty() {
            return;
        }
        let state = self.state();
        for (_, listener) in &mut self.listeners {
            listener(&state);
        }
    }

    /// Evict oldest actions until both caps hold. The memory cap never evicts
    /// the newest action.
    fn prune(&mut self) {
        while self.undo_stack.len() > self.max_history_items {
            if let Some(removed) = self.undo_stack.pop_front() {
                log::debug!("history cap reached, evicting '{}'", removed.label());
                self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
            }
        }

        if let Some(max_bytes) = self.max_memory_bytes {
            while self.total_memory > max_bytes && self.undo_stack.len() > 1 {
                if let Some(removed) = self.undo_stack.pop_front() {
                    log::debug!("history memory cap reached, evicting '{}'", removed.label());
                    self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
                }
            }
        }
    }
}
