//! Render notifications.
//!
//! The engine never talks to a renderer directly. It posts [`RenderEvent`]s
//! on a channel; the renderer drains the receiver whenever it draws a frame
//! and then queries dirty tiles on the affected layers.

use crossbeam_channel::{Receiver, Sender};

use crate::canvas::LayerId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEvent {
    /// Pixels of `layer_id` changed. With `only_dirty` the renderer may
    /// re-upload just the dirty tiles; otherwise the whole layer.
    RequestUpdate {
        layer_id: LayerId,
        only_dirty: bool,
        context: String,
    },
    /// The layer thumbnail is stale.
    PreviewUpdate { layer_id: LayerId },
    CanvasSizeChanged { width: u32, height: u32 },
}

/// Sending half shared by the canvas and every layer agent.
/// Without a subscriber, events are dropped.
#[derive(Debug, Clone, Default)]
pub struct RenderNotifier {
    sender: Option<Sender<RenderEvent>>,
}

impl RenderNotifier {
    /// Create a fresh channel and return the receiving half.
    pub fn subscribe(&mut self) -> Receiver<RenderEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.sender = Some(tx);
        rx
    }

    pub fn send(&self, event: RenderEvent) {
        if let Some(tx) = &self.sender {
            // A dropped receiver just means nobody renders this document any more.
            let _ = tx.send(event);
        }
    }

    pub fn request_update(&self, layer_id: LayerId, only_dirty: bool, context: &str) {
        self.send(RenderEvent::RequestUpdate {
            layer_id,
            only_dirty,
            context: format!("Layer({}) {}", layer_id, context),
        });
    }

    pub fn request_preview(&self, layer_id: LayerId) {
        self.send(RenderEvent::PreviewUpdate { layer_id });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_reach_subscriber() {
        let mut notifier = RenderNotifier::default();
        notifier.request_preview(LayerId::new());

        let rx = notifier.subscribe();
        let id = LayerId::new();
        notifier.request_update(id, true, "undo");
        match rx.try_recv() {
            Ok(RenderEvent::RequestUpdate { layer_id, only_dirty, context }) => {
                assert_eq!(layer_id, id);
                assert!(only_dirty);
                assert!(context.ends_with("undo"));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_receiver_is_ignored() {
        let mut notifier = RenderNotifier::default();
        drop(notifier.subscribe());
        notifier.request_preview(LayerId::new());
    }
}
