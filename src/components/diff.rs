// ============================================================================
// DIFFS – reversible before/after records gathered during one gesture
// ============================================================================

use std::collections::HashMap;

use crate::canvas::{Position, Rgba};
use crate::tiles::TileIndex;

pub const DEFAULT_DIFF_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelDiff {
    pub position: Position,
    pub before: Rgba,
    pub after: Rgba,
}

/// Bulk fill of one tile. Only recorded for tiles that were uniform before
/// the fill, so `before` always exists; fills over mixed tiles are recorded
/// as pixel diffs instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileDiff {
    pub index: TileIndex,
    pub before: Rgba,
    pub after: Rgba,
}

/// Full-buffer snapshot pair for operations that touch most of the layer.
#[derive(Clone, PartialEq, Eq)]
pub struct WholeDiff {
    pub width: u32,
    pub height: u32,
    pub before: Vec<u8>,
    pub after: Vec<u8>,
}

impl std::fmt::Debug for WholeDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WholeDiff")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.before.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diff {
    Pixel(PixelDiff),
    Tile(TileDiff),
    Whole(WholeDiff),
}

/// Deterministic key under which a diff is stored. Writes that share a key
/// within one gesture collapse into a single entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffKey {
    Pixel(Position),
    Tile(TileIndex),
    Whole,
}

impl Diff {
    pub fn key(&self) -> DiffKey {
        match self {
            Diff::Pixel(d) => DiffKey::Pixel(d.position),
            Diff::Tile(d) => DiffKey::Tile(d.index),
            Diff::Whole(_) => DiffKey::Whole,
        }
    }

    fn memory_size(&self) -> usize {
        match self {
            Diff::Pixel(_) | Diff::Tile(_) => std::mem::size_of::<Diff>(),
            Diff::Whole(d) => std::mem::size_of::<Diff>() + d.before.len() + d.after.len(),
        }
    }
}

// ============================================================================
// DIFF ACTION – the deduplicated diff set of one gesture
// ============================================================================

/// Deduplicated diff set of one gesture.
///
/// Every entry keeps the value its location had when the gesture started as
/// `before`, and the latest value as `after`. Replay order is fixed by kind:
/// undo restores tiles before pixels (a whole snapshot alone restores
/// everything), redo applies the whole snapshot, then tiles, then pixels.
#[derive(Debug, Clone)]
pub struct DiffAction {
    diffs: HashMap<DiffKey, Diff>,
    tile_size: u32,
    /// Number of pixel entries per tile, so tile fills only revisit tiles that have some.
    pixels_per_tile: HashMap<TileIndex, u32>,
}

impl DiffAction {
    pub fn new(tile_size: u32) -> Self {
        Self {
            diffs: HashMap::new(),
            tile_size: tile_size.max(1),
            pixels_per_tile: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.diffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diffs.is_empty()
    }

    pub fn get(&self, key: DiffKey) -> Option<&Diff> {
        self.diffs.get(&key)
    }

    pub fn contains_pixel(&self, pos: Position) -> bool {
        self.diffs.contains_key(&DiffKey::Pixel(pos))
    }

    pub fn diffs(&self) -> impl Iterator<Item = &Diff> {
        self.diffs.values()
    }

    pub fn memory_size(&self) -> usize {
        self.diffs.values().map(Diff::memory_size).sum::<usize>()
            + self.diffs.len() * std::mem::size_of::<DiffKey>()
    }

    fn tile_of(&self, pos: Position) -> TileIndex {
        TileIndex::new(pos.y as u32 / self.tile_size, pos.x as u32 / self.tile_size)
    }

    fn whole_mut(&mut self) -> Option<&mut WholeDiff> {
        match self.diffs.get_mut(&DiffKey::Whole) {
            Some(Diff::Whole(w)) => Some(w),
            _ => None,
        }
    }

    // ---- merging ------------------------------------------------------------

    pub(crate) fn merge_pixel(&mut self, diff: PixelDiff) {
        let key = DiffKey::Pixel(diff.position);
        if let Some(Diff::Pixel(existing)) = self.diffs.get_mut(&key) {
            existing.after = diff.after;
            return;
        }

        let mut diff = diff;
        let tile = self.tile_of(diff.position);
        if !self.diffs.contains_key(&DiffKey::Whole) {
            // The tile fill already recorded this pixel's pre-gesture color.
            if let Some(Diff::Tile(t)) = self.diffs.get(&DiffKey::Tile(tile)) {
                diff.before = t.before;
            }
        }
        *self.pixels_per_tile.entry(tile).or_insert(0) += 1;
        self.diffs.insert(key, Diff::Pixel(diff));
    }

    pub(crate) fn merge_tile(&mut self, diff: TileDiff) {
        let key = DiffKey::Tile(diff.index);
        match self.diffs.get_mut(&key) {
            Some(Diff::Tile(existing)) => existing.after = diff.after,
            _ => {
                self.diffs.insert(key, Diff::Tile(diff));
            }
        }

        // Pixels of this tile written earlier in the gesture now hold the fill color.
        if self.pixels_per_tile.get(&diff.index).copied().unwrap_or(0) == 0 {
            return;
        }
        let ts = self.tile_size as i32;
        let (x0, y0) = (diff.index.column as i32 * ts, diff.index.row as i32 * ts);
        for y in y0..y0 + ts {
            for x in x0..x0 + ts {
                if let Some(Diff::Pixel(p)) = self.diffs.get_mut(&DiffKey::Pixel(Position::new(x, y))) {
                    p.after = diff.after;
                }
            }
        }
    }

    /// Fold a whole-buffer diff in. Earlier pixel/tile entries are absorbed:
    /// their pre-gesture colors are written into the snapshot's `before`.
    pub(crate) fn merge_whole(&mut self, diff: WholeDiff) {
        if let Some(existing) = self.whole_mut() {
            existing.after = diff.after;
        } else {
            let mut before = diff.before;
            let stride = diff.width as usize * 4;
            let mut restore = |pos: Position, color: Rgba| {
                if pos.x < 0 || pos.y < 0 || pos.x as u32 >= diff.width || pos.y as u32 >= diff.height {
                    return;
                }
                let o = pos.y as usize * stride + pos.x as usize * 4;
                before[o..o + 4].copy_from_slice(&color.to_array());
            };
            let ts = self.tile_size as i32;
            for d in self.diffs.values() {
                if let Diff::Tile(t) = d {
                    let (x0, y0) = (t.index.column as i32 * ts, t.index.row as i32 * ts);
                    for y in y0..y0 + ts {
                        for x in x0..x0 + ts {
                            restore(Position::new(x, y), t.before);
                        }
                    }
                }
            }
            for d in self.diffs.values() {
                if let Diff::Pixel(p) = d {
                    restore(p.position, p.before);
                }
            }
            self.diffs.insert(
                DiffKey::Whole,
                Diff::Whole(WholeDiff {
                    width: diff.width,
                    height: diff.height,
                    before,
                    after: diff.after,
                }),
            );
        }
        self.diffs.retain(|k, _| *k == DiffKey::Whole);
        self.pixels_per_tile.clear();
    }

    // ---- replay order -------------------------------------------------------

    /// Diffs in the order undo must apply their `before` values.
    pub fn undo_order(&self) -> Vec<&Diff> {
        if let Some(whole) = self.diffs.get(&DiffKey::Whole) {
            return vec![whole];
        }
        let tiles = self.diffs.values().filter(|d| matches!(d, Diff::Tile(_)));
        let pixels = self.diffs.values().filter(|d| matches!(d, Diff::Pixel(_)));
        tiles.chain(pixels).collect()
    }

    /// Diffs in the order redo must apply their `after` values.
    pub fn redo_order(&self) -> Vec<&Diff> {
        let whole = self.diffs.get(&DiffKey::Whole);
        let tiles = self.diffs.values().filter(|d| matches!(d, Diff::Tile(_)));
        let pixels = self.diffs.values().filter(|d| matches!(d, Diff::Pixel(_)));
        whole.into_iter().chain(tiles).chain(pixels).collect()
    }
}

// ============================================================================
// DIFF RECORDER – batches the high-frequency pixel diffs of a gesture
// ============================================================================

pub struct DiffRecorder {
    current: DiffAction,
    pixel_batch: HashMap<Position, PixelDiff>,
    batch_size: usize,
    tile_size: u32,
}

impl DiffRecorder {
    pub fn new(tile_size: u32, batch_size: usize) -> Self {
        Self {
            current: DiffAction::new(tile_size),
            pixel_batch: HashMap::new(),
            batch_size: batch_size.max(1),
            tile_size,
        }
    }

    /// The action as committed so far. Pending batched pixels are not
    /// included until [`flush`](Self::flush).
    pub fn current(&self) -> &DiffAction {
        &self.current
    }

    pub fn has_pending(&self) -> bool {
        !self.current.is_empty() || !self.pixel_batch.is_empty()
    }

    /// Queue a pixel diff. Repeated writes keep the first `before`.
    pub fn add_pixel_diff(&mut self, diff: PixelDiff) {
        self.pixel_batch
            .entry(diff.position)
            .and_modify(|d| d.after = diff.after)
            .or_insert(diff);
        if self.pixel_batch.len() >= self.batch_size {
            self.flush();
        }
    }

    pub fn add_tile_diff(&mut self, diff: TileDiff) {
        self.flush();
        self.current.merge_tile(diff);
    }

    pub fn add_whole_diff(&mut self, diff: WholeDiff) {
        self.flush();
        self.current.merge_whole(diff);
    }

    pub fn add(&mut self, diff: Diff) {
        match diff {
            Diff::Pixel(d) => self.add_pixel_diff(d),
            Diff::Tile(d) => self.add_tile_diff(d),
            Diff::Whole(d) => self.add_whole_diff(d),
        }
    }

    /// Commit the pending pixel batch into the current action.
    pub fn flush(&mut self) {
        if self.pixel_batch.is_empty() {
            return;
        }
        for (_, diff) in self.pixel_batch.drain() {
            self.current.merge_pixel(diff);
        }
    }

    pub fn is_diff_exists(&self, pos: Position) -> bool {
        self.pixel_batch.contains_key(&pos) || self.current.contains_pixel(pos)
    }

    /// Flush, then drop the current action and start a fresh one.
    pub fn reset(&mut self) {
        self.flush();
        self.current = DiffAction::new(self.tile_size);
    }

    /// Flush and hand over the current action, leaving a fresh one behind.
    pub fn take(&mut self) -> DiffAction {
        self.flush();
        std::mem::replace(&mut self.current, DiffAction::new(self.tile_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba = Rgba::new(255, 0, 0, 255);
    const GREEN: Rgba = Rgba::new(0, 255, 0, 255);
    const BLUE: Rgba = Rgba::new(0, 0, 255, 255);

    fn px(x: i32, y: i32, before: Rgba, after: Rgba) -> PixelDiff {
        PixelDiff {
            position: Position::new(x, y),
            before,
            after,
        }
    }

    #[test]
    fn repeated_writes_keep_first_before() {
        let mut recorder = DiffRecorder::new(4, 100);
        recorder.add_pixel_diff(px(1, 1, Rgba::TRANSPARENT, RED));
        recorder.add_pixel_diff(px(1, 1, RED, GREEN));
        let action = recorder.take();
        assert_eq!(action.len(), 1);
        assert_eq!(
            action.get(DiffKey::Pixel(Position::new(1, 1))),
            Some(&Diff::Pixel(px(1, 1, Rgba::TRANSPARENT, GREEN)))
        );
    }

    #[test]
    fn batch_flushes_at_threshold() {
        let mut recorder = DiffRecorder::new(4, 3);
        recorder.add_pixel_diff(px(0, 0, RED, GREEN));
        recorder.add_pixel_diff(px(1, 0, RED, GREEN));
        assert!(recorder.current().is_empty());
        assert!(recorder.is_diff_exists(Position::new(1, 0)));
        recorder.add_pixel_diff(px(2, 0, RED, GREEN));
        assert_eq!(recorder.current().len(), 3);
    }

    #[test]
    fn merge_across_flush_keeps_first_before() {
        let mut recorder = DiffRecorder::new(4, 1);
        recorder.add_pixel_diff(px(0, 0, RED, GREEN));
        recorder.add_pixel_diff(px(0, 0, GREEN, BLUE));
        let action = recorder.take();
        assert_eq!(
            action.get(DiffKey::Pixel(Position::new(0, 0))),
            Some(&Diff::Pixel(px(0, 0, RED, BLUE)))
        );
    }

    #[test]
    fn tile_diff_commits_immediately_and_updates_earlier_pixels() {
        let mut recorder = DiffRecorder::new(4, 100);
        recorder.add_pixel_diff(px(1, 1, RED, RED));
        recorder.add_tile_diff(TileDiff {
            index: TileIndex::new(0, 0),
            before: RED,
            after: BLUE,
        });
        let action = recorder.current();
        assert_eq!(action.len(), 2);
        assert_eq!(
            action.get(DiffKey::Pixel(Position::new(1, 1))),
            Some(&Diff::Pixel(px(1, 1, RED, BLUE)))
        );
    }

    #[test]
    fn pixel_after_tile_fill_inherits_pre_fill_color() {
        let mut recorder = DiffRecorder::new(4, 100);
        recorder.add_tile_diff(TileDiff {
            index: TileIndex::new(0, 0),
            before: RED,
            after: BLUE,
        });
        recorder.add_pixel_diff(px(2, 2, BLUE, GREEN));
        let action = recorder.take();
        assert_eq!(
            action.get(DiffKey::Pixel(Position::new(2, 2))),
            Some(&Diff::Pixel(px(2, 2, RED, GREEN)))
        );
        let order = action.undo_order();
        assert!(matches!(order[0], Diff::Tile(_)));
        assert!(matches!(order[1], Diff::Pixel(_)));
    }

    #[test]
    fn second_fill_of_same_tile_collapses() {
        let mut action = DiffAction::new(4);
        action.merge_tile(TileDiff { index: TileIndex::new(0, 0), before: RED, after: GREEN });
        action.merge_tile(TileDiff { index: TileIndex::new(0, 0), before: GREEN, after: BLUE });
        assert_eq!(action.len(), 1);
        assert_eq!(
            action.get(DiffKey::Tile(TileIndex::new(0, 0))),
            Some(&Diff::Tile(TileDiff { index: TileIndex::new(0, 0), before: RED, after: BLUE }))
        );
    }

    #[test]
    fn whole_diff_absorbs_earlier_entries() {
        let mut recorder = DiffRecorder::new(2, 100);
        recorder.add_pixel_diff(px(1, 0, Rgba::TRANSPARENT, RED));
        let mut before = vec![0u8; 2 * 2 * 4];
        before[4..8].copy_from_slice(&RED.to_array());
        recorder.add_whole_diff(WholeDiff {
            width: 2,
            height: 2,
            before,
            after: vec![255; 16],
        });
        let action = recorder.take();
        assert_eq!(action.len(), 1);
        match action.get(DiffKey::Whole) {
            Some(Diff::Whole(w)) => assert!(w.before.iter().all(|b| *b == 0)),
            other => panic!("expected whole diff, got {:?}", other),
        }
    }

    #[test]
    fn reset_starts_fresh_action() {
        let mut recorder = DiffRecorder::new(4, 100);
        recorder.add_pixel_diff(px(0, 0, RED, GREEN));
        recorder.reset();
        assert!(!recorder.has_pending());
        assert!(!recorder.is_diff_exists(Position::new(0, 0)));
    }
}
