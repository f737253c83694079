// ============================================================================
// TILE GRID – coarse dirty / uniform-color tracking over a PixelBuffer
// ============================================================================

use rayon::prelude::*;

use crate::canvas::{PixelBuffer, Position, Rgba};

pub const DEFAULT_TILE_SIZE: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileIndex {
    pub row: u32,
    pub column: u32,
}

impl TileIndex {
    pub const fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }
}

/// Pixel footprint of a tile, clipped to the buffer edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl TileRect {
    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        (self.y..self.y + self.height).flat_map(move |y| {
            (self.x..self.x + self.width).map(move |x| Position::new(x as i32, y as i32))
        })
    }
}

/// `is_uniform` implies every pixel of the tile equals `uniform_color`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub index: TileIndex,
    pub is_dirty: bool,
    pub is_uniform: bool,
    pub uniform_color: Option<Rgba>,
}

/// Outcome of [`TileGrid::fill_whole_tile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileFill {
    /// The tile already was uniform in the fill color; nothing was written.
    Unchanged,
    /// The tile was overwritten. `previous_uniform` is `None` when it held mixed content.
    Filled { previous_uniform: Option<Rgba> },
}

pub struct TileGrid {
    tile_size: u32,
    width: u32,
    height: u32,
    rows: u32,
    columns: u32,
    tiles: Vec<Tile>,
}

impl TileGrid {
    /// Build the grid for `buffer` and scan every tile for uniformity.
    pub fn new(buffer: &PixelBuffer, tile_size: u32) -> Self {
        let mut grid = Self {
            tile_size: tile_size.max(1),
            width: 0,
            height: 0,
            rows: 0,
            columns: 0,
            tiles: Vec::new(),
        };
        grid.rebuild(buffer);
        grid
    }

    /// Re-lay out the grid for the buffer's current size, rescan uniformity
    /// and mark everything dirty.
    pub fn rebuild(&mut self, buffer: &PixelBuffer) {
        self.width = buffer.width();
        self.height = buffer.height();
        self.rows = self.height.div_ceil(self.tile_size);
        self.columns = self.width.div_ceil(self.tile_size);
        self.tiles = (0..self.rows)
            .flat_map(|row| {
                (0..self.columns).map(move |column| Tile {
                    index: TileIndex::new(row, column),
                    is_dirty: true,
                    is_uniform: false,
                    uniform_color: None,
                })
            })
            .collect();
        self.scan_uniformity(buffer);
    }

    /// Recompute `is_uniform` / `uniform_color` for every tile from the pixels.
    pub fn scan_uniformity(&mut self, buffer: &PixelBuffer) {
        let tile_size = self.tile_size;
        let (width, height) = (self.width, self.height);
        self.tiles.par_iter_mut().for_each(|tile| {
            let rect = clipped_rect(tile.index, tile_size, width, height);
            let base = buffer.get_pixel(Position::new(rect.x as i32, rect.y as i32));
            let uniform = rect.positions().all(|p| buffer.get_pixel(p) == base);
            tile.is_uniform = uniform;
            tile.uniform_color = uniform.then_some(base);
        });
    }

    // ---- geometry -----------------------------------------------------------

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn row_count(&self) -> u32 {
        self.rows
    }

    pub fn column_count(&self) -> u32 {
        self.columns
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Tile housing `pos`. Callers bounds-check the position first.
    #[inline]
    pub fn tile_index(&self, pos: Position) -> TileIndex {
        TileIndex::new(pos.y.max(0) as u32 / self.tile_size, pos.x.max(0) as u32 / self.tile_size)
    }

    #[inline]
    pub fn is_tile_in_bounds(&self, index: TileIndex) -> bool {
        index.row < self.rows && index.column < self.columns
    }

    #[inline]
    pub fn flat_index(&self, index: TileIndex) -> usize {
        index.row as usize * self.columns as usize + index.column as usize
    }

    pub fn tile(&self, index: TileIndex) -> &Tile {
        &self.tiles[self.flat_index(index)]
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn tile_rect(&self, index: TileIndex) -> TileRect {
        clipped_rect(index, self.tile_size, self.width, self.height)
    }

    /// In-bounds 4-neighbours of a tile.
    pub fn neighbors(&self, index: TileIndex) -> impl Iterator<Item = TileIndex> + '_ {
        let TileIndex { row, column } = index;
        [
            row.checked_sub(1).map(|r| TileIndex::new(r, column)),
            Some(TileIndex::new(row + 1, column)),
            column.checked_sub(1).map(|c| TileIndex::new(row, c)),
            Some(TileIndex::new(row, column + 1)),
        ]
        .into_iter()
        .flatten()
        .filter(move |t| self.is_tile_in_bounds(*t))
    }

    pub fn is_uniform_with(&self, index: TileIndex, color: Rgba) -> bool {
        let tile = self.tile(index);
        tile.is_uniform && tile.uniform_color == Some(color)
    }

    // ---- dirty tracking -----------------------------------------------------

    pub fn mark_dirty(&mut self, index: TileIndex) {
        let i = self.flat_index(index);
        self.tiles[i].is_dirty = true;
    }

    pub fn set_all_dirty(&mut self) {
        for tile in &mut self.tiles {
            tile.is_dirty = true;
        }
    }

    /// Clear every dirty flag. Called by the consumer after it drained the dirty tiles.
    pub fn reset_dirty_states(&mut self) {
        for tile in &mut self.tiles {
            tile.is_dirty = false;
        }
    }

    pub fn dirty_tiles(&self) -> Vec<TileIndex> {
        self.tiles.iter().filter(|t| t.is_dirty).map(|t| t.index).collect()
    }

    // ---- mutation -----------------------------------------------------------

    /// Bookkeeping after a single pixel at `pos` was set to `color`.
    #[inline]
    pub fn note_pixel_write(&mut self, pos: Position, color: Rgba) {
        let i = self.flat_index(self.tile_index(pos));
        let tile = &mut self.tiles[i];
        tile.is_dirty = true;
        if tile.is_uniform && tile.uniform_color != Some(color) {
            tile.is_uniform = false;
            tile.uniform_color = None;
        }
    }

    /// Paint the whole (clipped) tile with `color` and mark it uniform.
    pub fn fill_whole_tile(&mut self, buffer: &mut PixelBuffer, index: TileIndex, color: Rgba) -> TileFill {
        let i = self.flat_index(index);
        let before = self.tiles[i];
        if before.is_uniform && before.uniform_color == Some(color) {
            return TileFill::Unchanged;
        }

        let rect = self.tile_rect(index);
        buffer.fill_rect(rect.x, rect.y, rect.width, rect.height, color);

        let tile = &mut self.tiles[i];
        tile.is_dirty = true;
        tile.is_uniform = true;
        tile.uniform_color = Some(color);
        TileFill::Filled {
            previous_uniform: if before.is_uniform { before.uniform_color } else { None },
        }
    }
}

fn clipped_rect(index: TileIndex, tile_size: u32, width: u32, height: u32) -> TileRect {
    let x = index.column * tile_size;
    let y = index.row * tile_size;
    TileRect {
        x,
        y,
        width: tile_size.min(width.saturating_sub(x)),
        height: tile_size.min(height.saturating_sub(y)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba = Rgba::new(255, 0, 0, 255);
    const BLUE: Rgba = Rgba::new(0, 0, 255, 255);

    #[test]
    fn grid_dimensions_round_up() {
        let buffer = PixelBuffer::new(70, 33);
        let grid = TileGrid::new(&buffer, 32);
        assert_eq!(grid.column_count(), 3);
        assert_eq!(grid.row_count(), 2);
        assert_eq!(grid.tile_index(Position::new(69, 32)), TileIndex::new(1, 2));
        assert_eq!(
            grid.tile_rect(TileIndex::new(1, 2)),
            TileRect { x: 64, y: 32, width: 6, height: 1 }
        );
    }

    #[test]
    fn initial_scan_detects_uniform_and_mixed_tiles() {
        let mut buffer = PixelBuffer::filled(8, 4, RED);
        buffer.set_raw_pixel(Position::new(5, 1), BLUE);
        let grid = TileGrid::new(&buffer, 4);
        assert!(grid.is_uniform_with(TileIndex::new(0, 0), RED));
        let mixed = grid.tile(TileIndex::new(0, 1));
        assert!(!mixed.is_uniform);
        assert_eq!(mixed.uniform_color, None);
    }

    #[test]
    fn differing_pixel_write_clears_uniformity() {
        let mut buffer = PixelBuffer::filled(4, 4, RED);
        let mut grid = TileGrid::new(&buffer, 4);
        grid.reset_dirty_states();

        buffer.set_raw_pixel(Position::new(1, 1), RED);
        grid.note_pixel_write(Position::new(1, 1), RED);
        assert!(grid.is_uniform_with(TileIndex::new(0, 0), RED));

        buffer.set_raw_pixel(Position::new(1, 1), BLUE);
        grid.note_pixel_write(Position::new(1, 1), BLUE);
        let tile = grid.tile(TileIndex::new(0, 0));
        assert!(!tile.is_uniform);
        assert!(tile.is_dirty);
    }

    #[test]
    fn fill_whole_tile_clips_partial_tiles() {
        let mut buffer = PixelBuffer::new(5, 5);
        let mut grid = TileGrid::new(&buffer, 4);
        grid.reset_dirty_states();

        let outcome = grid.fill_whole_tile(&mut buffer, TileIndex::new(1, 1), BLUE);
        assert_eq!(outcome, TileFill::Filled { previous_uniform: Some(Rgba::TRANSPARENT) });
        assert_eq!(buffer.get_pixel(Position::new(4, 4)), BLUE);
        assert_eq!(buffer.get_pixel(Position::new(3, 4)), Rgba::TRANSPARENT);
        assert!(grid.is_uniform_with(TileIndex::new(1, 1), BLUE));
        assert_eq!(grid.dirty_tiles(), vec![TileIndex::new(1, 1)]);

        assert_eq!(grid.fill_whole_tile(&mut buffer, TileIndex::new(1, 1), BLUE), TileFill::Unchanged);
    }

    #[test]
    fn filling_mixed_tile_reports_no_previous_color() {
        let mut buffer = PixelBuffer::new(4, 4);
        buffer.set_raw_pixel(Position::new(0, 0), RED);
        let mut grid = TileGrid::new(&buffer, 4);
        let outcome = grid.fill_whole_tile(&mut buffer, TileIndex::new(0, 0), BLUE);
        assert_eq!(outcome, TileFill::Filled { previous_uniform: None });
    }

    #[test]
    fn neighbors_stay_in_bounds() {
        let buffer = PixelBuffer::new(8, 8);
        let grid = TileGrid::new(&buffer, 4);
        let mut corner: Vec<_> = grid.neighbors(TileIndex::new(0, 0)).collect();
        corner.sort();
        assert_eq!(corner, vec![TileIndex::new(0, 1), TileIndex::new(1, 0)]);
    }

    #[test]
    fn dirty_flags_persist_until_reset() {
        let buffer = PixelBuffer::new(8, 8);
        let mut grid = TileGrid::new(&buffer, 4);
        assert_eq!(grid.dirty_tiles().len(), 4);
        grid.reset_dirty_states();
        assert!(grid.dirty_tiles().is_empty());
        grid.mark_dirty(TileIndex::new(1, 0));
        assert_eq!(grid.dirty_tiles(), vec![TileIndex::new(1, 0)]);
        grid.set_all_dirty();
        assert_eq!(grid.dirty_tiles().len(), 4);
    }
}
