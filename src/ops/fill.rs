// ============================================================================
// FLOOD FILL – tile pass first, pixel BFS only along region boundaries
// ============================================================================

use crate::canvas::{Position, Rgba};
use crate::components::layers::LayerEditAgent;
use crate::tiles::{TileGrid, TileIndex};

/// What a fill did. `pixels_visited` counts distinct pixels the pixel pass
/// examined; interiors of bulk-filled tiles are never visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FillReport {
    pub tiles_filled: usize,
    pub pixels_filled: usize,
    pub pixels_visited: usize,
}

impl FillReport {
    pub fn is_noop(&self) -> bool {
        self.tiles_filled == 0 && self.pixels_filled == 0
    }
}

/// Per-fill search state over tiles and pixels.
struct FillSearch<'a> {
    grid: &'a TileGrid,
    target: Rgba,
    width: usize,
    tile_visited: Vec<bool>,
    tile_filled: Vec<bool>,
    pixel_visited: Vec<bool>,
    tiles: Vec<TileIndex>,
}

impl<'a> FillSearch<'a> {
    fn new(grid: &'a TileGrid, target: Rgba, width: u32, height: u32) -> Self {
        Self {
            grid,
            target,
            width: width as usize,
            tile_visited: vec![false; grid.len()],
            tile_filled: vec![false; grid.len()],
            pixel_visited: vec![false; width as usize * height as usize],
            tiles: Vec::new(),
        }
    }

    /// Flood over tiles uniform in the target color, starting at `start`.
    /// Returns the tiles newly filled by this call.
    fn tile_pass(&mut self, start: TileIndex) -> Vec<TileIndex> {
        let mut found = Vec::new();
        let mut stack = vec![start];
        while let Some(ti) = stack.pop() {
            if !self.grid.is_tile_in_bounds(ti) {
                continue;
            }
            let flat = self.grid.flat_index(ti);
            if self.tile_visited[flat] {
                continue;
            }
            self.tile_visited[flat] = true;
            if !self.grid.is_uniform_with(ti, self.target) {
                continue;
            }
            self.tile_filled[flat] = true;
            found.push(ti);
            stack.extend(self.grid.neighbors(ti));
        }
        self.tiles.extend_from_slice(&found);
        found
    }

    fn is_tile_filled(&self, ti: TileIndex) -> bool {
        self.grid.is_tile_in_bounds(ti) && self.tile_filled[self.grid.flat_index(ti)]
    }

    /// Pixels just across every side of `tiles` that does not border another filled tile.
    fn edge_pixels(&self, tiles: &[TileIndex], out: &mut Vec<Position>) {
        for &ti in tiles {
            let rect = self.grid.tile_rect(ti);
            let (x0, y0) = (rect.x as i32, rect.y as i32);
            let (x1, y1) = (x0 + rect.width as i32, y0 + rect.height as i32);

            let up = ti.row.checked_sub(1).map(|r| TileIndex::new(r, ti.column));
            let left = ti.column.checked_sub(1).map(|c| TileIndex::new(ti.row, c));
            let down = TileIndex::new(ti.row + 1, ti.column);
            let right = TileIndex::new(ti.row, ti.column + 1);

            if !up.is_some_and(|t| self.is_tile_filled(t)) {
                out.extend((x0..x1).map(|x| Position::new(x, y0 - 1)));
            }
            if !self.is_tile_filled(down) {
                out.extend((x0..x1).map(|x| Position::new(x, y1)));
            }
            if !left.is_some_and(|t| self.is_tile_filled(t)) {
                out.extend((y0..y1).map(|y| Position::new(x0 - 1, y)));
            }
            if !self.is_tile_filled(right) {
                out.extend((y0..y1).map(|y| Position::new(x1, y)));
            }
        }
    }
}

/// Replace the 4-connected region of `seed`'s color with `color`, recording
/// the edit in the agent's current gesture.
///
/// A seed out of bounds or already holding `color` is a no-op.
pub fn flood_fill(agent: &mut LayerEditAgent, seed: Position, color: Rgba) -> FillReport {
    let buffer = agent.buffer();
    if !buffer.is_in_bounds(seed) {
        return FillReport::default();
    }
    let target = buffer.get_pixel(seed);
    if target == color {
        return FillReport::default();
    }

    let mut report = FillReport::default();
    let mut pixels: Vec<Position> = Vec::new();
    let tiles = {
        let grid = agent.tiles();
        let mut search = FillSearch::new(grid, target, buffer.width(), buffer.height());

        let first = search.tile_pass(grid.tile_index(seed));
        let mut queue = Vec::new();
        if first.is_empty() {
            queue.push(seed);
        } else {
            search.edge_pixels(&first, &mut queue);
        }
        log::debug!("flood fill: initial tile pass filled {} tiles", first.len());

        while let Some(p) = queue.pop() {
            if !buffer.is_in_bounds(p) {
                continue;
            }
            let ti = grid.tile_index(p);
            let flat = grid.flat_index(ti);
            if search.tile_filled[flat] {
                continue;
            }
            let idx = p.y as usize * search.width + p.x as usize;
            if search.pixel_visited[idx] {
                continue;
            }
            search.pixel_visited[idx] = true;
            report.pixels_visited += 1;

            if !search.tile_visited[flat] && grid.is_uniform_with(ti, target) {
                let reentered = search.tile_pass(ti);
                log::trace!("flood fill: re-entered tile pass, {} tiles", reentered.len());
                search.edge_pixels(&reentered, &mut queue);
                continue;
            }

            if buffer.get_pixel(p) != target {
                continue;
            }
            pixels.push(p);
            queue.extend([
                Position::new(p.x + 1, p.y),
                Position::new(p.x - 1, p.y),
                Position::new(p.x, p.y + 1),
                Position::new(p.x, p.y - 1),
            ]);
        }
        search.tiles
    };

    for &ti in &tiles {
        agent.fill_whole_tile(ti, color, true);
    }
    for &p in &pixels {
        agent.draw_pixel(p, color);
    }

    report.tiles_filled = tiles.len();
    report.pixels_filled = pixels.len();
    log::debug!(
        "flood fill finished: {} tiles, {} pixels, {} pixels visited",
        report.tiles_filled,
        report.pixels_filled,
        report.pixels_visited
    );
    if !report.is_noop() {
        agent.notify("fill");
    }
    report
}

// ============================================================================
// MASKED FILL – pixel-only fill limited by a selection
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitMode {
    /// Only pixels inside the selection may change.
    Inside,
    /// Only pixels outside the selection may change.
    Outside,
}

/// One bit per pixel; out-of-range positions are unselected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionMask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl SelectionMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![false; width as usize * height as usize],
        }
    }

    pub fn select_rect(&mut self, x: u32, y: u32, w: u32, h: u32) {
        for yy in y..(y + h).min(self.height) {
            for xx in x..(x + w).min(self.width) {
                self.bits[yy as usize * self.width as usize + xx as usize] = true;
            }
        }
    }

    pub fn set(&mut self, pos: Position, selected: bool) {
        if let Some(i) = self.index(pos) {
            self.bits[i] = selected;
        }
    }

    pub fn contains(&self, pos: Position) -> bool {
        self.index(pos).is_some_and(|i| self.bits[i])
    }

    fn index(&self, pos: Position) -> Option<usize> {
        if pos.x < 0 || pos.y < 0 || pos.x as u32 >= self.width || pos.y as u32 >= self.height {
            return None;
        }
        Some(pos.y as usize * self.width as usize + pos.x as usize)
    }
}

pub fn flood_fill_masked(
    agent: &mut LayerEditAgent,
    seed: Position,
    color: Rgba,
    mask: &SelectionMask,
    limit: LimitMode,
) -> FillReport {
    let allowed = |p: Position| match limit {
        LimitMode::Inside => mask.contains(p),
        LimitMode::Outside => !mask.contains(p),
    };

    let buffer = agent.buffer();
    if !buffer.is_in_bounds(seed) || !allowed(seed) {
        return FillReport::default();
    }
    let target = buffer.get_pixel(seed);
    if target == color {
        return FillReport::default();
    }

    let width = buffer.width() as usize;
    let mut visited = vec![false; width * buffer.height() as usize];
    let mut report = FillReport::default();
    let mut pixels = Vec::new();
    let mut stack = vec![seed];
    while let Some(p) = stack.pop() {
        if !buffer.is_in_bounds(p) {
            continue;
        }
        let idx = p.y as usize * width + p.x as usize;
        if visited[idx] {
            continue;
        }
        visited[idx] = true;
        report.pixels_visited += 1;
        if buffer.get_pixel(p) != target || !allowed(p) {
            continue;
        }
        pixels.push(p);
        stack.extend([
            Position::new(p.x + 1, p.y),
            Position::new(p.x - 1, p.y),
            Position::new(p.x, p.y + 1),
            Position::new(p.x, p.y - 1),
        ]);
    }

    for &p in &pixels {
        agent.draw_pixel(p, color);
    }
    report.pixels_filled = pixels.len();
    log::debug!("masked fill finished: {} pixels", report.pixels_filled);
    if !report.is_noop() {
        agent.notify("fill");
    }
    report
}
