use std::collections::HashMap;
use std::fmt;

use image::RgbaImage;
use rayon::prelude::*;
use uuid::Uuid;

use crate::components::diff::PixelDiff;
use crate::components::layers::LayerEditAgent;
use crate::error::EngineError;
use crate::events::{RenderEvent, RenderNotifier};

// ============================================================================
// COLOR & GEOMETRY
// ============================================================================

/// 8-bit RGBA color with named channels. Equality is exact per component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);
    pub const BLACK: Rgba = Rgba::new(0, 0, 0, 255);
    pub const WHITE: Rgba = Rgba::new(255, 255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn from_array(c: [u8; 4]) -> Self {
        Self::new(c[0], c[1], c[2], c[3])
    }

    pub const fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// ARGB packed into one word (alpha in the top byte).
    pub const fn packed(self) -> u32 {
        ((self.a as u32) << 24) | ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }

    pub const fn from_packed(p: u32) -> Self {
        Self::new((p >> 16) as u8, (p >> 8) as u8, p as u8, (p >> 24) as u8)
    }

    /// Parse `RRGGBB` or `RRGGBBAA` (optional leading `#`).
    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.trim().trim_start_matches('#');
        let channel = |i: usize| u8::from_str_radix(s.get(i..i + 2)?, 16).ok();
        match s.len() {
            6 => Some(Self::new(channel(0)?, channel(2)?, channel(4)?, 255)),
            8 => Some(Self::new(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
            _ => None,
        }
    }
}

impl From<image::Rgba<u8>> for Rgba {
    fn from(p: image::Rgba<u8>) -> Self {
        Self::from_array(p.0)
    }
}

impl From<Rgba> for image::Rgba<u8> {
    fn from(c: Rgba) -> Self {
        image::Rgba(c.to_array())
    }
}

/// Pixel position in layer space. Signed so tools can report positions past
/// the canvas edge; those are simply out of bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn byte_len(self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Stable identifier of a layer within a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerId(Uuid);

impl LayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// PIXEL BUFFER – flat RGBA storage for one layer
// ============================================================================

/// Flat row-major RGBA buffer. `data.len() == width * height * 4` always holds.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl PixelBuffer {
    // ---- construction -------------------------------------------------------

    /// Fully transparent buffer.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; Size::new(width, height).byte_len()],
        }
    }

    pub fn filled(width: u32, height: u32, color: Rgba) -> Self {
        let mut buffer = Self::new(width, height);
        let px = color.to_array();
        buffer.data.par_chunks_exact_mut(4).for_each(|p| p.copy_from_slice(&px));
        buffer
    }

    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self, EngineError> {
        let expected = Size::new(width, height).byte_len();
        if data.len() != expected {
            return Err(EngineError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { width, height, data })
    }

    pub fn from_rgba_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw(),
        }
    }

    pub fn to_rgba_image(&self) -> RgbaImage {
        // Length invariant guarantees from_raw succeeds.
        RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }

    // ---- accessors ----------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Copy of the raw bytes, for whole-buffer diffs and snapshots.
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.clone()
    }

    pub fn memory_bytes(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_in_bounds(&self, pos: Position) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as u32) < self.width && (pos.y as u32) < self.height
    }

    #[inline(always)]
    fn offset(&self, pos: Position) -> Option<usize> {
        if !self.is_in_bounds(pos) {
            return None;
        }
        Some((pos.y as usize * self.width as usize + pos.x as usize) * 4)
    }

    // ---- pixel access -------------------------------------------------------

    /// Read a pixel. Out-of-bounds reads return transparent black.
    #[inline]
    pub fn get_pixel(&self, pos: Position) -> Rgba {
        match self.offset(pos) {
            Some(o) => Rgba::new(self.data[o], self.data[o + 1], self.data[o + 2], self.data[o + 3]),
            None => Rgba::TRANSPARENT,
        }
    }

    /// Overwrite one pixel and report what it was. The diff is returned even
    /// when `before == after`; deduplication belongs to the caller.
    #[inline]
    pub fn set_raw_pixel(&mut self, pos: Position, color: Rgba) -> Option<PixelDiff> {
        let o = self.offset(pos)?;
        let before = Rgba::new(self.data[o], self.data[o + 1], self.data[o + 2], self.data[o + 3]);
        self.data[o..o + 4].copy_from_slice(&color.to_array());
        Some(PixelDiff {
            position: pos,
            before,
            after: color,
        })
    }

    /// Fill a rectangle already clipped to the buffer.
    pub(crate) fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, color: Rgba) {
        debug_assert!(x + w <= self.width && y + h <= self.height);
        let px = color.to_array();
        let stride = self.width as usize * 4;
        for row in y..y + h {
            let start = row as usize * stride + x as usize * 4;
            for p in self.data[start..start + w as usize * 4].chunks_exact_mut(4) {
                p.copy_from_slice(&px);
            }
        }
    }

    // ---- bulk operations ----------------------------------------------------

    /// Swap in new pixel data of the same dimensions.
    pub fn replace_data(&mut self, data: Vec<u8>) -> Result<(), EngineError> {
        if data.len() != self.data.len() {
            return Err(EngineError::BufferSizeMismatch {
                expected: self.data.len(),
                actual: data.len(),
            });
        }
        self.data = data;
        Ok(())
    }

    /// Reallocate to `new_size`, copying the overlapping rectangle.
    ///
    /// Pixel `(src_origin + d)` of the old buffer lands on `(dest_origin + d)`
    /// of the new one. The copy extent per axis is
    /// `min(old - src_origin, new - dest_origin)`; everything else is left
    /// transparent.
    pub fn resize(&mut self, new_size: Size, dest_origin: (u32, u32), src_origin: (u32, u32)) {
        let (old_w, old_h) = (self.width, self.height);
        let (new_w, new_h) = (new_size.width, new_size.height);
        let mut new_data = vec![0u8; new_size.byte_len()];

        let copy_w = old_w.saturating_sub(src_origin.0).min(new_w.saturating_sub(dest_origin.0)) as usize;
        let copy_h = old_h.saturating_sub(src_origin.1).min(new_h.saturating_sub(dest_origin.1)) as usize;

        if copy_w > 0 && copy_h > 0 {
            let old_data = &self.data;
            let old_stride = old_w as usize * 4;
            let new_stride = new_w as usize * 4;
            let dest_y0 = dest_origin.1 as usize;
            new_data
                .par_chunks_exact_mut(new_stride)
                .enumerate()
                .skip(dest_y0)
                .take(copy_h)
                .for_each(|(row, dst_row)| {
                    let src_y = row - dest_y0 + src_origin.1 as usize;
                    let src_start = src_y * old_stride + src_origin.0 as usize * 4;
                    let dst_start = dest_origin.0 as usize * 4;
                    dst_row[dst_start..dst_start + copy_w * 4]
                        .copy_from_slice(&old_data[src_start..src_start + copy_w * 4]);
                });
        }

        self.data = new_data;
        self.width = new_w;
        self.height = new_h;
    }
}

// ============================================================================
// CANVAS STATE – the per-document layer registry
// ============================================================================

/// All layers of one document plus the shared canvas dimensions.
///
/// History actions receive `&mut CanvasState` when they are replayed, so they
/// never hold references into the layers themselves.
pub struct CanvasState {
    pub width: u32,
    pub height: u32,
    layers: HashMap<LayerId, LayerEditAgent>,
    layer_order: Vec<LayerId>,
    pub active_layer: Option<LayerId>,
    tile_size: u32,
    diff_batch_size: usize,
    notifier: RenderNotifier,
}

impl CanvasState {
    pub fn new(width: u32, height: u32, tile_size: u32, diff_batch_size: usize) -> Self {
        Self {
            width,
            height,
            layers: HashMap::new(),
            layer_order: Vec::new(),
            active_layer: None,
            tile_size: tile_size.max(1),
            diff_batch_size,
            notifier: RenderNotifier::default(),
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Add a layer filled with `color` on top of the stack and make it active.
    pub fn add_layer(&mut self, color: Rgba) -> LayerId {
        let buffer = PixelBuffer::filled(self.width, self.height, color);
        self.insert_layer(buffer)
    }

    /// Add a layer from existing pixels. The buffer must match the canvas size.
    pub fn add_layer_from_buffer(&mut self, buffer: PixelBuffer) -> Result<LayerId, EngineError> {
        if buffer.size() != self.size() {
            return Err(EngineError::BufferSizeMismatch {
                expected: self.size().byte_len(),
                actual: buffer.data().len(),
            });
        }
        Ok(self.insert_layer(buffer))
    }

    fn insert_layer(&mut self, buffer: PixelBuffer) -> LayerId {
        let id = LayerId::new();
        let agent = LayerEditAgent::new(
            id,
            buffer,
            self.tile_size,
            self.diff_batch_size,
            self.notifier.clone(),
        );
        self.layers.insert(id, agent);
        self.layer_order.push(id);
        self.active_layer = Some(id);
        id
    }

    /// Layer ids bottom to top.
    pub fn layer_ids(&self) -> &[LayerId] {
        &self.layer_order
    }

    pub fn contains_layer(&self, id: LayerId) -> bool {
        self.layers.contains_key(&id)
    }

    /// Look up a layer. Unknown ids are logged and yield `None`.
    pub fn layer(&self, id: LayerId) -> Option<&LayerEditAgent> {
        let agent = self.layers.get(&id);
        if agent.is_none() {
            log::warn!("no layer agent registered for {}", id);
        }
        agent
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut LayerEditAgent> {
        let agent = self.layers.get_mut(&id);
        if agent.is_none() {
            log::warn!("no layer agent registered for {}", id);
        }
        agent
    }

    pub fn layers_mut(&mut self) -> impl Iterator<Item = &mut LayerEditAgent> {
        self.layers.values_mut()
    }

    pub(crate) fn set_size(&mut self, size: Size) {
        self.width = size.width;
        self.height = size.height;
        self.notifier.send(RenderEvent::CanvasSizeChanged {
            width: size.width,
            height: size.height,
        });
    }

    pub(crate) fn notifier_mut(&mut self) -> &mut RenderNotifier {
        &mut self.notifier
    }

    /// Re-point every agent at the current notifier (after a new subscription).
    pub(crate) fn propagate_notifier(&mut self) {
        let notifier = self.notifier.clone();
        for agent in self.layers.values_mut() {
            agent.set_notifier(notifier.clone());
        }
    }
}
