use image::codecs::png::PngEncoder;
use image::{ImageEncoder, ImageFormat};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::canvas::{PixelBuffer, Size};
use crate::error::EngineError;
use crate::settings::SnapshotCodecKind;

/// Maximum supported layer dimension in pixels (per axis).
/// Prevents memory exhaustion from crafted snapshots or inputs.
const MAX_CANVAS_DIM: u32 = 32_768;

fn check_dimensions(width: u32, height: u32) -> Result<(), EngineError> {
    if width > MAX_CANVAS_DIM || height > MAX_CANVAS_DIM {
        return Err(EngineError::Codec(format!(
            "{}x{} exceeds the {} pixel limit",
            width, height, MAX_CANVAS_DIM
        )));
    }
    Ok(())
}

// ============================================================================
// SNAPSHOT CODECS
// ============================================================================

/// Turns raw RGBA layer bytes into a storable blob and back.
/// Used by history actions that keep whole-layer snapshots.
pub trait SnapshotCodec: Send + Sync {
    fn encode(&self, width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>, EngineError>;
    fn decode(&self, bytes: &[u8]) -> Result<(u32, u32, Vec<u8>), EngineError>;
}

/// Compact lossless snapshots via the `image` crate's PNG encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngSnapshotCodec;

impl SnapshotCodec for PngSnapshotCodec {
    fn encode(&self, width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>, EngineError> {
        let expected = Size::new(width, height).byte_len();
        if data.len() != expected {
            return Err(EngineError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        let mut out = Vec::new();
        PngEncoder::new(&mut out).write_image(data, width, height, image::ColorType::Rgba8)?;
        Ok(out)
    }

    fn decode(&self, bytes: &[u8]) -> Result<(u32, u32, Vec<u8>), EngineError> {
        let image = image::load_from_memory_with_format(bytes, ImageFormat::Png)?.to_rgba8();
        let (width, height) = image.dimensions();
        check_dimensions(width, height)?;
        Ok((width, height, image.into_raw()))
    }
}

const RAW_SNAPSHOT_MAGIC: &str = "TCS1";

#[derive(Serialize, Deserialize)]
struct RawSnapshot {
    magic: String,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

/// Uncompressed bincode snapshots. Larger than PNG, much faster to produce.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawSnapshotCodec;

impl SnapshotCodec for RawSnapshotCodec {
    fn encode(&self, width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>, EngineError> {
        let expected = Size::new(width, height).byte_len();
        if data.len() != expected {
            return Err(EngineError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        let snapshot = RawSnapshot {
            magic: RAW_SNAPSHOT_MAGIC.to_string(),
            width,
            height,
            pixels: data.to_vec(),
        };
        Ok(bincode::serialize(&snapshot)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<(u32, u32, Vec<u8>), EngineError> {
        let snapshot: RawSnapshot = bincode::deserialize(bytes)?;
        if snapshot.magic != RAW_SNAPSHOT_MAGIC {
            return Err(EngineError::Codec(format!("unknown snapshot magic '{}'", snapshot.magic)));
        }
        check_dimensions(snapshot.width, snapshot.height)?;
        let expected = Size::new(snapshot.width, snapshot.height).byte_len();
        if snapshot.pixels.len() != expected {
            return Err(EngineError::BufferSizeMismatch {
                expected,
                actual: snapshot.pixels.len(),
            });
        }
        Ok((snapshot.width, snapshot.height, snapshot.pixels))
    }
}

pub fn codec_for(kind: SnapshotCodecKind) -> Arc<dyn SnapshotCodec> {
    match kind {
        SnapshotCodecKind::Png => Arc::new(PngSnapshotCodec),
        SnapshotCodecKind::Raw => Arc::new(RawSnapshotCodec),
    }
}

// ============================================================================
// IMAGE FILES (CLI / headless mode)
// ============================================================================

/// Load any raster format the `image` crate understands as one RGBA layer.
pub fn load_image(path: &Path) -> Result<PixelBuffer, EngineError> {
    let image = image::open(path)?.to_rgba8();
    let (width, height) = image.dimensions();
    check_dimensions(width, height)?;
    Ok(PixelBuffer::from_rgba_image(image))
}

/// Write a layer as PNG.
pub fn save_image(buffer: &PixelBuffer, path: &Path) -> Result<(), EngineError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    PngEncoder::new(&mut writer).write_image(
        buffer.data(),
        buffer.width(),
        buffer.height(),
        image::ColorType::Rgba8,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{Position, Rgba};

    fn sample() -> PixelBuffer {
        let mut buffer = PixelBuffer::filled(3, 2, Rgba::new(10, 20, 30, 255));
        buffer.set_raw_pixel(Position::new(2, 1), Rgba::new(1, 2, 3, 4));
        buffer
    }

    #[test]
    fn codecs_preserve_bytes() {
        let buffer = sample();
        for codec in [codec_for(SnapshotCodecKind::Png), codec_for(SnapshotCodecKind::Raw)] {
            let encoded = codec.encode(3, 2, buffer.data()).unwrap();
            let (w, h, data) = codec.decode(&encoded).unwrap();
            assert_eq!((w, h), (3, 2));
            assert_eq!(data, buffer.data());
        }
    }

    #[test]
    fn encode_rejects_wrong_length() {
        assert!(matches!(
            RawSnapshotCodec.encode(2, 2, &[0; 4]),
            Err(EngineError::BufferSizeMismatch { expected: 16, actual: 4 })
        ));
        assert!(PngSnapshotCodec.encode(2, 2, &[0; 4]).is_err());
    }

    #[test]
    fn corrupt_snapshot_is_a_codec_error() {
        assert!(matches!(RawSnapshotCodec.decode(&[1, 2, 3]), Err(EngineError::Codec(_))));
        assert!(matches!(PngSnapshotCodec.decode(b"not a png"), Err(EngineError::Codec(_))));
    }

    #[test]
    fn save_then_load_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layer.png");
        let buffer = sample();
        save_image(&buffer, &path).unwrap();
        assert_eq!(load_image(&path).unwrap(), buffer);
    }
}
