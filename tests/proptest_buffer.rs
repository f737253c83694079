//! Property tests for `PixelBuffer` resizing.

use proptest::prelude::*;
use tilecanvas::{PixelBuffer, Position, Rgba, Size};

// ============================================================================
// Strategies
// ============================================================================

fn buffer_strategy() -> impl Strategy<Value = PixelBuffer> {
    (1u32..40, 1u32..40).prop_flat_map(|(w, h)| {
        prop::collection::vec(any::<u8>(), (w * h * 4) as usize)
            .prop_map(move |data| PixelBuffer::from_raw(w, h, data).unwrap())
    })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn resize_there_and_back_keeps_overlap(
        original in buffer_strategy(),
        other_w in 1u32..40,
        other_h in 1u32..40,
    ) {
        let (w, h) = (original.width(), original.height());
        let mut buffer = original.clone();
        buffer.resize(Size::new(other_w, other_h), (0, 0), (0, 0));
        prop_assert_eq!(buffer.size(), Size::new(other_w, other_h));
        buffer.resize(Size::new(w, h), (0, 0), (0, 0));
        prop_assert_eq!(buffer.size(), Size::new(w, h));
        prop_assert_eq!(buffer.data().len(), original.data().len());

        let (keep_w, keep_h) = (w.min(other_w), h.min(other_h));
        for y in 0..h {
            for x in 0..w {
                let pos = Position::new(x as i32, y as i32);
                let expected = if x < keep_w && y < keep_h {
                    original.get_pixel(pos)
                } else {
                    Rgba::TRANSPARENT
                };
                prop_assert_eq!(buffer.get_pixel(pos), expected, "pixel ({}, {})", x, y);
            }
        }
    }

    #[test]
    fn resize_with_origins_never_overruns(
        original in buffer_strategy(),
        new_w in 0u32..50,
        new_h in 0u32..50,
        dest in (0u32..60, 0u32..60),
        src in (0u32..60, 0u32..60),
    ) {
        let mut buffer = original.clone();
        buffer.resize(Size::new(new_w, new_h), dest, src);
        prop_assert_eq!(buffer.data().len(), Size::new(new_w, new_h).byte_len());

        // The source origin pixel lands on the destination origin.
        let from = Position::new(src.0 as i32, src.1 as i32);
        let to = Position::new(dest.0 as i32, dest.1 as i32);
        if original.is_in_bounds(from) && buffer.is_in_bounds(to) {
            prop_assert_eq!(buffer.get_pixel(to), original.get_pixel(from));
        }
    }
}
