//! End-to-end undo/redo scenarios through the public `Project` API.

use tilecanvas::{EngineSettings, PixelBuffer, Position, Project, Rgba, Size, TileIndex};

const RED: Rgba = Rgba::new(255, 0, 0, 255);
const GREEN: Rgba = Rgba::new(0, 255, 0, 255);
const BLUE: Rgba = Rgba::new(0, 0, 255, 255);

fn settings(tile_size: u32, max_history_items: usize) -> EngineSettings {
    EngineSettings {
        tile_size,
        max_history_items,
        ..EngineSettings::default()
    }
}

fn bytes(project: &Project, layer: tilecanvas::LayerId) -> Vec<u8> {
    project.export_layer_raw(layer).unwrap()
}

#[test]
fn four_by_four_scenario() {
    let mut project = Project::new_untitled(1, 4, 4, &settings(2, 50));
    let layer = project.add_layer(Rgba::TRANSPARENT);

    project.set_pixel(layer, Position::new(0, 0), RED);
    project.register_to_history(layer);

    project.undo().unwrap();
    assert!(bytes(&project, layer).iter().all(|b| *b == 0));

    project.redo().unwrap();
    for y in 0..4 {
        for x in 0..4 {
            let expected = if (x, y) == (0, 0) { RED } else { Rgba::TRANSPARENT };
            assert_eq!(project.get_pixel(layer, Position::new(x, y)), expected);
        }
    }
}

#[test]
fn redrawn_pixel_undoes_to_original_not_intermediate() {
    let mut project = Project::new_untitled(1, 4, 4, &settings(2, 50));
    let layer = project.add_layer(Rgba::WHITE);
    project.set_pixel(layer, Position::new(1, 1), RED);
    project.set_pixel(layer, Position::new(1, 1), GREEN);
    project.register_to_history(layer);

    project.undo().unwrap();
    assert_eq!(project.get_pixel(layer, Position::new(1, 1)), Rgba::WHITE);
    project.redo().unwrap();
    assert_eq!(project.get_pixel(layer, Position::new(1, 1)), GREEN);
}

#[test]
fn empty_gesture_creates_no_entry() {
    let mut project = Project::new_untitled(1, 4, 4, &settings(2, 50));
    let layer = project.add_layer(Rgba::WHITE);
    project.register_to_history(layer);
    assert!(project.set_pixel(layer, Position::new(9, 9), RED).is_none());
    project.register_to_history(layer);
    assert!(!project.can_undo());
}

#[test]
fn history_cap_makes_oldest_unrecoverable() {
    let cap = 3;
    let mut project = Project::new_untitled(1, 8, 1, &settings(4, cap));
    let layer = project.add_layer(Rgba::TRANSPARENT);

    for x in 0..=cap as i32 {
        project.set_pixel(layer, Position::new(x, 0), RED);
        project.register_to_history(layer);
    }
    assert_eq!(project.history.undo_count(), cap);

    while project.can_undo() {
        project.undo().unwrap();
    }
    // The first stroke was evicted and stays painted.
    assert_eq!(project.get_pixel(layer, Position::new(0, 0)), RED);
    assert_eq!(project.get_pixel(layer, Position::new(1, 0)), Rgba::TRANSPARENT);
}

#[test]
fn new_edit_after_undo_drops_redo() {
    let mut project = Project::new_untitled(1, 4, 4, &settings(2, 50));
    let layer = project.add_layer(Rgba::WHITE);
    project.set_pixel(layer, Position::new(0, 0), RED);
    project.register_to_history(layer);
    project.undo().unwrap();
    project.set_pixel(layer, Position::new(3, 3), BLUE);
    project.register_to_history(layer);
    assert!(!project.can_redo());
    assert_eq!(project.get_pixel(layer, Position::new(0, 0)), Rgba::WHITE);
}

#[test]
fn mixed_tile_and_pixel_gesture_is_exactly_reversible() {
    let mut project = Project::new_untitled(1, 64, 64, &settings(16, 50));
    let layer = project.add_layer(Rgba::WHITE);
    // Split the canvas so the fill needs tiles and pixels.
    for y in 0..64 {
        project.set_pixel(layer, Position::new(20, y), BLUE);
    }
    project.register_to_history(layer);
    let before = bytes(&project, layer);

    project.set_pixel(layer, Position::new(2, 2), GREEN);
    project.flood_fill(layer, Position::new(40, 40), RED);
    project.set_pixel(layer, Position::new(50, 50), GREEN);
    project.flood_fill(layer, Position::new(63, 0), BLUE);
    project.register_to_history(layer);
    let after = bytes(&project, layer);

    project.undo().unwrap();
    assert_eq!(bytes(&project, layer), before);
    project.redo().unwrap();
    assert_eq!(bytes(&project, layer), after);
    project.undo().unwrap();
    assert_eq!(bytes(&project, layer), before);
}

#[test]
fn resize_is_undoable() {
    let mut project = Project::new_untitled(1, 10, 10, &settings(4, 50));
    let layer = project.add_layer(Rgba::WHITE);
    project.set_pixel(layer, Position::new(9, 9), RED);
    project.register_to_history(layer);
    let before = bytes(&project, layer);

    project.resize_canvas(Size::new(20, 5), (5, 0), (0, 0)).unwrap();
    assert_eq!(project.size(), Size::new(20, 5));
    assert_eq!(project.get_pixel(layer, Position::new(5, 0)), Rgba::WHITE);
    assert_eq!(project.get_pixel(layer, Position::new(0, 0)), Rgba::TRANSPARENT);

    project.undo().unwrap();
    assert_eq!(project.size(), Size::new(10, 10));
    assert_eq!(bytes(&project, layer), before);

    // Earlier pixel history still replays against the restored buffer.
    project.undo().unwrap();
    assert_eq!(project.get_pixel(layer, Position::new(9, 9)), Rgba::WHITE);
}

#[test]
fn dirty_tiles_persist_until_reset() {
    let mut project = Project::new_untitled(1, 8, 8, &settings(4, 50));
    let layer = project.add_layer(Rgba::WHITE);
    project.reset_dirty_states(layer);
    project.set_pixel(layer, Position::new(5, 1), RED);
    assert_eq!(project.dirty_tiles(layer), vec![TileIndex::new(0, 1)]);
    assert_eq!(project.dirty_tiles(layer), vec![TileIndex::new(0, 1)]);
    project.reset_dirty_states(layer);
    assert!(project.dirty_tiles(layer).is_empty());
}

#[test]
fn loaded_layer_starts_with_scanned_tiles() {
    let mut buffer = PixelBuffer::filled(8, 8, BLUE);
    buffer.set_raw_pixel(Position::new(7, 7), RED);
    let project = Project::from_buffer("t", buffer, &settings(4, 50)).unwrap();
    let layer = project.active_layer().unwrap();
    let agent = project.canvas_state.layer(layer).unwrap();
    assert!(agent.tiles().is_uniform_with(TileIndex::new(0, 0), BLUE));
    assert!(!agent.tiles().tile(TileIndex::new(1, 1)).is_uniform);
}

#[test]
fn deduped_tool_path_is_undoable() {
    let mut project = Project::new_untitled(1, 4, 4, &settings(2, 50));
    let layer = project.add_layer(Rgba::WHITE);
    {
        let agent = project.canvas_state.layer_mut(layer).unwrap();
        for color in [RED, GREEN] {
            if let Some(diff) = agent.set_pixel(Position::new(0, 0), color, false) {
                agent.record_pixel_diff(diff);
            }
        }
    }
    assert_eq!(project.get_pixel(layer, Position::new(0, 0)), RED);
    project.register_to_history(layer);
    assert!(project.can_undo());

    project.undo().unwrap();
    assert_eq!(project.get_pixel(layer, Position::new(0, 0)), Rgba::WHITE);
    project.redo().unwrap();
    assert_eq!(project.get_pixel(layer, Position::new(0, 0)), RED);
}
