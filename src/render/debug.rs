//! Debug annotation for tiles.
//!
//! Debug tiles get a border, corner markers, and tick marks along the top
//! edge encoding the zoom level (text rendering is out of scope). The
//! annotation is drawn once per tile, on its first rendering.

use tiny_skia::{Color, Paint, PathBuilder, Pixmap, Shader, Stroke, Transform};

use crate::coord::TileKey;

fn border_color() -> Color {
    Color::from_rgba8(255, 0, 0, 160)
}

fn marker_color() -> Color {
    Color::from_rgba8(255, 0, 0, 220)
}

fn paint(color: Color) -> Paint<'static> {
    Paint {
        shader: Shader::SolidColor(color),
        anti_alias: false,
        ..Default::default()
    }
}

/// Draw the tile border, corner markers and zoom ticks.
pub fn draw_annotation(canvas: &mut Pixmap, key: &TileKey) {
    let size = canvas.width() as f32;

    // Border
    let mut builder = PathBuilder::new();
    builder.move_to(0.5, 0.5);
    builder.line_to(size - 0.5, 0.5);
    builder.line_to(size - 0.5, size - 0.5);
    builder.line_to(0.5, size - 0.5);
    builder.close();
    if let Some(path) = builder.finish() {
        canvas.stroke_path(
            &path,
            &paint(border_color()),
            &Stroke {
                width: 1.0,
                ..Default::default()
            },
            Transform::identity(),
            None,
        );
    }

    // Corner markers
    let marker = 4.0_f32.min(size / 8.0);
    for (cx, cy) in [
        (0.0, 0.0),
        (size - marker, 0.0),
        (0.0, size - marker),
        (size - marker, size - marker),
    ] {
        if let Some(rect) = tiny_skia::Rect::from_xywh(cx, cy, marker, marker) {
            canvas.fill_rect(rect, &paint(marker_color()), Transform::identity(), None);
        }
    }

    // Zoom ticks along the top edge, one per zoom level.
    let mut builder = PathBuilder::new();
    for i in 0..key.z {
        let x = marker + 4.0 + i as f32 * 3.0;
        if x >= size - marker {
            break;
        }
        builder.move_to(x, 2.0);
        builder.line_to(x, 8.0);
    }
    if let Some(path) = builder.finish() {
        canvas.stroke_path(
            &path,
            &paint(marker_color()),
            &Stroke {
                width: 1.0,
                ..Default::default()
            },
            Transform::identity(),
            None,
        );
    }
}
