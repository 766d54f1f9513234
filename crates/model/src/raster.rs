//! Raster export of a 3D view.
//!
//! Walls, floors and columns are drawn as wireframe edges under an
//! isometric projection, scaled to fit the image.

use std::io::Cursor;

use image::{ImageFormat, Rgb, RgbImage};
use planforge_core::units::Xyz;

use crate::document::Document;
use crate::element::ElementData;
use crate::error::ModelError;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const WALL: Rgb<u8> = Rgb([40, 40, 40]);
const FLOOR: Rgb<u8> = Rgb([70, 110, 180]);
const COLUMN: Rgb<u8> = Rgb([180, 70, 50]);

#[derive(Debug, Clone, Copy)]
pub struct RasterOptions {
    pub width: u32,
    pub height: u32,
    pub margin: u32,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
            margin: 32,
        }
    }
}

struct Segment {
    from: Xyz,
    to: Xyz,
    color: Rgb<u8>,
}

/// Render the document's geometry into PNG bytes.
pub fn render_png(document: &Document, options: RasterOptions) -> Result<Vec<u8>, ModelError> {
    let segments = collect_segments(document)?;
    let image = rasterize(&segments, options);

    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| ModelError::Export(e.to_string()))?;
    Ok(bytes)
}

fn collect_segments(document: &Document) -> Result<Vec<Segment>, ModelError> {
    let mut segments = Vec::new();
    for element in document.elements() {
        match &element.data {
            ElementData::Wall {
                start,
                end,
                level,
                height,
                offset,
                ..
            } => {
                let base = document.level_elevation(*level)? + offset.value();
                let lift = |p: &Xyz, dz: f64| Xyz {
                    x: p.x,
                    y: p.y,
                    z: p.z + base + dz,
                };
                let (b0, b1) = (lift(start, 0.0), lift(end, 0.0));
                let (t0, t1) = (lift(start, height.value()), lift(end, height.value()));
                for (from, to) in [(b0, b1), (t0, t1), (b0, t0), (b1, t1)] {
                    segments.push(Segment { from, to, color: WALL });
                }
            }
            ElementData::Floor {
                level, boundary, ..
            } => {
                let z = document.level_elevation(*level)?;
                let at = |p: &Xyz| Xyz { x: p.x, y: p.y, z: p.z + z };
                for (i, point) in boundary.iter().enumerate() {
                    let next = &boundary[(i + 1) % boundary.len()];
                    segments.push(Segment {
                        from: at(point),
                        to: at(next),
                        color: FLOOR,
                    });
                }
            }
            ElementData::Column {
                level,
                location,
                height,
                ..
            } => {
                let z = document.level_elevation(*level)? + location.z;
                segments.push(Segment {
                    from: Xyz { z, ..*location },
                    to: Xyz {
                        z: z + height.value(),
                        ..*location
                    },
                    color: COLUMN,
                });
            }
            _ => {}
        }
    }
    Ok(segments)
}

/// Isometric projection onto the image plane (y grows upwards).
fn project(p: &Xyz) -> (f64, f64) {
    let cos30 = 3f64.sqrt() / 2.0;
    ((p.x - p.y) * cos30, (p.x + p.y) * 0.5 + p.z)
}

fn rasterize(segments: &[Segment], options: RasterOptions) -> RgbImage {
    let mut image = RgbImage::from_pixel(options.width, options.height, BACKGROUND);
    if segments.is_empty() {
        return image;
    }

    let projected: Vec<_> = segments
        .iter()
        .map(|s| (project(&s.from), project(&s.to), s.color))
        .collect();

    let (mut min_u, mut min_v) = (f64::INFINITY, f64::INFINITY);
    let (mut max_u, mut max_v) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for ((u0, v0), (u1, v1), _) in &projected {
        min_u = min_u.min(*u0).min(*u1);
        max_u = max_u.max(*u0).max(*u1);
        min_v = min_v.min(*v0).min(*v1);
        max_v = max_v.max(*v0).max(*v1);
    }

    let usable_w = options.width.saturating_sub(2 * options.margin).max(1) as f64;
    let usable_h = options.height.saturating_sub(2 * options.margin).max(1) as f64;
    let span_u = (max_u - min_u).max(1e-9);
    let span_v = (max_v - min_v).max(1e-9);
    let scale = (usable_w / span_u).min(usable_h / span_v);
    let margin = options.margin as f64;

    let to_pixel = |(u, v): (f64, f64)| -> (i64, i64) {
        let x = margin + (u - min_u) * scale;
        let y = options.height as f64 - margin - (v - min_v) * scale;
        (x.round() as i64, y.round() as i64)
    };

    for (from, to, color) in projected {
        draw_line(&mut image, to_pixel(from), to_pixel(to), color);
    }
    image
}

/// Bresenham line, clipped to the image bounds.
fn draw_line(image: &mut RgbImage, (mut x0, mut y0): (i64, i64), (x1, y1): (i64, i64), color: Rgb<u8>) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if x0 >= 0 && y0 >= 0 && (x0 as u32) < image.width() && (y0 as u32) < image.height() {
            image.put_pixel(x0 as u32, y0 as u32, color);
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
