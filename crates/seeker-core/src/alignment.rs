//! Face alignment via 4-DOF similarity transform.
//!
//! Warps a detected face to the canonical 112×112 ArcFace position using the
//! five InsightFace reference landmarks.

use crate::types::{FaceRegion, PixelGrid};
use image::Rgb;

/// ArcFace reference landmarks for a 112×112 output.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: u32 = 112;

/// Similarity transform `dst = [a -b; b a] * src + [tx; ty]`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    /// Least-squares fit from `src` points to `dst` points (closed form on centered coordinates).
    fn estimate(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Self {
        let n = src.len() as f32;
        let mean = |pts: &[(f32, f32); 5]| {
            let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
            (sx / n, sy / n)
        };
        let (smx, smy) = mean(src);
        let (dmx, dmy) = mean(dst);

        let mut dot = 0.0f32;
        let mut cross = 0.0f32;
        let mut norm = 0.0f32;
        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
            let (sx, sy) = (sx - smx, sy - smy);
            let (dx, dy) = (dx - dmx, dy - dmy);
            dot += sx * dx + sy * dy;
            cross += sx * dy - sy * dx;
            norm += sx * sx + sy * sy;
        }

        if norm < 1e-12 {
            // Degenerate landmarks: translate only.
            return Self { a: 1.0, b: 0.0, tx: dmx - smx, ty: dmy - smy };
        }

        let a = dot / norm;
        let b = cross / norm;
        Self {
            a,
            b,
            tx: dmx - (a * smx - b * smy),
            ty: dmy - (b * smx + a * smy),
        }
    }

    /// Map a destination point back into source coordinates.
    fn invert_point(&self, x: f32, y: f32) -> Option<(f32, f32)> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let (dx, dy) = (x - self.tx, y - self.ty);
        Some((
            (self.a * dx + self.b * dy) / det,
            (-self.b * dx + self.a * dy) / det,
        ))
    }
}

/// Bilinear sample of one channel; out-of-bounds reads are black.
fn sample(grid: &PixelGrid, x: f32, y: f32, channel: usize) -> f32 {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (w, h) = (grid.width() as i64, grid.height() as i64);

    let px = |xi: i64, yi: i64| -> f32 {
        if xi >= 0 && xi < w && yi >= 0 && yi < h {
            grid.get_pixel(xi as u32, yi as u32)[channel] as f32
        } else {
            0.0
        }
    };

    let (xi, yi) = (x0 as i64, y0 as i64);
    px(xi, yi) * (1.0 - fx) * (1.0 - fy)
        + px(xi + 1, yi) * fx * (1.0 - fy)
        + px(xi, yi + 1) * (1.0 - fx) * fy
        + px(xi + 1, yi + 1) * fx * fy
}

fn warp(grid: &PixelGrid, transform: &Similarity) -> PixelGrid {
    if transform.invert_point(0.0, 0.0).is_none() {
        return PixelGrid::new(ALIGNED_SIZE, ALIGNED_SIZE);
    }

    PixelGrid::from_fn(ALIGNED_SIZE, ALIGNED_SIZE, |ox, oy| {
        let (sx, sy) = transform
            .invert_point(ox as f32, oy as f32)
            .unwrap_or((-1.0, -1.0));
        let channel = |c| sample(grid, sx, sy, c).round().clamp(0.0, 255.0) as u8;
        Rgb([channel(0), channel(1), channel(2)])
    })
}

/// Approximate landmarks for a box that came without any, by placing the
/// reference template proportionally inside it.
pub fn estimate_landmarks(region: &FaceRegion) -> [(f32, f32); 5] {
    let sx = region.width() as f32 / ALIGNED_SIZE as f32;
    let sy = region.height() as f32 / ALIGNED_SIZE as f32;
    REFERENCE_LANDMARKS_112.map(|(x, y)| (region.left as f32 + x * sx, region.top as f32 + y * sy))
}

/// Align a detected face to a canonical 112×112 RGB crop.
///
/// Uses the region's landmarks when present, otherwise estimates them from the box.
pub fn align_face(grid: &PixelGrid, region: &FaceRegion) -> PixelGrid {
    let landmarks = region.landmarks.unwrap_or_else(|| estimate_landmarks(region));
    let transform = Similarity::estimate(&landmarks, &REFERENCE_LANDMARKS_112);
    warp(grid, &transform)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(left: u32, top: u32, size: u32) -> FaceRegion {
        FaceRegion {
            top,
            right: left + size,
            bottom: top + size,
            left,
            confidence: 1.0,
            landmarks: None,
        }
    }

    #[test]
    fn test_identity_transform() {
        let t = Similarity::estimate(&REFERENCE_LANDMARKS_112, &REFERENCE_LANDMARKS_112);
        assert!((t.a - 1.0).abs() < 1e-4, "a = {}", t.a);
        assert!(t.b.abs() < 1e-4, "b = {}", t.b);
        assert!(t.tx.abs() < 1e-3, "tx = {}", t.tx);
        assert!(t.ty.abs() < 1e-3, "ty = {}", t.ty);
    }

    #[test]
    fn test_scaled_transform() {
        let src = REFERENCE_LANDMARKS_112.map(|(x, y)| (x * 2.0 + 10.0, y * 2.0 + 30.0));
        let t = Similarity::estimate(&src, &REFERENCE_LANDMARKS_112);
        assert!((t.a - 0.5).abs() < 1e-4, "a = {}", t.a);
        assert!(t.b.abs() < 1e-4);
        assert!((t.tx + 5.0).abs() < 1e-3, "tx = {}", t.tx);
        assert!((t.ty + 15.0).abs() < 1e-3, "ty = {}", t.ty);
    }

    #[test]
    fn test_rotation_recovered() {
        // Rotate the template by 90°: (x, y) → (-y, x).
        let src = REFERENCE_LANDMARKS_112.map(|(x, y)| (-y, x));
        let t = Similarity::estimate(&src, &REFERENCE_LANDMARKS_112);
        // Inverse rotation by -90°: a = cos = 0, b = sin = -1.
        assert!(t.a.abs() < 1e-4, "a = {}", t.a);
        assert!((t.b + 1.0).abs() < 1e-4, "b = {}", t.b);
    }

    #[test]
    fn test_align_output_size() {
        let grid = PixelGrid::from_pixel(640, 480, Rgb([128, 128, 128]));
        let aligned = align_face(&grid, &region(100, 100, 200));
        assert_eq!(aligned.dimensions(), (ALIGNED_SIZE, ALIGNED_SIZE));
    }

    #[test]
    fn test_estimated_landmarks_inside_box() {
        let r = region(50, 40, 112);
        let lms = estimate_landmarks(&r);
        for (x, y) in lms {
            assert!(x >= 50.0 && x <= 162.0);
            assert!(y >= 40.0 && y <= 152.0);
        }
        // Same size as the template → pure translation.
        assert!((lms[0].0 - (50.0 + REFERENCE_LANDMARKS_112[0].0)).abs() < 1e-4);
    }

    #[test]
    fn test_box_only_alignment_is_a_crop() {
        // 112-px box at (20, 10) → aligned output equals that crop.
        let grid = PixelGrid::from_fn(200, 200, |x, y| Rgb([x as u8, y as u8, 7]));
        let aligned = align_face(&grid, &region(20, 10, 112));
        assert_eq!(aligned.get_pixel(0, 0), &Rgb([20, 10, 7]));
        assert_eq!(aligned.get_pixel(50, 60), &Rgb([70, 70, 7]));
    }

    #[test]
    fn test_landmark_roundtrip() {
        // A bright patch at the left-eye landmark lands near the reference left eye.
        let mut grid = PixelGrid::new(200, 200);
        let src: [(f32, f32); 5] = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];
        for dy in 0..5 {
            for dx in 0..5 {
                grid.put_pixel(78 + dx, 58 + dy, Rgb([255, 255, 255]));
            }
        }

        let mut face = region(60, 40, 80);
        face.landmarks = Some(src);
        let aligned = align_face(&grid, &face);

        let ref_x = REFERENCE_LANDMARKS_112[0].0.round() as u32;
        let ref_y = REFERENCE_LANDMARKS_112[0].1.round() as u32;
        let mut max_val = 0u8;
        for y in ref_y - 1..=ref_y + 1 {
            for x in ref_x - 1..=ref_x + 1 {
                max_val = max_val.max(aligned.get_pixel(x, y)[0]);
            }
        }
        assert!(max_val > 100, "expected bright patch near reference left eye, max={max_val}");
    }
}
