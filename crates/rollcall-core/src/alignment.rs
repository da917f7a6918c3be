//! Face alignment via 4-DOF similarity transform.
//!
//! Warps a detected face onto the canonical 112×112 ArcFace crop using the
//! five InsightFace reference landmarks and a closed-form least-squares fit.

use image::{GrayImage, Luma};

/// ArcFace reference landmarks for a 112×112 output.
pub(crate) const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub(crate) const ALIGNED_SIZE: u32 = 112;

/// Similarity transform `dst = [a -b; b a] * src + [tx, ty]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SimilarityTransform {
    pub a: f32,
    pub b: f32,
    pub tx: f32,
    pub ty: f32,
}

impl SimilarityTransform {
    /// Least-squares fit mapping `src` points onto `dst` points.
    ///
    /// Degenerate input (all source points coincide) yields the identity.
    pub fn estimate(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Self {
        let n = src.len() as f32;
        let (msx, msy) = centroid(src);
        let (mdx, mdy) = centroid(dst);

        let mut spread = 0.0f32;
        let mut dot = 0.0f32;
        let mut cross = 0.0f32;
        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
            let (sx, sy) = (sx - msx, sy - msy);
            let (dx, dy) = (dx - mdx, dy - mdy);
            spread += sx * sx + sy * sy;
            dot += sx * dx + sy * dy;
            cross += sx * dy - sy * dx;
        }

        if spread / n < 1e-12 {
            return Self { a: 1.0, b: 0.0, tx: 0.0, ty: 0.0 };
        }

        let a = dot / spread;
        let b = cross / spread;
        Self {
            a,
            b,
            tx: mdx - (a * msx - b * msy),
            ty: mdy - (b * msx + a * msy),
        }
    }

    /// Map a destination-space point back into source space.
    fn invert(&self, x: f32, y: f32) -> Option<(f32, f32)> {
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

fn centroid(points: &[(f32, f32); 5]) -> (f32, f32) {
    let n = points.len() as f32;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
    (sx / n, sy / n)
}

/// Bilinear sample; pixels outside the image read as black.
fn sample_bilinear(image: &GrayImage, x: f32, y: f32) -> f32 {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let px = |px: f32, py: f32| -> f32 {
        if px < 0.0 || py < 0.0 {
            return 0.0;
        }
        image
            .get_pixel_checked(px as u32, py as u32)
            .map_or(0.0, |p| p.0[0] as f32)
    };

    px(x0, y0) * (1.0 - fx) * (1.0 - fy)
        + px(x0 + 1.0, y0) * fx * (1.0 - fy)
        + px(x0, y0 + 1.0) * (1.0 - fx) * fy
        + px(x0 + 1.0, y0 + 1.0) * fx * fy
}

/// Warp `image` through the inverse of `transform` into a square output.
pub(crate) fn warp(image: &GrayImage, transform: &SimilarityTransform, out_size: u32) -> GrayImage {
    let mut out = GrayImage::new(out_size, out_size);
    for (ox, oy, pixel) in out.enumerate_pixels_mut() {
        let value = match transform.invert(ox as f32, oy as f32) {
            Some((sx, sy)) => sample_bilinear(image, sx, sy),
            None => 0.0,
        };
        *pixel = Luma([value.round().clamp(0.0, 255.0) as u8]);
    }
    out
}

/// Align a detected face to a canonical 112×112 crop for embedding extraction.
pub fn align_face(image: &GrayImage, landmarks: &[(f32, f32); 5]) -> GrayImage {
    let transform = SimilarityTransform::estimate(landmarks, &REFERENCE_LANDMARKS_112);
    warp(image, &transform, ALIGNED_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_transform() {
        let pts = REFERENCE_LANDMARKS_112;
        let t = SimilarityTransform::estimate(&pts, &pts);
        assert!((t.a - 1.0).abs() < 1e-4, "a = {}", t.a);
        assert!(t.b.abs() < 1e-4, "b = {}", t.b);
        assert!(t.tx.abs() < 1e-3, "tx = {}", t.tx);
        assert!(t.ty.abs() < 1e-3, "ty = {}", t.ty);
    }

    #[test]
    fn test_scaled_transform() {
        let src = REFERENCE_LANDMARKS_112.map(|(x, y)| (x * 2.0, y * 2.0));
        let t = SimilarityTransform::estimate(&src, &REFERENCE_LANDMARKS_112);
        assert!((t.a - 0.5).abs() < 1e-3, "a = {}, expected 0.5", t.a);
        assert!(t.b.abs() < 1e-3);
    }

    #[test]
    fn test_translated_transform() {
        let src = REFERENCE_LANDMARKS_112.map(|(x, y)| (x + 10.0, y - 4.0));
        let t = SimilarityTransform::estimate(&src, &REFERENCE_LANDMARKS_112);
        assert!((t.tx + 10.0).abs() < 1e-3, "tx = {}", t.tx);
        assert!((t.ty - 4.0).abs() < 1e-3, "ty = {}", t.ty);
    }

    #[test]
    fn test_degenerate_landmarks_fall_back_to_identity() {
        let src = [(5.0, 5.0); 5];
        let t = SimilarityTransform::estimate(&src, &REFERENCE_LANDMARKS_112);
        assert_eq!(t, SimilarityTransform { a: 1.0, b: 0.0, tx: 0.0, ty: 0.0 });
    }

    #[test]
    fn test_align_face_output_size() {
        let image = GrayImage::from_pixel(640, 480, Luma([128]));
        let aligned = align_face(&image, &REFERENCE_LANDMARKS_112);
        assert_eq!(aligned.dimensions(), (ALIGNED_SIZE, ALIGNED_SIZE));
    }

    #[test]
    fn test_landmark_lands_on_reference() {
        let mut image = GrayImage::new(200, 200);
        let src: [(f32, f32); 5] = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];

        // 5x5 bright patch on the left eye survives bilinear sampling
        for dy in 0..5 {
            for dx in 0..5 {
                image.put_pixel(78 + dx, 58 + dy, Luma([255]));
            }
        }

        let aligned = align_face(&image, &src);

        let rx = REFERENCE_LANDMARKS_112[0].0.round() as u32;
        let ry = REFERENCE_LANDMARKS_112[0].1.round() as u32;
        let mut max_val = 0u8;
        for y in ry - 1..=ry + 1 {
            for x in rx - 1..=rx + 1 {
                max_val = max_val.max(aligned.get_pixel(x, y).0[0]);
            }
        }
        assert!(max_val > 100, "expected bright patch near ({rx}, {ry}), max={max_val}");
    }
}
