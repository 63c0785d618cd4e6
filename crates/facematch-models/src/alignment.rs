//! Five-point face alignment.
//!
//! Fits a similarity transform (scale, rotation, translation) from the
//! detected landmarks to a fixed template and warps the face into a square
//! chip with bilinear sampling.

use image::{Rgb, RgbImage};

/// Five-point template for a 150×150 chip: the InsightFace reference
/// points scaled from 112 to 150 pixels.
pub const REFERENCE_LANDMARKS_150: [(f32, f32); 5] = [
    (51.2874, 69.2361), // left eye
    (98.4801, 68.9751), // right eye
    (75.0337, 96.0758), // nose
    (55.6464, 123.7038), // left mouth
    (94.7275, 123.4876), // right mouth
];

/// `dst = [a -b; b a] * src + t`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    pub a: f32,
    pub b: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Similarity {
    /// Least-squares fit mapping `src` onto `dst`.
    ///
    /// `None` if the source points are all coincident.
    pub fn estimate(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Option<Self> {
        let n = src.len() as f32;
        let mean = |pts: &[(f32, f32); 5]| {
            let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
            (sx / n, sy / n)
        };
        let (smx, smy) = mean(src);
        let (dmx, dmy) = mean(dst);

        let (mut dot, mut cross, mut norm) = (0.0f32, 0.0f32, 0.0f32);
        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst) {
            let (sx, sy) = (sx - smx, sy - smy);
            let (dx, dy) = (dx - dmx, dy - dmy);
            dot += sx * dx + sy * dy;
            cross += sx * dy - sy * dx;
            norm += sx * sx + sy * sy;
        }
        if norm < 1e-6 {
            return None;
        }

        let a = dot / norm;
        let b = cross / norm;
        Some(Self {
            a,
            b,
            tx: dmx - (a * smx - b * smy),
            ty: dmy - (b * smx + a * smy),
        })
    }

    pub fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    /// Inverse transform; `None` for a degenerate (zero-scale) fit.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let a = self.a / det;
        let b = -self.b / det;
        Some(Self {
            a,
            b,
            tx: -(a * self.tx - b * self.ty),
            ty: -(b * self.tx + a * self.ty),
        })
    }
}

/// Warp the face described by `landmarks` into a `size`×`size` chip whose
/// landmarks sit on `reference`. Pixels outside the frame are black.
///
/// `None` if the landmarks are degenerate.
pub fn align_face(
    image: &RgbImage,
    landmarks: &[(f32, f32); 5],
    reference: &[(f32, f32); 5],
    size: u32,
) -> Option<RgbImage> {
    let to_source = Similarity::estimate(landmarks, reference)?.inverse()?;

    Some(RgbImage::from_fn(size, size, |ox, oy| {
        let (sx, sy) = to_source.apply((ox as f32, oy as f32));
        sample_bilinear(image, sx, sy)
    }))
}

fn sample_bilinear(image: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (width, height) = (image.width() as i64, image.height() as i64);
    let (x0, y0) = (x.floor() as i64, y.floor() as i64);
    let (fx, fy) = (x - x0 as f32, y - y0 as f32);

    let texel = |px: i64, py: i64| -> [f32; 3] {
        if px < 0 || py < 0 || px >= width || py >= height {
            return [0.0; 3];
        }
        let p = image.get_pixel(px as u32, py as u32).0;
        [p[0] as f32, p[1] as f32, p[2] as f32]
    };

    let (tl, tr) = (texel(x0, y0), texel(x0 + 1, y0));
    let (bl, br) = (texel(x0, y0 + 1), texel(x0 + 1, y0 + 1));
    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = tl[c] * (1.0 - fx) + tr[c] * fx;
        let bottom = bl[c] * (1.0 - fx) + br[c] * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: (f32, f32), b: (f32, f32), tol: f32) -> bool {
        (a.0 - b.0).abs() < tol && (a.1 - b.1).abs() < tol
    }

    #[test]
    fn test_identity_fit() {
        let pts = REFERENCE_LANDMARKS_150;
        let t = Similarity::estimate(&pts, &pts).unwrap();
        assert!((t.a - 1.0).abs() < 1e-4, "a = {}", t.a);
        assert!(t.b.abs() < 1e-4, "b = {}", t.b);
        assert!(t.tx.abs() < 1e-2 && t.ty.abs() < 1e-2, "t = ({}, {})", t.tx, t.ty);
    }

    #[test]
    fn test_recovers_scale_rotation_translation() {
        // 90° rotation, scale 2, shift (10, -5).
        let known = Similarity { a: 0.0, b: 2.0, tx: 10.0, ty: -5.0 };
        let src = REFERENCE_LANDMARKS_150;
        let dst = src.map(|p| known.apply(p));

        let fit = Similarity::estimate(&src, &dst).unwrap();
        assert!(fit.a.abs() < 1e-3, "a = {}", fit.a);
        assert!((fit.b - 2.0).abs() < 1e-3, "b = {}", fit.b);
        assert!(close((fit.tx, fit.ty), (10.0, -5.0), 1e-2));
    }

    #[test]
    fn test_inverse_round_trip() {
        let t = Similarity { a: 0.6, b: -0.3, tx: 12.0, ty: 40.0 };
        let inv = t.inverse().unwrap();
        let p = (33.0, 71.5);
        assert!(close(inv.apply(t.apply(p)), p, 1e-3));
    }

    #[test]
    fn test_coincident_landmarks_rejected() {
        let src = [(5.0, 5.0); 5];
        assert!(Similarity::estimate(&src, &REFERENCE_LANDMARKS_150).is_none());
        let image = RgbImage::new(50, 50);
        assert!(align_face(&image, &src, &REFERENCE_LANDMARKS_150, 150).is_none());
    }

    #[test]
    fn test_landmark_lands_on_reference() {
        // Face at half the template scale, shifted into a larger frame.
        let src = REFERENCE_LANDMARKS_150.map(|(x, y)| (x * 0.5 + 100.0, y * 0.5 + 60.0));
        let mut image = RgbImage::new(300, 200);
        let (ex, ey) = (src[0].0.round() as u32, src[0].1.round() as u32);
        for y in ey - 2..=ey + 2 {
            for x in ex - 2..=ex + 2 {
                image.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }

        let chip = align_face(&image, &src, &REFERENCE_LANDMARKS_150, 150).unwrap();
        assert_eq!(chip.dimensions(), (150, 150));

        let (rx, ry) = (
            REFERENCE_LANDMARKS_150[0].0.round() as u32,
            REFERENCE_LANDMARKS_150[0].1.round() as u32,
        );
        assert!(chip.get_pixel(rx, ry).0[0] > 100, "left eye not at template position");
        assert_eq!(chip.get_pixel(140, 10).0, [0, 0, 0]);
    }
}
