//! Face alignment via 4-DOF similarity transform.
//!
//! Maps the five alignment points onto the canonical ArcFace 112×112
//! positions using least-squares estimation, then inverse-warps the source
//! image with bilinear resampling.

use image::{DynamicImage, Rgb, RgbImage};

/// Canonical ArcFace landmark positions for a 112×112 output.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: u32 = 112;

/// Warp `image` so `landmarks` land on the canonical 112×112 positions.
pub fn align_face(image: &DynamicImage, landmarks: &[(f32, f32); 5]) -> RgbImage {
    let forward = estimate_similarity_transform(landmarks, &REFERENCE_LANDMARKS_112);
    let inverse = invert_affine(&forward);

    let source = image.to_rgb8();
    let mut aligned = RgbImage::new(ALIGNED_SIZE, ALIGNED_SIZE);

    for y in 0..ALIGNED_SIZE {
        for x in 0..ALIGNED_SIZE {
            let (sx, sy) = apply(&inverse, x as f32, y as f32);
            aligned.put_pixel(x, y, bilinear_sample(&source, sx, sy));
        }
    }

    aligned
}

/// Apply a 2×3 affine transform `[m00, m01, m02, m10, m11, m12]` to a point.
fn apply(t: &[f32; 6], x: f32, y: f32) -> (f32, f32) {
    (
        t[0] * x + t[1] * y + t[2],
        t[3] * x + t[4] * y + t[5],
    )
}

/// Invert a 2×3 affine transform. A singular transform inverts to identity.
fn invert_affine(t: &[f32; 6]) -> [f32; 6] {
    let det = t[0] * t[4] - t[1] * t[3];
    if det.abs() < 1e-12 {
        return [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
    }

    [
        t[4] / det,
        -t[1] / det,
        (t[1] * t[5] - t[4] * t[2]) / det,
        -t[3] / det,
        t[0] / det,
        (t[3] * t[2] - t[0] * t[5]) / det,
    ]
}

/// Estimate a 4-DOF similarity transform (scale, rotation, translation) from
/// `src` points to `dst` points by least squares.
///
/// Returns `[a, -b, tx, b, a, ty]`, the row-major 2×3 matrix
/// ```text
/// | a  -b  tx |
/// | b   a  ty |
/// ```
fn estimate_similarity_transform(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> [f32; 6] {
    // Normal equations for the overdetermined system: each point pair
    // (sx, sy) -> (dx, dy) contributes
    //   sx * a - sy * b + tx = dx
    //   sy * a + sx * b + ty = dy
    // over the unknowns [a, b, tx, ty].
    let mut normal = [0.0f32; 16]; // 4x4, row-major
    let mut rhs = [0.0f32; 4];

    for i in 0..5 {
        let (sx, sy) = src[i];
        let (dx, dy) = dst[i];

        let row_x = [sx, -sy, 1.0, 0.0];
        let row_y = [sy, sx, 0.0, 1.0];

        for j in 0..4 {
            for k in 0..4 {
                normal[j * 4 + k] += row_x[j] * row_x[k] + row_y[j] * row_y[k];
            }
            rhs[j] += row_x[j] * dx + row_y[j] * dy;
        }
    }

    let [a, b, tx, ty] = solve_4x4(&normal, &rhs);

    [a, -b, tx, b, a, ty]
}

/// Solve a 4×4 linear system by Gaussian elimination with partial pivoting.
#[allow(clippy::needless_range_loop)]
fn solve_4x4(matrix: &[f32; 16], rhs: &[f32; 4]) -> [f32; 4] {
    // Augmented [A | b]
    let mut m = [[0.0f32; 5]; 4];
    for row in 0..4 {
        for col in 0..4 {
            m[row][col] = matrix[row * 4 + col];
        }
        m[row][4] = rhs[row];
    }

    for col in 0..4 {
        let mut pivot_row = col;
        for row in (col + 1)..4 {
            if m[row][col].abs() > m[pivot_row][col].abs() {
                pivot_row = row;
            }
        }
        m.swap(col, pivot_row);

        let pivot = m[col][col];
        if pivot.abs() < 1e-12 {
            return [0.0; 4];
        }

        for row in (col + 1)..4 {
            let factor = m[row][col] / pivot;
            for k in col..5 {
                m[row][k] -= factor * m[col][k];
            }
        }
    }

    // Back substitution
    let mut x = [0.0f32; 4];
    for row in (0..4).rev() {
        let mut acc = m[row][4];
        for col in (row + 1)..4 {
            acc -= m[row][col] * x[col];
        }
        x[row] = acc / m[row][row];
    }

    x
}

/// Sample `source` at a fractional position with bilinear interpolation,
/// clamping to the image border.
fn bilinear_sample(source: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (width, height) = source.dimensions();
    if width == 0 || height == 0 {
        return Rgb([0, 0, 0]);
    }

    let x = x.clamp(0.0, (width - 1) as f32);
    let y = y.clamp(0.0, (height - 1) as f32);

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let mut out = [0u8; 3];
    for channel in 0..3 {
        let tl = source.get_pixel(x0, y0)[channel] as f32;
        let tr = source.get_pixel(x1, y0)[channel] as f32;
        let bl = source.get_pixel(x0, y1)[channel] as f32;
        let br = source.get_pixel(x1, y1)[channel] as f32;

        let value = tl * (1.0 - fx) * (1.0 - fy)
            + tr * fx * (1.0 - fy)
            + bl * (1.0 - fx) * fy
            + br * fx * fy;

        out[channel] = value.round().clamp(0.0, 255.0) as u8;
    }

    Rgb(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_transform() {
        let points = REFERENCE_LANDMARKS_112;
        let t = estimate_similarity_transform(&points, &points);

        assert!((t[0] - 1.0).abs() < 1e-3, "scale: {}", t[0]);
        assert!(t[1].abs() < 1e-3, "rotation: {}", t[1]);
        assert!(t[2].abs() < 1e-2, "tx: {}", t[2]);
        assert!(t[5].abs() < 1e-2, "ty: {}", t[5]);
    }

    #[test]
    fn test_pure_translation() {
        let src = [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (5.0, 5.0)];
        let dst = src.map(|(x, y)| (x + 3.0, y - 2.0));
        let t = estimate_similarity_transform(&src, &dst);

        let (x, y) = apply(&t, 7.0, 7.0);
        assert!((x - 10.0).abs() < 1e-3);
        assert!((y - 5.0).abs() < 1e-3);
    }

    #[test]
    fn test_invert_roundtrip() {
        let src = [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (5.0, 5.0)];
        let dst = src.map(|(x, y)| (x * 2.0 + 1.0, y * 2.0 - 4.0));
        let forward = estimate_similarity_transform(&src, &dst);
        let inverse = invert_affine(&forward);

        let (fx, fy) = apply(&forward, 3.0, 4.0);
        let (x, y) = apply(&inverse, fx, fy);
        assert!((x - 3.0).abs() < 1e-3);
        assert!((y - 4.0).abs() < 1e-3);
    }

    #[test]
    fn test_invert_singular_falls_back_to_identity() {
        let t = invert_affine(&[0.0; 6]);
        assert_eq!(apply(&t, 5.0, 7.0), (5.0, 7.0));
    }

    #[test]
    fn test_bilinear_sample_uniform() {
        let source = RgbImage::from_pixel(8, 8, Rgb([128, 64, 32]));
        let sampled = bilinear_sample(&source, 3.5, 4.5);
        assert_eq!(sampled, Rgb([128, 64, 32]));
    }

    #[test]
    fn test_bilinear_sample_clamps_outside() {
        let source = RgbImage::from_pixel(4, 4, Rgb([200, 200, 200]));
        let sampled = bilinear_sample(&source, -10.0, 100.0);
        assert_eq!(sampled, Rgb([200, 200, 200]));
    }

    #[test]
    fn test_align_face_output_size() {
        let image = DynamicImage::new_rgb8(200, 200);
        let landmarks = [
            (70.0, 90.0),
            (130.0, 90.0),
            (100.0, 125.0),
            (75.0, 160.0),
            (125.0, 160.0),
        ];
        let aligned = align_face(&image, &landmarks);
        assert_eq!(aligned.dimensions(), (ALIGNED_SIZE, ALIGNED_SIZE));
    }
}
