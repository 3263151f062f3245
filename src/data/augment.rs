use rand::rngs::StdRng;
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::math::Tensor3;

/// How pixels that map outside the source image are filled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMode {
    /// Repeat the nearest edge pixel.
    Nearest,
    /// Use a fixed value for every channel.
    Constant(f32),
}

/// Random geometric augmentation applied to training images.
///
/// Ranges are symmetric: a sample draws rotation from `±rotation_range`
/// degrees, vertical/horizontal shift from `±height/width_shift_range` times
/// the image size, shear from `±shear_range` degrees and an independent zoom
/// factor per axis from `1 ± zoom_range`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentationPolicy {
    pub rotation_range: f32,
    pub width_shift_range: f32,
    pub height_shift_range: f32,
    pub shear_range: f32,
    pub zoom_range: f32,
    pub horizontal_flip: bool,
    pub fill_mode: FillMode,
}

impl Default for AugmentationPolicy {
    fn default() -> Self {
        AugmentationPolicy {
            rotation_range: 20.0,
            width_shift_range: 0.2,
            height_shift_range: 0.2,
            shear_range: 0.2,
            zoom_range: 0.2,
            horizontal_flip: true,
            fill_mode: FillMode::Nearest,
        }
    }
}

/// One concrete draw of the policy. Shifts are in pixels, angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformParams {
    pub theta: f32,
    pub tx: f32,
    pub ty: f32,
    pub shear: f32,
    pub zx: f32,
    pub zy: f32,
    pub flip_horizontal: bool,
}

impl TransformParams {
    pub fn identity() -> TransformParams {
        TransformParams {
            theta: 0.0,
            tx: 0.0,
            ty: 0.0,
            shear: 0.0,
            zx: 1.0,
            zy: 1.0,
            flip_horizontal: false,
        }
    }

    /// Maps output `(row, col, 1)` coordinates to source coordinates:
    /// rotation · shift · shear · zoom, taken about the image centre.
    fn matrix(&self, height: usize, width: usize) -> [[f32; 3]; 3] {
        let theta = self.theta.to_radians();
        let shear = self.shear.to_radians();
        let rotation = [
            [theta.cos(), -theta.sin(), 0.0],
            [theta.sin(), theta.cos(), 0.0],
            [0.0, 0.0, 1.0],
        ];
        let shift = [[1.0, 0.0, self.tx], [0.0, 1.0, self.ty], [0.0, 0.0, 1.0]];
        let shear = [[1.0, -shear.sin(), 0.0], [0.0, shear.cos(), 0.0], [0.0, 0.0, 1.0]];
        let zoom = [[self.zx, 0.0, 0.0], [0.0, self.zy, 0.0], [0.0, 0.0, 1.0]];

        let o_r = height as f32 / 2.0 - 0.5;
        let o_c = width as f32 / 2.0 - 0.5;
        let offset = [[1.0, 0.0, o_r], [0.0, 1.0, o_c], [0.0, 0.0, 1.0]];
        let reset = [[1.0, 0.0, -o_r], [0.0, 1.0, -o_c], [0.0, 0.0, 1.0]];

        [offset, rotation, shift, shear, zoom, reset]
            .iter()
            .fold(IDENTITY, |acc, m| mat3_mul(&acc, m))
    }
}

const IDENTITY: [[f32; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

fn mat3_mul(a: &[[f32; 3]; 3], b: &[[f32; 3]; 3]) -> [[f32; 3]; 3] {
    let mut result = [[0.0f32; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            result[i][j] = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
        }
    }
    result
}

fn symmetric<R: Rng + ?Sized>(range: f32, rng: &mut R) -> f32 {
    if range > 0.0 {
        rng.gen_range(-range..=range)
    } else {
        0.0
    }
}

impl AugmentationPolicy {
    /// Draws transform parameters for an image of `height × width`.
    pub fn random_params<R: Rng + ?Sized>(&self, height: usize, width: usize, rng: &mut R) -> TransformParams {
        let theta = symmetric(self.rotation_range, rng);
        let tx = symmetric(self.height_shift_range, rng) * height as f32;
        let ty = symmetric(self.width_shift_range, rng) * width as f32;
        let shear = symmetric(self.shear_range, rng);
        let (zx, zy) = if self.zoom_range > 0.0 {
            let lo = 1.0 - self.zoom_range;
            let hi = 1.0 + self.zoom_range;
            (rng.gen_range(lo..=hi), rng.gen_range(lo..=hi))
        } else {
            (1.0, 1.0)
        };
        let flip_horizontal = self.horizontal_flip && rng.gen::<f32>() < 0.5;

        TransformParams { theta, tx, ty, shear, zx, zy, flip_horizontal }
    }

    /// Warps `image` with `params` (bilinear sampling, then the optional flip).
    pub fn apply(&self, image: &Tensor3, params: &TransformParams) -> Tensor3 {
        let (h, w, c) = image.shape();
        let m = params.matrix(h, w);
        let mut out = Tensor3::zeros(h, w, c);
        let (max_r, max_c) = ((h - 1) as f32, (w - 1) as f32);

        for r in 0..h {
            for col in 0..w {
                let (rf, cf) = (r as f32, col as f32);
                let mut sr = m[0][0] * rf + m[0][1] * cf + m[0][2];
                let mut sc = m[1][0] * rf + m[1][1] * cf + m[1][2];

                match self.fill_mode {
                    FillMode::Nearest => {
                        sr = sr.clamp(0.0, max_r);
                        sc = sc.clamp(0.0, max_c);
                    }
                    FillMode::Constant(value) => {
                        if sr < 0.0 || sr > max_r || sc < 0.0 || sc > max_c {
                            out.pixel_mut(r, col).iter_mut().for_each(|v| *v = value);
                            continue;
                        }
                    }
                }

                let r0 = sr.floor() as usize;
                let c0 = sc.floor() as usize;
                let r1 = (r0 + 1).min(h - 1);
                let c1 = (c0 + 1).min(w - 1);
                let fr = sr - r0 as f32;
                let fc = sc - c0 as f32;

                let (p00, p01) = (image.pixel(r0, c0), image.pixel(r0, c1));
                let (p10, p11) = (image.pixel(r1, c0), image.pixel(r1, c1));
                let dst = out.pixel_mut(r, col);
                for ch in 0..c {
                    let top = p00[ch] * (1.0 - fc) + p01[ch] * fc;
                    let bottom = p10[ch] * (1.0 - fc) + p11[ch] * fc;
                    dst[ch] = top * (1.0 - fr) + bottom * fr;
                }
            }
        }

        if params.flip_horizontal {
            out.flip_horizontal()
        } else {
            out
        }
    }

    /// Draws fresh parameters and applies them.
    pub fn random_transform<R: Rng + ?Sized>(&self, image: &Tensor3, rng: &mut R) -> Tensor3 {
        let params = self.random_params(image.height, image.width, rng);
        self.apply(image, &params)
    }
}

/// A per-sample image transform used by the training pipeline.
pub trait Augment: Sync {
    fn augment(&self, image: &Tensor3, rng: &mut StdRng) -> Tensor3;
}

impl Augment for AugmentationPolicy {
    fn augment(&self, image: &Tensor3, rng: &mut StdRng) -> Tensor3 {
        self.random_transform(image, rng)
    }
}
