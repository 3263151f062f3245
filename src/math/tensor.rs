use image::RgbImage;

/// Dense `height × width × channels` tensor stored in HWC order, the layout
/// convolution layers read and write.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor3 {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
    pub data: Vec<f32>,
}

impl Tensor3 {
    pub fn zeros(height: usize, width: usize, channels: usize) -> Tensor3 {
        Tensor3 {
            height,
            width,
            channels,
            data: vec![0.0; height * width * channels],
        }
    }

    /// Wraps a flat HWC buffer. Panics if the length does not match the shape.
    pub fn from_vec(height: usize, width: usize, channels: usize, data: Vec<f32>) -> Tensor3 {
        assert_eq!(
            data.len(),
            height * width * channels,
            "Tensor3 buffer does not match {}x{}x{}",
            height, width, channels
        );
        Tensor3 { height, width, channels, data }
    }

    /// Converts an 8-bit RGB image to `[0, 1]` floats.
    pub fn from_rgb_image(img: &RgbImage) -> Tensor3 {
        let (width, height) = img.dimensions();
        Tensor3 {
            height: height as usize,
            width: width as usize,
            channels: 3,
            data: img.as_raw().iter().map(|&p| p as f32 / 255.0).collect(),
        }
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height, self.width, self.channels)
    }

    #[inline]
    pub fn offset(&self, y: usize, x: usize) -> usize {
        (y * self.width + x) * self.channels
    }

    /// All channel values of one pixel.
    #[inline]
    pub fn pixel(&self, y: usize, x: usize) -> &[f32] {
        let o = self.offset(y, x);
        &self.data[o..o + self.channels]
    }

    #[inline]
    pub fn pixel_mut(&mut self, y: usize, x: usize) -> &mut [f32] {
        let o = self.offset(y, x);
        let c = self.channels;
        &mut self.data[o..o + c]
    }

    /// Mirrors the tensor along its width axis.
    pub fn flip_horizontal(&self) -> Tensor3 {
        let mut out = Tensor3::zeros(self.height, self.width, self.channels);
        for y in 0..self.height {
            for x in 0..self.width {
                out.pixel_mut(y, self.width - 1 - x)
                    .copy_from_slice(self.pixel(y, x));
            }
        }
        out
    }

    /// Consumes the tensor into its flat HWC buffer (the flatten layer).
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}
