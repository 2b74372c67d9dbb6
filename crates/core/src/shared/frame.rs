use ndarray::ArrayView3;

use crate::shared::region::FaceRegion;

/// A single sensor color frame: contiguous pixel bytes in row-major order.
///
/// Pixel format conversion happens at the sensor boundary only; everything
/// downstream treats the buffer as opaque rows of `bytes_per_pixel` cells.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    bytes_per_pixel: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, bytes_per_pixel: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (bytes_per_pixel as usize),
            "data length must equal width * height * bytes_per_pixel"
        );
        Self {
            data,
            width,
            height,
            bytes_per_pixel,
            index,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bytes_per_pixel(&self) -> u8 {
        self.bytes_per_pixel
    }

    /// Row stride in bytes.
    pub fn stride(&self) -> u32 {
        self.width * self.bytes_per_pixel as u32
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Copies the pixels under `region` into a new frame with the same
    /// index. The region must already be clamped to the frame bounds;
    /// returns `None` for a degenerate (empty) region.
    pub fn crop(&self, region: &FaceRegion) -> Option<Frame> {
        let clamped = region.clamped_to(self.width, self.height);
        if clamped.is_empty() {
            return None;
        }

        let view = self.as_ndarray();
        let (x, y) = (clamped.x as usize, clamped.y as usize);
        let (w, h) = (clamped.width as usize, clamped.height as usize);
        let sub = view.slice(ndarray::s![y..y + h, x..x + w, ..]);
        let data: Vec<u8> = sub.iter().copied().collect();

        Some(Frame::new(
            data,
            w as u32,
            h as u32,
            self.bytes_per_pixel,
            self.index,
        ))
    }

    /// PNG-encodes the frame for snapshot retention. `None` when the
    /// pixel layout has no image-crate equivalent or encoding fails;
    /// callers treat that as missing information.
    pub fn encode_png(&self) -> Option<Vec<u8>> {
        let mut out = std::io::Cursor::new(Vec::new());
        let ok = match self.bytes_per_pixel {
            1 => image::GrayImage::from_raw(self.width, self.height, self.data.clone())?
                .write_to(&mut out, image::ImageFormat::Png)
                .is_ok(),
            3 => image::RgbImage::from_raw(self.width, self.height, self.data.clone())?
                .write_to(&mut out, image::ImageFormat::Png)
                .is_ok(),
            4 => image::RgbaImage::from_raw(self.width, self.height, self.data.clone())?
                .write_to(&mut out, image::ImageFormat::Png)
                .is_ok(),
            _ => false,
        };
        ok.then(|| out.into_inner())
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.bytes_per_pixel as usize,
        )
    }
}
