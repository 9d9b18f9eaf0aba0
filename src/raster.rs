//! Owned pixel buffers produced by the decoder

use rayon::prelude::*;

use crate::error::DecodeFailure;

/// Largest raster side accepted by [`Raster::allocate`].
pub const MAX_RASTER_DIMENSION: u32 = 16_384;

/// Pixel layout of a [`Raster`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 4 bytes per pixel: R, G, B, A.
    Rgba8888,
    /// 2 bytes per pixel, little-endian 5-6-5. No alpha.
    Rgb565,
}

impl PixelFormat {
    #[must_use]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba8888 => 4,
            Self::Rgb565 => 2,
        }
    }
}

/// Raw rendered tile pixels.
#[derive(Clone, PartialEq, Eq)]
pub struct Raster {
    format: PixelFormat,
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Raster {
    /// Allocate a zero-filled raster, failing instead of aborting when the
    /// request is too large.
    pub fn allocate(width: u32, height: u32, format: PixelFormat) -> Result<Self, DecodeFailure> {
        let too_big = || DecodeFailure::Allocation { width, height };

        if width == 0
            || height == 0
            || width > MAX_RASTER_DIMENSION
            || height > MAX_RASTER_DIMENSION
        {
            return Err(too_big());
        }

        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|px| px.checked_mul(format.bytes_per_pixel()))
            .ok_or_else(too_big)?;

        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|_| too_big())?;
        data.resize(len, 0);

        Ok(Self {
            format,
            width,
            height,
            data,
        })
    }

    /// Wrap existing pixel data. Returns `None` when the length does not match.
    #[must_use]
    pub fn from_parts(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Option<Self> {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        (data.len() == expected && expected > 0).then_some(Self {
            format,
            width,
            height,
            data,
        })
    }

    #[must_use]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Bytes per row.
    #[must_use]
    pub fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Memory held by the pixel buffer.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.data.len()
    }

    /// Fill every pixel with an opaque color. Only meaningful for RGBA rasters.
    pub fn fill_rgba(&mut self, rgba: [u8; 4]) {
        if self.format != PixelFormat::Rgba8888 {
            return;
        }
        self.data
            .par_chunks_exact_mut(4)
            .for_each(|px| px.copy_from_slice(&rgba));
    }

    /// Convert to RGB565, halving memory. Alpha is composited onto white.
    /// The output buffer is allocated the same fallible way as
    /// [`Raster::allocate`].
    pub fn into_rgb565(self) -> Result<Self, DecodeFailure> {
        if self.format == PixelFormat::Rgb565 {
            return Ok(self);
        }

        let mut out = Self::allocate(self.width, self.height, PixelFormat::Rgb565)?;
        out.data
            .par_chunks_exact_mut(2)
            .zip(self.data.par_chunks_exact(4))
            .for_each(|(dst, px)| {
                let packed = pack_rgb565(px[0], px[1], px[2], px[3]);
                dst.copy_from_slice(&packed.to_le_bytes());
            });
        Ok(out)
    }
}

impl std::fmt::Debug for Raster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Raster")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[inline]
fn pack_rgb565(r: u8, g: u8, b: u8, a: u8) -> u16 {
    let blend = |c: u8| -> u16 {
        let a = u16::from(a);
        (u16::from(c) * a + 255 * (255 - a)) / 255
    };
    let r = blend(r);
    let g = blend(g);
    let b = blend(b);
    ((r >> 3) << 11) | ((g >> 2) << 5) | (b >> 3)
}
