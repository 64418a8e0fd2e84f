//! Fixed-size 1-bit frame buffer and its on-disk BMP form.

use std::fmt;
use std::io::{self, Write};

use image::{GrayImage, Luma};

/// Portrait-oriented 300×400 monochrome bitmap, one bit per pixel.
///
/// Rows are packed most-significant bit first; a set bit is white. This is
/// the same bit order the panel expects and the one 1-bpp BMP files use with
/// a black/white palette.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    bits: Vec<u8>,
}

impl Frame {
    pub const WIDTH: u32 = 300;
    pub const HEIGHT: u32 = 400;
    /// Bytes per packed row.
    pub const STRIDE: usize = (Self::WIDTH as usize).div_ceil(8);

    const BMP_HEADER_LEN: u32 = 14 + 40 + 8;
    const BMP_ROW_LEN: usize = (Self::WIDTH as usize).div_ceil(32) * 4;

    /// All-white frame. Row padding bits stay clear.
    pub fn blank() -> Self {
        let tail_bits = Self::WIDTH % 8;
        let tail = if tail_bits == 0 {
            0xFF
        } else {
            0xFFu8 << (8 - tail_bits)
        };
        let mut row = vec![0xFF; Self::STRIDE];
        row[Self::STRIDE - 1] = tail;
        Self {
            bits: row.repeat(Self::HEIGHT as usize),
        }
    }

    /// Threshold an already quantized grayscale image of exactly frame size.
    ///
    /// Returns `None` when the dimensions do not match.
    pub fn from_luma(img: &GrayImage) -> Option<Self> {
        if img.dimensions() != (Self::WIDTH, Self::HEIGHT) {
            return None;
        }
        let mut bits = vec![0u8; Self::STRIDE * Self::HEIGHT as usize];
        for (x, y, Luma([value])) in img.enumerate_pixels() {
            if *value >= 128 {
                let idx = y as usize * Self::STRIDE + x as usize / 8;
                bits[idx] |= 0x80 >> (x % 8);
            }
        }
        Some(Self { bits })
    }

    pub fn is_white(&self, x: u32, y: u32) -> bool {
        if x >= Self::WIDTH || y >= Self::HEIGHT {
            return false;
        }
        let idx = y as usize * Self::STRIDE + x as usize / 8;
        self.bits[idx] & (0x80 >> (x % 8)) != 0
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, white: bool) {
        if x >= Self::WIDTH || y >= Self::HEIGHT {
            return;
        }
        let idx = y as usize * Self::STRIDE + x as usize / 8;
        let mask = 0x80 >> (x % 8);
        if white {
            self.bits[idx] |= mask;
        } else {
            self.bits[idx] &= !mask;
        }
    }

    /// Packed rows, top to bottom.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    pub fn black_pixel_count(&self) -> usize {
        (0..Self::HEIGHT)
            .flat_map(|y| (0..Self::WIDTH).map(move |x| (x, y)))
            .filter(|&(x, y)| !self.is_white(x, y))
            .count()
    }

    pub fn to_luma(&self) -> GrayImage {
        GrayImage::from_fn(Self::WIDTH, Self::HEIGHT, |x, y| {
            if self.is_white(x, y) {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    /// Serialize as an uncompressed, bottom-up 1-bpp BMP with a black/white palette.
    pub fn write_bmp<W: Write>(&self, mut out: W) -> io::Result<()> {
        let image_len = (Self::BMP_ROW_LEN * Self::HEIGHT as usize) as u32;
        let file_len = Self::BMP_HEADER_LEN + image_len;

        // BITMAPFILEHEADER
        out.write_all(b"BM")?;
        out.write_all(&file_len.to_le_bytes())?;
        out.write_all(&0u32.to_le_bytes())?;
        out.write_all(&Self::BMP_HEADER_LEN.to_le_bytes())?;

        // BITMAPINFOHEADER
        out.write_all(&40u32.to_le_bytes())?;
        out.write_all(&(Self::WIDTH as i32).to_le_bytes())?;
        out.write_all(&(Self::HEIGHT as i32).to_le_bytes())?;
        out.write_all(&1u16.to_le_bytes())?;
        out.write_all(&1u16.to_le_bytes())?;
        out.write_all(&0u32.to_le_bytes())?;
        out.write_all(&image_len.to_le_bytes())?;
        out.write_all(&2835i32.to_le_bytes())?;
        out.write_all(&2835i32.to_le_bytes())?;
        out.write_all(&2u32.to_le_bytes())?;
        out.write_all(&2u32.to_le_bytes())?;

        // Palette: index 0 black, index 1 white.
        out.write_all(&[0, 0, 0, 0, 255, 255, 255, 0])?;

        let padding = [0u8; 4];
        let pad_len = Self::BMP_ROW_LEN - Self::STRIDE;
        for row in self.bits.chunks_exact(Self::STRIDE).rev() {
            out.write_all(row)?;
            out.write_all(&padding[..pad_len])?;
        }
        out.flush()
    }

    pub fn to_bmp(&self) -> Vec<u8> {
        let len = Self::BMP_HEADER_LEN as usize + Self::BMP_ROW_LEN * Self::HEIGHT as usize;
        let mut buf = Vec::with_capacity(len);
        // Writing into a Vec cannot fail.
        let _ = self.write_bmp(&mut buf);
        buf
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &Self::WIDTH)
            .field("height", &Self::HEIGHT)
            .field("black_pixels", &self.black_pixel_count())
            .finish()
    }
}
