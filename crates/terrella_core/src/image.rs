//! # Decoded Images
//!
//! Pixel buffers handed over by the image-decode boundary. Decoding is not
//! our business; we only need the pixels and a content key to deduplicate
//! texture uploads.

use std::hash::Hasher;

use siphasher::sip::SipHasher13;

use crate::error::{TerrellaError, TerrellaResult};

/// Content-addressable key for an [`Image`].
///
/// Two images with equal pixels always have equal keys. Equal keys are
/// confirmed with [`Image::same_content`] before being trusted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageKey {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// SipHash-1-3 over the pixel bytes.
    pub hash: u64,
}

/// An RGBA8 image.
#[derive(Clone, Debug)]
pub struct Image {
    width: u32,
    height: u32,
    pixels: Vec<[u8; 4]>,
    key: ImageKey,
}

impl Image {
    /// Builds an image from tightly packed RGBA8 bytes.
    ///
    /// # Errors
    ///
    /// Returns [`TerrellaError::InvalidArgument`] if a dimension is zero or
    /// the byte count is not `width * height * 4`.
    pub fn from_rgba8(width: u32, height: u32, bytes: &[u8]) -> TerrellaResult<Self> {
        if bytes.len() % 4 != 0 {
            return Err(TerrellaError::InvalidArgument(format!(
                "image byte length {} is not a multiple of 4",
                bytes.len()
            )));
        }
        let pixels: &[[u8; 4]] = bytemuck::cast_slice(bytes);
        Self::from_pixels(width, height, pixels.to_vec())
    }

    /// Builds an image from RGBA pixels.
    ///
    /// # Errors
    ///
    /// Returns [`TerrellaError::InvalidArgument`] if a dimension is zero or
    /// the pixel count is not `width * height`.
    pub fn from_pixels(width: u32, height: u32, pixels: Vec<[u8; 4]>) -> TerrellaResult<Self> {
        if width == 0 || height == 0 {
            return Err(TerrellaError::InvalidArgument(format!(
                "image dimensions must be non-zero, got {width}x{height}"
            )));
        }
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(TerrellaError::InvalidArgument(format!(
                "image {width}x{height} needs {expected} pixels, got {}",
                pixels.len()
            )));
        }

        let mut hasher = SipHasher13::new_with_keys(0, 0);
        hasher.write(bytemuck::cast_slice(&pixels));
        let key = ImageKey {
            width,
            height,
            hash: hasher.finish(),
        };

        Ok(Self {
            width,
            height,
            pixels,
            key,
        })
    }

    /// A single-colour image, handy for markers without artwork.
    ///
    /// # Errors
    ///
    /// Returns [`TerrellaError::InvalidArgument`] if a dimension is zero.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> TerrellaResult<Self> {
        let count = width as usize * height as usize;
        Self::from_pixels(width, height, vec![rgba; count])
    }

    /// Width in pixels.
    #[inline]
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[inline]
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// The pixels, row-major.
    #[inline]
    #[must_use]
    pub fn pixels(&self) -> &[[u8; 4]] {
        &self.pixels
    }

    /// The pixels as raw bytes, ready for upload.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    /// The content key.
    #[inline]
    #[must_use]
    pub const fn key(&self) -> ImageKey {
        self.key
    }

    /// True when both images hold identical pixels.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.key == other.key && self.pixels == other.pixels
    }
}
