//! Key bitmap type.

use std::sync::Arc;

use crate::error::TypesError;

/// Bytes per pixel of the raw key image format (blue, green, red).
pub const BYTES_PER_PIXEL: usize = 3;

/// Immutable raw image shown on a single key.
///
/// Pixel data is row-major BGR24. Clones share the pixel buffer.
#[derive(Clone)]
pub struct KeyBitmap {
    width: u16,
    height: u16,
    data: Arc<[u8]>,
}

impl KeyBitmap {
    /// Create a bitmap from raw BGR24 data.
    ///
    /// Fails if a dimension is zero or `data` is not exactly
    /// `width * height * 3` bytes long.
    pub fn new(width: u16, height: u16, data: impl Into<Arc<[u8]>>) -> Result<Self, TypesError> {
        if width == 0 || height == 0 {
            return Err(TypesError::InvalidBitmap(format!(
                "dimensions must be positive, got {width}x{height}"
            )));
        }
        let data = data.into();
        let expected = usize::from(width) * usize::from(height) * BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(TypesError::InvalidBitmap(format!(
                "expected {expected} bytes for {width}x{height}, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A bitmap filled with a single `[blue, green, red]` color.
    pub fn solid(width: u16, height: u16, bgr: [u8; 3]) -> Result<Self, TypesError> {
        let pixels = usize::from(width) * usize::from(height);
        let data: Vec<u8> = bgr.iter().copied().cycle().take(pixels * BYTES_PER_PIXEL).collect();
        Self::new(width, height, data)
    }

    #[must_use]
    pub fn width(&self) -> u16 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u16 {
        self.height
    }

    /// Raw BGR24 pixel data.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl PartialEq for KeyBitmap {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width && self.height == other.height && self.data == other.data
    }
}

impl Eq for KeyBitmap {}

impl std::fmt::Debug for KeyBitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyBitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}
