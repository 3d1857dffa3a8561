//! Decoded forecast icons

use crate::FetchError;
use image::DynamicImage;
use std::sync::Arc;

/// A decoded icon image. Clones share the pixel buffer.
#[derive(Debug, Clone)]
pub struct IconImage {
    image: Arc<DynamicImage>,
}

impl IconImage {
    /// Decode PNG/JPEG bytes, sniffing the format from the content
    pub fn decode(bytes: &[u8]) -> Result<Self, FetchError> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| FetchError::decoding("icon image", e))?;
        Ok(Self {
            image: Arc::new(image),
        })
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    #[must_use]
    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// True if both handles point at the same decoded buffer
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }
}
