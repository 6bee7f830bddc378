//! Image decoding for texture uploads

use crate::assets::AssetError;
use std::path::Path;

/// Decoded RGBA8 image ready for GPU upload
#[derive(Debug, Clone)]
pub struct ImageData {
    /// Raw RGBA pixel data
    pub data: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Channels in `data`, always 4 after conversion
    pub channels: u8,
    /// Channels in the source file before conversion
    pub source_channels: u8,
}

impl ImageData {
    /// Load an image file and convert it to RGBA8
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AssetError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AssetError::NotFound(path.display().to_string()));
        }

        let img = image::open(path)
            .map_err(|e| AssetError::LoadFailed(format!("{}: {}", path.display(), e)))?;
        let source_channels = img.color().channel_count();
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();

        log::debug!("Loaded image {}x{} ({} channels) from {:?}", width, height, source_channels, path);

        Ok(Self {
            data: rgba.into_raw(),
            width,
            height,
            channels: 4,
            source_channels,
        })
    }

    /// Decode an in-memory image
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AssetError> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| AssetError::LoadFailed(format!("Failed to decode image: {}", e)))?;
        let source_channels = img.color().channel_count();
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();

        Ok(Self {
            data: rgba.into_raw(),
            width,
            height,
            channels: 4,
            source_channels,
        })
    }

    /// A solid color image, used for the default texture
    pub fn solid_color(width: u32, height: u32, color: [u8; 4]) -> Self {
        let data = color.repeat((width * height) as usize);
        Self {
            data,
            width,
            height,
            channels: 4,
            source_channels: 4,
        }
    }

    /// Size of the pixel data in bytes
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_color_image() {
        let img = ImageData::solid_color(2, 3, [255, 0, 0, 255]);
        assert_eq!(img.size_bytes(), 2 * 3 * 4);
        assert_eq!(&img.data[4..8], &[255, 0, 0, 255]);
    }

    #[test]
    fn test_png_round_trip_through_decoder() {
        let mut png = Vec::new();
        let source = image::RgbImage::from_pixel(3, 2, image::Rgb([10, 20, 30]));
        image::DynamicImage::ImageRgb8(source)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let img = ImageData::from_bytes(&png).unwrap();
        assert_eq!((img.width, img.height), (3, 2));
        assert_eq!(img.source_channels, 3);
        assert_eq!(img.channels, 4);
        assert_eq!(&img.data[0..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = ImageData::from_file("does/not/exist.png").unwrap_err();
        assert!(matches!(err, AssetError::NotFound(_)));
    }
}
