// Image loading module
// Decodes an image file into an RGBA pixel buffer

use image::ImageError;
use log::{debug, info};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Decoded image ready for texture upload
#[derive(Debug, Clone)]
pub struct ImageAsset {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Raw RGBA pixel data (4 bytes per pixel)
    pub rgba_data: Vec<u8>,
}

impl ImageAsset {
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Failure to turn a path into an `ImageAsset`
#[derive(Debug, Error)]
pub enum LoadError {
    /// Missing or unreadable file, unrecognized or corrupt data
    #[error("cannot decode image {}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The format was recognized but no codec for it is available
    #[error("unsupported image format in {}", .path.display())]
    UnsupportedFormat {
        path: PathBuf,
        #[source]
        source: ImageError,
    },
}

impl LoadError {
    fn decode(path: &Path, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Decode {
            path: path.to_path_buf(),
            source: source.into(),
        }
    }

    /// Classify an error coming out of the decoder
    fn from_image_error(path: &Path, err: ImageError) -> Self {
        if matches!(err, ImageError::Unsupported(_)) {
            Self::UnsupportedFormat {
                path: path.to_path_buf(),
                source: err,
            }
        } else {
            Self::decode(path, err)
        }
    }
}

/// Load and decode an image file
pub fn load_image(path: &Path) -> Result<ImageAsset, LoadError> {
    let data = fs::read(path).map_err(|e| LoadError::decode(path, e))?;
    debug!("Read {} bytes from {}", data.len(), path.display());

    let asset = load_from_bytes(path, &data)?;

    info!("img_path: {}", path.display());
    info!("img_width: {}, img_height: {}", asset.width, asset.height);

    Ok(asset)
}

/// Decode raw bytes, auto-detecting the format from the content
fn load_from_bytes(path: &Path, data: &[u8]) -> Result<ImageAsset, LoadError> {
    // A failed sniff means the bytes are not an image we recognize at all
    let format = image::guess_format(data).map_err(|e| LoadError::decode(path, e))?;
    debug!("Detected format: {:?}", format);

    let img = image::load(Cursor::new(data), format)
        .map_err(|e| LoadError::from_image_error(path, e))?;

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return Err(LoadError::decode(
            path,
            format!("image has no pixels ({}x{})", width, height),
        ));
    }

    Ok(ImageAsset {
        width,
        height,
        rgba_data: rgba.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::error::{ImageFormatHint, UnsupportedError, UnsupportedErrorKind};
    use image::{ImageFormat, Rgba, RgbaImage};
    use tempfile::TempDir;

    fn write_png(dir: &TempDir, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.path().join(name);
        let img = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([x as u8, y as u8, 128, 255])
        });
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn loads_png_with_native_dimensions() {
        let dir = TempDir::new().unwrap();
        let path = write_png(&dir, "gradient.png", 7, 5);

        let asset = load_image(&path).unwrap();
        assert_eq!(asset.size(), (7, 5));
        assert_eq!(asset.rgba_data.len(), 7 * 5 * 4);
        // pixel (3, 2)
        let idx = (2 * 7 + 3) * 4;
        assert_eq!(&asset.rgba_data[idx..idx + 4], &[3, 2, 128, 255]);
    }

    #[test]
    fn format_comes_from_content_not_extension() {
        let dir = TempDir::new().unwrap();
        let png = write_png(&dir, "real.png", 3, 3);
        let disguised = dir.path().join("photo.jpg");
        fs::copy(&png, &disguised).unwrap();

        let asset = load_image(&disguised).unwrap();
        assert_eq!(asset.size(), (3, 3));
    }

    #[test]
    fn missing_file_is_decode_error() {
        let dir = TempDir::new().unwrap();
        let err = load_image(&dir.path().join("nope.png")).unwrap_err();
        assert!(matches!(err, LoadError::Decode { .. }));
        assert!(err.to_string().contains("nope.png"));
    }

    #[test]
    fn non_image_is_decode_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.png");
        fs::write(&path, b"just some text, not pixels").unwrap();

        let err = load_image(&path).unwrap_err();
        assert!(matches!(err, LoadError::Decode { .. }));
    }

    #[test]
    fn truncated_png_is_decode_error() {
        let dir = TempDir::new().unwrap();
        let path = write_png(&dir, "cut.png", 32, 32);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        let err = load_image(&path).unwrap_err();
        assert!(matches!(err, LoadError::Decode { .. }));
    }

    #[test]
    fn missing_codec_is_unsupported_format() {
        let err = ImageError::Unsupported(UnsupportedError::from_format_and_kind(
            ImageFormatHint::Exact(ImageFormat::Avif),
            UnsupportedErrorKind::Format(ImageFormatHint::Exact(ImageFormat::Avif)),
        ));
        let err = LoadError::from_image_error(Path::new("a.avif"), err);
        assert!(matches!(err, LoadError::UnsupportedFormat { .. }));
        assert!(err.to_string().contains("a.avif"));
    }
}
