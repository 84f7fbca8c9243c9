//! # 解码流水线模块
//!
//! ## 设计思路
//!
//! 将“字节 → 图像 → RGBA”的过程集中管理，并在关键节点增加资源上限控制。
//! 优先做尺寸检查，再进行完整解码，降低恶意输入触发高内存开销的风险。
//!
//! ## 实现思路
//!
//! 1. 猜测格式并读取 header 尺寸
//! 2. 按像素上限与内存上限快速拒绝
//! 3. 完整解码
//! 4. 转换 RGBA，并记录显示尺寸

use image::{GenericImageView, ImageReader};
use std::io::Cursor;

use super::geometry::Size;
use super::source::{RawImageData, SourceImage};
use super::{CropExporter, DecodeError, ExportConfig};

impl CropExporter {
    /// 将原始字节解码为源图。
    pub(crate) fn decode_source(
        raw: RawImageData,
        display: Option<Size>,
        config: &ExportConfig,
    ) -> Result<SourceImage, DecodeError> {
        image::guess_format(&raw.bytes)
            .map_err(|e| DecodeError::InvalidFormat(format!("不支持的图片格式：{}", e)))?;

        let (header_width, header_height) = Self::inspect_dimensions_from_memory(&raw.bytes)?;
        Self::validate_pixel_limits(config, header_width, header_height)?;
        Self::validate_decoded_memory_limits(config, header_width, header_height)?;

        let decoded = image::load_from_memory(&raw.bytes)
            .map_err(|e| DecodeError::Malformed(format!("图片解码失败：{}", e)))?;

        let (width, height) = decoded.dimensions();
        if width == 0 || height == 0 {
            return Err(DecodeError::Malformed("图片尺寸为 0".to_string()));
        }
        Self::validate_pixel_limits(config, width, height)?;

        log::info!(
            "✅ 图片解码成功 - 来源: {} 尺寸: {}x{}",
            raw.source_hint,
            width,
            height
        );

        Ok(SourceImage::new(decoded.to_rgba8()).with_display_size(display))
    }

    /// 仅通过内存中的图片头信息读取宽高。
    fn inspect_dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), DecodeError> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| DecodeError::InvalidFormat(format!("无法识别图片格式：{}", e)))?;

        reader
            .into_dimensions()
            .map_err(|e| DecodeError::InvalidFormat(format!("无法读取图片尺寸：{}", e)))
    }

    fn validate_pixel_limits(config: &ExportConfig, width: u32, height: u32) -> Result<(), DecodeError> {
        let pixels = (width as u64)
            .checked_mul(height as u64)
            .ok_or_else(|| DecodeError::ResourceLimit("图片像素数溢出".to_string()))?;

        if pixels > config.max_decoded_pixels {
            return Err(DecodeError::ResourceLimit(format!(
                "图片像素过大：{} 像素（限制：{} 像素）",
                pixels, config.max_decoded_pixels
            )));
        }

        Ok(())
    }

    fn validate_decoded_memory_limits(
        config: &ExportConfig,
        width: u32,
        height: u32,
    ) -> Result<(), DecodeError> {
        let estimated = (width as u64)
            .checked_mul(height as u64)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or_else(|| DecodeError::ResourceLimit("图片解码内存估算溢出".to_string()))?;

        if estimated > config.max_decoded_bytes {
            return Err(DecodeError::ResourceLimit(format!(
                "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
                estimated as f64 / 1024.0 / 1024.0,
                config.max_decoded_bytes as f64 / 1024.0 / 1024.0
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};

    fn create_png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgba([(x % 255) as u8, (y % 255) as u8, ((x + y) % 255) as u8, 255])
        });

        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("failed to encode test image");
        cursor.into_inner()
    }

    fn raw(bytes: Vec<u8>) -> RawImageData {
        RawImageData {
            bytes,
            source_hint: "test",
        }
    }

    #[test]
    fn decode_records_natural_and_display_size() {
        let source = CropExporter::decode_source(
            raw(create_png_bytes(120, 80)),
            Some(Size::new(60.0, 40.0)),
            &ExportConfig::default(),
        )
        .expect("decode should succeed");

        assert_eq!((source.natural_width(), source.natural_height()), (120, 80));
        assert_eq!(source.display_size(), Size::new(60.0, 40.0));
        assert_eq!(source.scale_factors(), (2.0, 2.0));
    }

    #[test]
    fn rejects_too_many_pixels_before_full_decode() {
        let mut config = ExportConfig::default();
        config.max_decoded_pixels = 1_000;

        let result = CropExporter::decode_source(raw(create_png_bytes(100, 100)), None, &config);

        assert!(matches!(result, Err(DecodeError::ResourceLimit(_))));
    }

    #[test]
    fn rejects_memory_estimate_over_limit() {
        let mut config = ExportConfig::default();
        config.max_decoded_bytes = 4 * 50 * 50 - 1;

        let result = CropExporter::decode_source(raw(create_png_bytes(50, 50)), None, &config);

        assert!(matches!(result, Err(DecodeError::ResourceLimit(_))));
    }

    #[test]
    fn truncated_png_fails_to_decode() {
        let mut bytes = create_png_bytes(64, 64);
        bytes.truncate(bytes.len() / 2);

        let result = CropExporter::decode_source(raw(bytes), None, &ExportConfig::default());

        assert!(matches!(
            result,
            Err(DecodeError::Malformed(_)) | Err(DecodeError::InvalidFormat(_))
        ));
    }

    #[test]
    fn unknown_bytes_are_invalid_format() {
        let result =
            CropExporter::decode_source(raw(b"not an image".to_vec()), None, &ExportConfig::default());
        assert!(matches!(result, Err(DecodeError::InvalidFormat(_))));
    }
}
