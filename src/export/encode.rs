//! JPEG 编码与导出结果。

use base64::{Engine as _, engine::general_purpose};
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;

use super::ExportError;

pub const JPEG_MIME: &str = "image/jpeg";

/// JPEG 帧头的宽高字段为 16 位。
pub const MAX_JPEG_DIMENSION: u32 = u16::MAX as u32;

/// 导出结果：可直接上传的 JPEG 字节。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedImage {
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

impl ExportedImage {
    pub fn mime_type(&self) -> &'static str {
        JPEG_MIME
    }

    /// 纯 Base64（上传请求体使用）。
    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.bytes)
    }

    /// `data:image/jpeg;base64,...`
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type(), self.to_base64())
    }
}

pub(crate) fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<ExportedImage, ExportError> {
    let mut bytes = Vec::with_capacity(frame.as_raw().len() / 4);
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
    encoder
        .encode_image(frame)
        .map_err(|e| ExportError::Encode(format!("JPEG 编码失败：{}", e)))?;

    Ok(ExportedImage {
        width: frame.width(),
        height: frame.height(),
        bytes,
    })
}
