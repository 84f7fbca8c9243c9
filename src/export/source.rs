//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“外部输入类型”和“流水线中间结果”解耦：
//! - `ImageSource` 表示外部来源语义
//! - `RawImageData` 表示已加载但未解码的字节
//! - `SourceImage` 表示已解码的位图及其显示尺寸

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use super::geometry::Size;

/// 图片输入来源。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ImageSource {
    /// 网络地址来源。
    Url(String),
    /// Base64（支持 Data URL 与纯 Base64 字符串）。
    Base64(String),
    /// 本地文件路径来源。
    FilePath(String),
}

impl ImageSource {
    /// 按字符串前缀推断来源类型。
    ///
    /// 网页端只传一个字符串（URL 或 data URI），这里做同样的宽松识别。
    pub fn detect(reference: &str) -> Self {
        let trimmed = reference.trim();
        let lower = trimmed.to_ascii_lowercase();

        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Url(trimmed.to_string())
        } else if lower.starts_with("data:") {
            Self::Base64(trimmed.to_string())
        } else {
            Self::FilePath(trimmed.to_string())
        }
    }

    /// 来源标识（用于日志与诊断）。
    pub(crate) fn hint(&self) -> &'static str {
        match self {
            Self::Url(_) => "url",
            Self::Base64(_) => "base64",
            Self::FilePath(_) => "file",
        }
    }
}

/// 加载阶段输出：原始字节与来源标识。
pub(crate) struct RawImageData {
    /// 原始图片字节。
    pub(crate) bytes: Vec<u8>,
    /// 来源提示（用于日志与诊断）。
    pub(crate) source_hint: &'static str,
}

/// 解码后的源图。
///
/// `display_*` 是裁剪界面渲染该图时的尺寸，未提供时等于真实尺寸。
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub(crate) bitmap: RgbaImage,
    pub(crate) display_width: f64,
    pub(crate) display_height: f64,
}

impl SourceImage {
    pub fn new(bitmap: RgbaImage) -> Self {
        let (width, height) = bitmap.dimensions();
        Self {
            bitmap,
            display_width: width as f64,
            display_height: height as f64,
        }
    }

    /// 记录界面渲染尺寸；非正数或非有限值时保持真实尺寸。
    pub fn with_display_size(mut self, display: Option<Size>) -> Self {
        if let Some(size) = display {
            if size.width.is_finite() && size.height.is_finite() && size.width > 0.0 && size.height > 0.0 {
                self.display_width = size.width;
                self.display_height = size.height;
            } else {
                log::warn!("⚠️ 忽略无效显示尺寸：{:?}", size);
            }
        }
        self
    }

    pub fn natural_width(&self) -> u32 {
        self.bitmap.width()
    }

    pub fn natural_height(&self) -> u32 {
        self.bitmap.height()
    }

    pub fn display_size(&self) -> Size {
        Size::new(self.display_width, self.display_height)
    }

    /// 显示坐标到真实像素的缩放因子 `(scale_x, scale_y)`。
    pub fn scale_factors(&self) -> (f64, f64) {
        (
            self.natural_width() as f64 / self.display_width,
            self.natural_height() as f64 / self.display_height,
        )
    }

    pub fn bitmap(&self) -> &RgbaImage {
        &self.bitmap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_recognizes_each_reference_kind() {
        assert!(matches!(ImageSource::detect("https://cdn.example.com/a.jpg"), ImageSource::Url(_)));
        assert!(matches!(ImageSource::detect("  HTTP://x/y.png"), ImageSource::Url(_)));
        assert!(matches!(
            ImageSource::detect("data:image/png;base64,AAAA"),
            ImageSource::Base64(_)
        ));
        assert!(matches!(ImageSource::detect("/tmp/avatar.png"), ImageSource::FilePath(_)));
    }

    #[test]
    fn scale_factors_follow_display_size() {
        let source = SourceImage::new(RgbaImage::new(1200, 800))
            .with_display_size(Some(Size::new(600.0, 400.0)));
        assert_eq!(source.scale_factors(), (2.0, 2.0));
    }

    #[test]
    fn missing_or_invalid_display_size_means_unit_scale() {
        let source = SourceImage::new(RgbaImage::new(300, 200));
        assert_eq!(source.scale_factors(), (1.0, 1.0));

        let source = source.with_display_size(Some(Size::new(0.0, 200.0)));
        assert_eq!(source.scale_factors(), (1.0, 1.0));
    }
}
