//! # 核心编排模块
//!
//! ## 设计思路
//!
//! `CropExporter` 只负责流程编排与配置管理。
//! 处理链路固定为：
//! 1. 校验裁剪区域（失败时不做任何解码或画布分配）
//! 2. 读取配置快照
//! 3. 按来源加载原始字节
//! 4. 解码为源图
//! 5. 渲染（缩放 + 中心旋转）
//! 6. JPEG 编码
//!
//! ## 实现思路
//!
//! - 配置通过 `Arc<RwLock<ExportConfig>>` 支持运行时切换档位。
//! - 单次导出使用“同一配置快照”，避免处理中途配置漂移。
//! - 下载过的 URL 字节放入 LRU 缓存，同一裁剪会话重试时无需重新下载。
//! - 记录 `load/decode/render/encode/total` 阶段耗时。

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use super::encode::{ExportedImage, MAX_JPEG_DIMENSION, encode_jpeg};
use super::geometry::{PixelCrop, Size};
use super::render::render_crop;
use super::source::{ImageSource, SourceImage};
use super::{ExportConfig, ExportError, ResampleProfile};

/// 一次导出请求。
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub source: ImageSource,
    pub crop: PixelCrop,
    pub rotation: i64,
    /// 裁剪界面渲染源图的尺寸；为空时按真实尺寸处理。
    pub display: Option<Size>,
}

/// 裁剪导出器。
pub struct CropExporter {
    config: Arc<RwLock<ExportConfig>>,
    source_cache: Mutex<LruCache<String, Vec<u8>>>,
}

impl CropExporter {
    pub fn new(config: ExportConfig) -> Result<Self, ExportError> {
        if !(1..=100).contains(&config.jpeg_quality) {
            return Err(ExportError::Config(format!(
                "jpeg_quality 必须在 1~100 之间：{}",
                config.jpeg_quality
            )));
        }

        let capacity = NonZeroUsize::new(config.source_cache_entries.max(1))
            .unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            source_cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// 获取配置快照。
    pub fn config_snapshot(&self) -> Result<ExportConfig, ExportError> {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .map_err(|_| ExportError::Config("配置读取锁已中毒".to_string()))
    }

    /// 切换重采样档位。
    pub fn set_resample_profile(&self, profile: &str) -> Result<(), ExportError> {
        let profile = ResampleProfile::parse(profile)?;
        let mut config = self
            .config
            .write()
            .map_err(|_| ExportError::Config("配置写入锁已中毒".to_string()))?;
        config.apply_resample_profile(profile);

        log::info!(
            "⚙️ 已切换重采样档位：{}（filter={:?}）",
            profile.as_str(),
            config.resample_filter
        );

        Ok(())
    }

    pub fn resample_profile(&self) -> Result<ResampleProfile, ExportError> {
        Ok(self.config_snapshot()?.resample_profile())
    }

    /// 加载并解码源图（裁剪会话打开时调用一次）。
    pub async fn load(&self, source: &ImageSource, display: Option<Size>) -> Result<SourceImage, ExportError> {
        let config = self.config_snapshot()?;
        let raw = self.load_source(source, &config).await?;
        Ok(Self::decode_source(raw, display, &config)?)
    }

    /// 导出主入口：加载 → 解码 → 渲染 → 编码。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use crop_upload::export::{CropExporter, ExportConfig, ExportRequest, ImageSource, PixelCrop, Size};
    ///
    /// # async fn demo() -> Result<(), crop_upload::export::ExportError> {
    /// let exporter = CropExporter::new(ExportConfig::default())?;
    /// let image = exporter
    ///     .export(&ExportRequest {
    ///         source: ImageSource::detect("https://example.com/avatar.png"),
    ///         crop: PixelCrop::new(100, 50, 200, 200),
    ///         rotation: 90,
    ///         display: Some(Size::new(600.0, 400.0)),
    ///     })
    ///     .await?;
    /// assert_eq!((image.width, image.height), (200, 200));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn export(&self, request: &ExportRequest) -> Result<ExportedImage, ExportError> {
        let (width, height) = request.crop.output_dimensions()?;
        let config = self.config_snapshot()?;
        Self::validate_output_size(&config, width, height)?;

        let total_start = Instant::now();

        let load_start = Instant::now();
        let raw = self.load_source(&request.source, &config).await?;
        let load_elapsed = load_start.elapsed();

        let decode_start = Instant::now();
        let source = Self::decode_source(raw, request.display, &config)?;
        let decode_elapsed = decode_start.elapsed();

        let (image, render_elapsed, encode_elapsed) =
            Self::render_and_encode(&source, &request.crop, request.rotation, &config)?;

        log::info!(
            "✅ 裁剪导出完成 - 来源: {} 输出: {}x{} 旋转: {}° load={}ms decode={}ms render={}ms encode={}ms total={}ms",
            request.source.hint(),
            image.width,
            image.height,
            request.rotation,
            load_elapsed.as_millis(),
            decode_elapsed.as_millis(),
            render_elapsed.as_millis(),
            encode_elapsed.as_millis(),
            total_start.elapsed().as_millis()
        );

        Ok(image)
    }

    /// 对已解码的源图导出，不再访问来源。
    pub fn export_decoded(
        &self,
        source: &SourceImage,
        crop: &PixelCrop,
        rotation: i64,
    ) -> Result<ExportedImage, ExportError> {
        let (width, height) = crop.output_dimensions()?;
        let config = self.config_snapshot()?;
        Self::validate_output_size(&config, width, height)?;

        let (image, render_elapsed, encode_elapsed) =
            Self::render_and_encode(source, crop, rotation, &config)?;

        log::info!(
            "✅ 裁剪导出完成 - 输出: {}x{} 旋转: {}° render={}ms encode={}ms",
            image.width,
            image.height,
            rotation,
            render_elapsed.as_millis(),
            encode_elapsed.as_millis()
        );

        Ok(image)
    }

    fn render_and_encode(
        source: &SourceImage,
        crop: &PixelCrop,
        rotation: i64,
        config: &ExportConfig,
    ) -> Result<(ExportedImage, std::time::Duration, std::time::Duration), ExportError> {
        let render_start = Instant::now();
        let frame = render_crop(source, crop, rotation, config.resample_filter)?;
        let render_elapsed = render_start.elapsed();

        let encode_start = Instant::now();
        let image = encode_jpeg(&frame, config.jpeg_quality)?;
        let encode_elapsed = encode_start.elapsed();

        Ok((image, render_elapsed, encode_elapsed))
    }

    fn validate_output_size(config: &ExportConfig, width: u32, height: u32) -> Result<(), ExportError> {
        if width > MAX_JPEG_DIMENSION || height > MAX_JPEG_DIMENSION {
            return Err(ExportError::InvalidCrop(format!(
                "裁剪边长超出 JPEG 上限：{}x{}（单边上限 {}）",
                width, height, MAX_JPEG_DIMENSION
            )));
        }

        let pixels = width as u64 * height as u64;
        if pixels > config.max_output_pixels {
            return Err(ExportError::InvalidCrop(format!(
                "裁剪尺寸过大：{}x{}（上限 {} 像素）",
                width, height, config.max_output_pixels
            )));
        }
        Ok(())
    }

    pub(super) fn cached_source(&self, url: &str, config: &ExportConfig) -> Option<Vec<u8>> {
        if config.source_cache_entries == 0 {
            return None;
        }
        let mut cache = self.source_cache.lock().ok()?;
        cache.get(url).cloned()
    }

    pub(super) fn store_source(&self, url: &str, bytes: &[u8], config: &ExportConfig) {
        if config.source_cache_entries == 0 || bytes.is_empty() {
            return;
        }

        let Ok(mut cache) = self.source_cache.lock() else {
            return;
        };

        if let Some(capacity) = NonZeroUsize::new(config.source_cache_entries) {
            if cache.cap() != capacity {
                cache.resize(capacity);
            }
        }
        cache.put(url.to_string(), bytes.to_vec());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::DecodeError;
    use base64::{Engine as _, engine::general_purpose};
    use image::{DynamicImage, GenericImageView, ImageBuffer, ImageFormat, Rgba};
    use std::io::Cursor;

    fn png_data_uri(width: u32, height: u32) -> String {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgba([(x % 255) as u8, (y % 255) as u8, ((x + y) % 255) as u8, 255])
        });
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("failed to encode test image");
        format!(
            "data:image/png;base64,{}",
            general_purpose::STANDARD.encode(cursor.into_inner())
        )
    }

    #[tokio::test]
    async fn export_produces_jpeg_of_crop_size() {
        let exporter = CropExporter::new(ExportConfig::default()).expect("exporter init failed");
        let request = ExportRequest {
            source: ImageSource::Base64(png_data_uri(120, 80)),
            crop: PixelCrop::new(10, 10, 50, 30),
            rotation: 90,
            display: None,
        };

        let image = exporter.export(&request).await.expect("export should succeed");
        let decoded = image::load_from_memory(&image.bytes).expect("decode output");

        assert_eq!((image.width, image.height), (50, 30));
        assert_eq!(decoded.dimensions(), (50, 30));
    }

    #[tokio::test]
    async fn invalid_crop_fails_before_loading_the_source() {
        let exporter = CropExporter::new(ExportConfig::default()).expect("exporter init failed");
        let request = ExportRequest {
            // 不存在的文件：若先加载会得到 Decode 错误
            source: ImageSource::FilePath("/nope/missing.png".to_string()),
            crop: PixelCrop::new(0, 0, 100, 0),
            rotation: 0,
            display: None,
        };

        let result = exporter.export(&request).await;
        assert!(matches!(result, Err(ExportError::InvalidCrop(_))));
    }

    #[tokio::test]
    async fn unresolvable_source_is_a_decode_error() {
        let exporter = CropExporter::new(ExportConfig::default()).expect("exporter init failed");
        let request = ExportRequest {
            source: ImageSource::FilePath("/nope/missing.png".to_string()),
            crop: PixelCrop::new(0, 0, 10, 10),
            rotation: 0,
            display: None,
        };

        let result = exporter.export(&request).await;
        assert!(matches!(result, Err(ExportError::Decode(DecodeError::FileSystem(_)))));
    }

    #[tokio::test]
    async fn oversized_output_is_rejected() {
        let mut config = ExportConfig::default();
        config.max_output_pixels = 100;
        let exporter = CropExporter::new(config).expect("exporter init failed");

        let request = ExportRequest {
            source: ImageSource::Base64(png_data_uri(20, 20)),
            crop: PixelCrop::new(0, 0, 11, 10),
            rotation: 0,
            display: None,
        };

        assert!(matches!(
            exporter.export(&request).await,
            Err(ExportError::InvalidCrop(_))
        ));
    }

    #[tokio::test]
    async fn side_longer_than_jpeg_limit_is_rejected_before_render() {
        let exporter = CropExporter::new(ExportConfig::default()).expect("exporter init failed");
        let source = exporter
            .load(&ImageSource::Base64(png_data_uri(16, 16)), None)
            .await
            .expect("load");

        let err = exporter
            .export_decoded(&source, &PixelCrop::new(0, 0, 70_000, 1), 0)
            .expect_err("should fail");
        assert!(matches!(err, ExportError::InvalidCrop(_)));

        let request = ExportRequest {
            source: ImageSource::Base64(png_data_uri(16, 16)),
            crop: PixelCrop::new(0, 0, 1, 70_000),
            rotation: 0,
            display: None,
        };
        assert!(matches!(
            exporter.export(&request).await,
            Err(ExportError::InvalidCrop(_))
        ));
    }

    #[tokio::test]
    async fn export_decoded_matches_full_export() {
        let exporter = CropExporter::new(ExportConfig::default()).expect("exporter init failed");
        let source_ref = ImageSource::Base64(png_data_uri(64, 64));
        let crop = PixelCrop::new(8, 8, 32, 24);

        let source = exporter.load(&source_ref, None).await.expect("load");
        let direct = exporter.export_decoded(&source, &crop, 45).expect("export decoded");
        let full = exporter
            .export(&ExportRequest {
                source: source_ref,
                crop,
                rotation: 405,
                display: None,
            })
            .await
            .expect("export");

        assert_eq!(direct, full);
    }

    #[test]
    fn rejects_out_of_range_quality() {
        let mut config = ExportConfig::default();
        config.jpeg_quality = 0;
        assert!(matches!(CropExporter::new(config), Err(ExportError::Config(_))));
    }

    #[test]
    fn resample_profile_can_be_switched_at_runtime() {
        let exporter = CropExporter::new(ExportConfig::default()).expect("exporter init failed");

        exporter.set_resample_profile("speed").expect("set speed");
        assert_eq!(exporter.resample_profile().expect("read"), ResampleProfile::Speed);

        assert!(exporter.set_resample_profile("bogus").is_err());
        assert_eq!(exporter.resample_profile().expect("read"), ResampleProfile::Speed);
    }

    #[test]
    fn source_cache_evicts_least_recently_used() {
        let mut config = ExportConfig::default();
        config.source_cache_entries = 2;
        let exporter = CropExporter::new(config.clone()).expect("exporter init failed");

        exporter.store_source("a", b"1", &config);
        exporter.store_source("b", b"2", &config);
        assert!(exporter.cached_source("a", &config).is_some());
        exporter.store_source("c", b"3", &config);

        assert!(exporter.cached_source("b", &config).is_none());
        assert_eq!(exporter.cached_source("a", &config), Some(b"1".to_vec()));
        assert_eq!(exporter.cached_source("c", &config), Some(b"3".to_vec()));
    }
}
