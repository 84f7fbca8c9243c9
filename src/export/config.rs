//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `ExportConfig`，保证运行时行为可观测、可调整、可测试。
//! 重采样档位（quality / balanced / speed）作为高层语义，映射到底层滤镜。
//!
//! ## 实现思路
//!
//! - `Default` 提供与网页端一致的配置（JPEG 质量 95）。
//! - `ResampleProfile` 负责档位字符串解析与反向输出。
//! - `ExportOverrides` 是配置文件中的可选覆盖项，只改写出现的字段。

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use super::ExportError;

/// 网页端 `canvas.toDataURL("image/jpeg", 0.95)` 对应的质量值。
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// 裁剪导出配置。
///
/// 字段覆盖了加载、解码、重采样与编码四个阶段。
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// 下载/读取原始字节时允许的最大文件体积（字节）。
    pub max_file_size: u64,
    /// 网络下载超时时间（秒）。
    pub download_timeout: u64,
    /// 建立连接超时时间（秒）。
    pub connect_timeout: u64,
    /// 最大重定向次数。
    pub max_redirects: usize,
    /// 是否允许访问内网或本地地址（默认关闭，防 SSRF）。
    pub allow_private_network: bool,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码阶段允许的预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
    /// 输出画布像素上限，防止超大裁剪框耗尽内存。
    pub max_output_pixels: u64,
    /// 重采样滤镜。
    pub resample_filter: FilterType,
    /// JPEG 质量（1~100）。
    pub jpeg_quality: u8,
    /// 已下载来源缓存条目上限（0 表示关闭缓存）。
    pub source_cache_entries: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_file_size: 20 * 1024 * 1024,
            download_timeout: 30,
            connect_timeout: 8,
            max_redirects: 5,
            allow_private_network: false,
            max_decoded_pixels: 40_000_000,
            max_decoded_bytes: 160 * 1024 * 1024,
            max_output_pixels: 16_000_000,
            resample_filter: FilterType::Triangle,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            source_cache_entries: 8,
        }
    }
}

/// 重采样档位。
///
/// - `Quality`：CatmullRom
/// - `Balanced`：双线性，与浏览器 canvas 默认平滑效果接近
/// - `Speed`：最近邻
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResampleProfile {
    Quality,
    Balanced,
    Speed,
}

impl ResampleProfile {
    /// 从外部字符串解析档位。
    pub fn parse(profile: &str) -> Result<Self, ExportError> {
        match profile.trim().to_lowercase().as_str() {
            "quality" => Ok(Self::Quality),
            "balanced" => Ok(Self::Balanced),
            "speed" => Ok(Self::Speed),
            other => Err(ExportError::Config(format!(
                "未知重采样档位：{}（可选：quality / balanced / speed）",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Balanced => "balanced",
            Self::Speed => "speed",
        }
    }

    fn filter(self) -> FilterType {
        match self {
            Self::Quality => FilterType::CatmullRom,
            Self::Balanced => FilterType::Triangle,
            Self::Speed => FilterType::Nearest,
        }
    }
}

impl ExportConfig {
    /// 基于当前滤镜反推档位。
    pub fn resample_profile(&self) -> ResampleProfile {
        match self.resample_filter {
            FilterType::Nearest => ResampleProfile::Speed,
            FilterType::Triangle => ResampleProfile::Balanced,
            _ => ResampleProfile::Quality,
        }
    }

    pub fn apply_resample_profile(&mut self, profile: ResampleProfile) {
        self.resample_filter = profile.filter();
    }

    /// 应用配置文件中的覆盖项，并校验取值范围。
    pub fn apply_overrides(&mut self, overrides: &ExportOverrides) -> Result<(), ExportError> {
        if let Some(quality) = overrides.jpeg_quality {
            if !(1..=100).contains(&quality) {
                return Err(ExportError::Config(format!(
                    "jpeg_quality 必须在 1~100 之间：{}",
                    quality
                )));
            }
            self.jpeg_quality = quality;
        }
        if let Some(size) = overrides.max_file_size {
            if size < 1024 {
                return Err(ExportError::Config("max_file_size 不能小于 1KB".to_string()));
            }
            self.max_file_size = size;
        }
        if let Some(timeout) = overrides.download_timeout {
            if !(1..=300).contains(&timeout) {
                return Err(ExportError::Config(
                    "download_timeout 必须在 1~300 秒之间".to_string(),
                ));
            }
            self.download_timeout = timeout;
        }
        if let Some(allow) = overrides.allow_private_network {
            self.allow_private_network = allow;
        }
        if let Some(profile) = overrides.resample_profile.as_deref() {
            self.apply_resample_profile(ResampleProfile::parse(profile)?);
        }
        Ok(())
    }
}

/// 配置文件中的导出覆盖项。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOverrides {
    pub jpeg_quality: Option<u8>,
    pub max_file_size: Option<u64>,
    pub download_timeout: Option<u64>,
    pub allow_private_network: Option<bool>,
    pub resample_profile: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_quality_matches_web_export() {
        assert_eq!(ExportConfig::default().jpeg_quality, 95);
    }

    #[test]
    fn profile_roundtrip_through_config() {
        let mut config = ExportConfig::default();
        assert_eq!(config.resample_profile(), ResampleProfile::Balanced);

        for name in ["quality", "speed", "balanced"] {
            let profile = ResampleProfile::parse(name).expect("known profile");
            config.apply_resample_profile(profile);
            assert_eq!(config.resample_profile().as_str(), name);
        }
    }

    #[test]
    fn unknown_profile_is_rejected() {
        assert!(matches!(
            ResampleProfile::parse("ultra"),
            Err(ExportError::Config(_))
        ));
    }

    #[test]
    fn overrides_reject_out_of_range_quality() {
        let mut config = ExportConfig::default();
        let overrides = ExportOverrides {
            jpeg_quality: Some(0),
            ..Default::default()
        };

        assert!(config.apply_overrides(&overrides).is_err());
        assert_eq!(config.jpeg_quality, 95);
    }

    #[test]
    fn overrides_only_touch_present_fields() {
        let mut config = ExportConfig::default();
        let overrides = ExportOverrides {
            jpeg_quality: Some(80),
            resample_profile: Some("speed".to_string()),
            ..Default::default()
        };

        config.apply_overrides(&overrides).expect("valid overrides");

        assert_eq!(config.jpeg_quality, 80);
        assert_eq!(config.resample_filter, FilterType::Nearest);
        assert_eq!(config.max_file_size, ExportConfig::default().max_file_size);
    }
}
