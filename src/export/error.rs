//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 裁剪导出只有三类边界错误：裁剪区域非法、来源无法解码、编码失败。
//! “无法解码”下再细分加载阶段的具体原因（`DecodeError`），
//! 调用侧可以只匹配 `ExportError::Decode(_)`，也可以继续细分。
//! 通过 `thiserror` 保持人类可读错误，`code()` / `stage()` 提供结构化字段。

/// 来源无法栅格化的具体原因。
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("网络错误：{0}")]
    Network(String),

    #[error("文件错误：{0}")]
    FileSystem(String),

    #[error("超时错误：{0}")]
    Timeout(String),

    #[error("格式错误：{0}")]
    InvalidFormat(String),

    #[error("解码失败：{0}")]
    Malformed(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),
}

impl DecodeError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Network(_) => "E_NETWORK",
            Self::FileSystem(_) => "E_FILE",
            Self::Timeout(_) => "E_TIMEOUT",
            Self::InvalidFormat(_) => "E_INVALID_FORMAT",
            Self::Malformed(_) => "E_DECODE",
            Self::ResourceLimit(_) => "E_RESOURCE_LIMIT",
        }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            Self::Network(_) | Self::FileSystem(_) | Self::Timeout(_) => "load",
            Self::InvalidFormat(_) | Self::Malformed(_) | Self::ResourceLimit(_) => "decode",
        }
    }
}

/// 裁剪导出统一错误类型。
///
/// 任一分支出现都意味着整次导出失败，不存在部分结果。
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// 裁剪区域非法（宽高非正或坐标为负），在解码之前就会被拒绝。
    #[error("裁剪区域无效：{0}")]
    InvalidCrop(String),

    #[error("{0}")]
    Decode(#[from] DecodeError),

    #[error("编码错误：{0}")]
    Encode(String),

    /// 配置或参数不合法（档位名、质量等）。
    #[error("配置错误：{0}")]
    Config(String),
}

impl ExportError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCrop(_) => "E_INVALID_CROP",
            Self::Decode(inner) => inner.code(),
            Self::Encode(_) => "E_ENCODE",
            Self::Config(_) => "E_CONFIG",
        }
    }

    /// 出错所处阶段。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::InvalidCrop(_) | Self::Config(_) => "validate",
            Self::Decode(inner) => inner.stage(),
            Self::Encode(_) => "encode",
        }
    }
}
