//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 各模块保留自己的错误枚举（`ExportError` / `UploadError` / `SessionError`），
//! 对外入口（命令行、调用方）统一使用 `AppError`。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为各模块错误提供 `From` 转换，无需手动 map。
//! - 实现 `Serialize` 将错误序列化为字符串，便于以 JSON 输出。

use serde::Serialize;

use crate::export::ExportError;
use crate::session::SessionError;
use crate::upload::UploadError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 裁剪导出错误（裁剪区域 / 解码 / 编码）
    #[error("{0}")]
    Export(#[from] ExportError),

    /// 上传错误
    #[error("{0}")]
    Upload(#[from] UploadError),

    #[error("{0}")]
    Session(#[from] SessionError),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("配置错误: {0}")]
    Config(String),

    /// 凭据或输出文件不可用
    #[error("存储错误: {0}")]
    Storage(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Export(e) => e.code(),
            Self::Upload(e) => e.code(),
            Self::Session(e) => e.code(),
            Self::Io(_) => "E_IO",
            Self::Config(_) => "E_CONFIG",
            Self::Storage(_) => "E_STORAGE",
        }
    }
}

/// 将错误序列化为人类可读的字符串。
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::DecodeError;

    #[test]
    fn serializes_as_display_string() {
        let err = AppError::from(ExportError::Decode(DecodeError::Timeout("下载超过 30 秒".into())));
        assert_eq!(err.code(), "E_TIMEOUT");
        assert_eq!(
            serde_json::to_value(&err).expect("serialize"),
            serde_json::json!("超时错误：下载超过 30 秒")
        );
    }

    #[test]
    fn upload_rejection_keeps_server_message() {
        let err = AppError::from(UploadError::Rejected {
            status: Some(400),
            message: "Archivo demasiado grande".into(),
        });
        assert_eq!(err.to_string(), "Archivo demasiado grande");
        assert_eq!(err.code(), "E_REJECTED");
    }
}
