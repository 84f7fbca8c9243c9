//! # 上传模块（upload）
//!
//! 导出结果的提交通道：Base64 JSON 请求体 + Bearer 令牌。
//! 只做请求/响应适配，不参与图片处理。

mod client;
mod error;

pub use client::{UploadClient, UploadResult, UploadTarget};
pub use error::{GENERIC_UPLOAD_FAILURE, UploadError};
