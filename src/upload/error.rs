//! 上传错误模型。

/// 服务端没有给出原因时展示的通用文案。
pub const GENERIC_UPLOAD_FAILURE: &str = "图片上传失败，请重试";

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// 未登录或缺少令牌。
    #[error("未登录：上传需要访问令牌")]
    Unauthorized,

    #[error("网络错误：{0}")]
    Network(String),

    #[error("超时错误：{0}")]
    Timeout(String),

    /// 服务端拒绝（非 2xx 或 `success: false`），`message` 优先取服务端文案。
    #[error("{message}")]
    Rejected { status: Option<u16>, message: String },

    #[error("配置错误：{0}")]
    Config(String),
}

impl UploadError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "E_UNAUTHORIZED",
            Self::Network(_) => "E_NETWORK",
            Self::Timeout(_) => "E_TIMEOUT",
            Self::Rejected { .. } => "E_REJECTED",
            Self::Config(_) => "E_CONFIG",
        }
    }

    /// 由服务端返回体构造拒绝错误：`error` > `mensaje` > 通用文案。
    pub(crate) fn rejected(status: Option<u16>, error: Option<String>, mensaje: Option<String>) -> Self {
        let message = error
            .filter(|m| !m.trim().is_empty())
            .or_else(|| mensaje.filter(|m| !m.trim().is_empty()))
            .unwrap_or_else(|| GENERIC_UPLOAD_FAILURE.to_string());
        Self::Rejected { status, message }
    }
}
