//! # 上传客户端
//!
//! ## 设计思路
//!
//! 导出结果以 Base64 Data URL 形式放入 JSON 请求体，带 Bearer 令牌 POST 到上传接口。
//! `tipo`（perfil / curso）决定接口路径，`curso` 额外携带 `cursoId`。
//!
//! ## 实现思路
//!
//! - 请求/响应字段名与后端保持一致（camelCase，西语字段名）。
//! - 非 2xx 或 `success: false` 一律视为拒绝，文案优先取服务端返回。
//! - 上传失败时导出结果直接丢弃，重试需重新导出。

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::UploadError;
use crate::export::ExportedImage;

/// 上传目标。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tipo", rename_all = "lowercase")]
pub enum UploadTarget {
    /// 个人头像。
    Perfil,
    /// 课程封面。
    Curso {
        #[serde(rename = "cursoId")]
        curso_id: String,
    },
}

impl UploadTarget {
    pub fn tipo(&self) -> &'static str {
        match self {
            Self::Perfil => "perfil",
            Self::Curso { .. } => "curso",
        }
    }

    fn curso_id(&self) -> Option<&str> {
        match self {
            Self::Perfil => None,
            Self::Curso { curso_id } => Some(curso_id),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadRequestBody<'a> {
    imagen_base64: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    curso_id: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct UploadResponseBody {
    success: bool,
    url: Option<String>,
    public_id: Option<String>,
    mensaje: Option<String>,
    error: Option<String>,
}

/// 上传成功结果：远程地址与不透明标识。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub url: String,
    pub public_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mensaje: Option<String>,
}

/// 上传客户端。
pub struct UploadClient {
    http: reqwest::Client,
    api_base_url: String,
    token: Option<String>,
}

impl UploadClient {
    pub fn new(api_base_url: &str, timeout_secs: u64) -> Result<Self, UploadError> {
        let parsed = reqwest::Url::parse(api_base_url)
            .map_err(|e| UploadError::Config(format!("api_base_url 无效：{}", e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(UploadError::Config("api_base_url 仅支持 HTTP/HTTPS".to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|e| UploadError::Config(format!("无法创建 HTTP 客户端：{}", e)))?;

        Ok(Self {
            http,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn endpoint(&self, target: &UploadTarget) -> String {
        format!("{}/upload/{}", self.api_base_url, target.tipo())
    }

    /// 上传导出结果。
    pub async fn upload(
        &self,
        image: &ExportedImage,
        target: &UploadTarget,
    ) -> Result<UploadResult, UploadError> {
        let token = self.token.as_deref().ok_or(UploadError::Unauthorized)?;

        let body = UploadRequestBody {
            imagen_base64: image.to_data_uri(),
            curso_id: target.curso_id(),
        };
        let payload = serde_json::to_vec(&body)
            .map_err(|e| UploadError::Config(format!("序列化上传请求失败：{}", e)))?;

        let endpoint = self.endpoint(target);
        log::info!(
            "📤 开始上传图片 - tipo: {} 尺寸: {}x{} 大小: {}KB",
            target.tipo(),
            image.width,
            image.height,
            image.bytes.len() / 1024
        );

        let start = Instant::now();
        let response = self
            .http
            .post(&endpoint)
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {}", token))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UploadError::Timeout(format!("上传超时：{}", e))
                } else {
                    UploadError::Network(format!("上传请求失败：{}", e))
                }
            })?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| UploadError::Network(format!("读取上传响应失败：{}", e)))?;

        let parsed = serde_json::from_slice::<UploadResponseBody>(&bytes).ok();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            log::warn!("⚠️ 上传被拒绝：令牌无效或已过期");
            return Err(UploadError::Unauthorized);
        }

        let Some(body) = parsed else {
            log::warn!("⚠️ 上传响应不是有效 JSON - HTTP {}", status.as_u16());
            return Err(UploadError::rejected(Some(status.as_u16()), None, None));
        };

        if !status.is_success() || !body.success {
            log::warn!(
                "⚠️ 上传被服务端拒绝 - HTTP {} success={}",
                status.as_u16(),
                body.success
            );
            return Err(UploadError::rejected(Some(status.as_u16()), body.error, body.mensaje));
        }

        let (Some(url), Some(public_id)) = (body.url, body.public_id) else {
            return Err(UploadError::Rejected {
                status: Some(status.as_u16()),
                message: "上传响应缺少 url 或 publicId".to_string(),
            });
        };

        log::info!("✅ 图片上传完成 - tipo: {} 耗时: {}ms", target.tipo(), start.elapsed().as_millis());

        Ok(UploadResult {
            url,
            public_id,
            mensaje: body.mensaje,
        })
    }
}
