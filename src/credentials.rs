//! 登录凭据的本地持久化（令牌 + 用户信息）。
//!
//! 文件缺失或内容损坏时按“未登录”处理，不报错。

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub token: String,
    /// 后端返回的用户对象，原样保存。
    #[serde(default)]
    pub user: serde_json::Value,
    pub saved_at: DateTime<Utc>,
}

impl Credentials {
    pub fn new(token: impl Into<String>, user: serde_json::Value) -> Self {
        Self {
            token: token.into(),
            user,
            saved_at: Utc::now(),
        }
    }
}

pub fn load_credentials(path: &Path) -> Option<Credentials> {
    if !path.exists() {
        return None;
    }

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            log::warn!("读取凭据文件失败，按未登录处理: {}", e);
            return None;
        }
    };

    match serde_json::from_str::<Credentials>(&content) {
        Ok(credentials) if !credentials.token.trim().is_empty() => Some(credentials),
        Ok(_) => None,
        Err(e) => {
            log::warn!("凭据文件格式无效，按未登录处理: {}", e);
            None
        }
    }
}

pub fn save_credentials(path: &Path, credentials: &Credentials) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::Storage(format!("创建凭据目录失败: {}", e)))?;
    }

    let content = serde_json::to_string_pretty(credentials)
        .map_err(|e| AppError::Storage(format!("序列化凭据失败: {}", e)))?;
    fs::write(path, content).map_err(|e| AppError::Storage(format!("写入凭据文件失败: {}", e)))?;
    Ok(())
}

/// 退出登录。文件不存在视为成功。
pub fn clear_credentials(path: &Path) -> Result<(), AppError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AppError::Storage(format!("删除凭据文件失败: {}", e))),
    }
}
