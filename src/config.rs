//! 应用配置文件（`config.json`）。
//!
//! 读取失败或格式错误时回退默认值；缺失字段按默认值补齐。

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::export::{ExportConfig, ExportOverrides};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 后端 API 根地址，上传接口为 `{api_base_url}/upload/{tipo}`。
    pub api_base_url: String,
    pub upload_timeout_secs: u64,
    pub credentials_path: PathBuf,
    pub export: ExportOverrides,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            upload_timeout_secs: 60,
            credentials_path: PathBuf::from("auth.json"),
            export: ExportOverrides::default(),
        }
    }
}

impl AppConfig {
    pub fn load_from_path(path: &Path) -> Self {
        if path.exists() {
            if let Ok(content) = fs::read_to_string(path) {
                match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => log::warn!("配置文件格式无效，使用默认配置: {}", e),
                }
            }
        }
        Self::default()
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), AppError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Config(format!("序列化配置失败: {}", e)))?;
        fs::write(path, content).map_err(|e| AppError::Config(format!("写入配置文件失败: {}", e)))?;
        Ok(())
    }

    /// 合成导出配置：默认值叠加文件中的覆盖项。
    pub fn export_config(&self) -> Result<ExportConfig, AppError> {
        let mut config = ExportConfig::default();
        config.apply_overrides(&self.export)?;
        Ok(config)
    }

    /// 凭据文件路径；相对路径以配置文件所在目录为基准。
    pub fn resolve_credentials_path(&self, config_dir: &Path) -> PathBuf {
        if self.credentials_path.is_absolute() {
            self.credentials_path.clone()
        } else {
            config_dir.join(&self.credentials_path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ResampleProfile;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_dir() -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock error")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("crop-upload-config-test-{nanos}"));
        fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = unique_temp_dir();
        let path = dir.join("config.json");

        let mut config = AppConfig::default();
        config.api_base_url = "https://api.nutricion.example/api".to_string();
        config.export.jpeg_quality = Some(80);
        config.save_to_path(&path).expect("save");

        assert_eq!(AppConfig::load_from_path(&path), config);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn bad_or_missing_file_falls_back_to_defaults() {
        let dir = unique_temp_dir();
        let path = dir.join("config.json");
        assert_eq!(AppConfig::load_from_path(&path), AppConfig::default());

        fs::write(&path, "not-json").expect("write");
        assert_eq!(AppConfig::load_from_path(&path), AppConfig::default());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let dir = unique_temp_dir();
        let path = dir.join("config.json");
        fs::write(&path, r#"{"export":{"resample_profile":"quality"}}"#).expect("write");

        let config = AppConfig::load_from_path(&path);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);

        let export = config.export_config().expect("export config");
        assert_eq!(export.resample_profile(), ResampleProfile::Quality);
        assert_eq!(export.jpeg_quality, 95);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn invalid_override_is_a_config_error() {
        let mut config = AppConfig::default();
        config.export.jpeg_quality = Some(0);
        assert!(matches!(config.export_config(), Err(AppError::Export(_))));
    }

    #[test]
    fn relative_credentials_path_resolves_against_config_dir() {
        let config = AppConfig::default();
        assert_eq!(
            config.resolve_credentials_path(Path::new("/etc/crop")),
            PathBuf::from("/etc/crop/auth.json")
        );
    }
}
