//! # 裁剪上传工具：命令行入口
//!
//! ```text
//! crop-upload <job.json>          导出（并可选上传）一张裁剪图
//! crop-upload init                写出补齐默认值的配置文件
//! crop-upload login <token>       保存登录令牌
//! crop-upload logout              清除登录令牌
//! ```
//!
//! 配置文件路径取环境变量 `CROP_UPLOAD_CONFIG`，默认 `config.json`。
//! 结果以 JSON 输出到标准输出。

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use serde::{Deserialize, Serialize};

use crop_upload::config::AppConfig;
use crop_upload::credentials::{Credentials, clear_credentials, load_credentials, save_credentials};
use crop_upload::error::AppError;
use crop_upload::export::{CropExporter, CropState, ImageSource, PixelCrop, Size};
use crop_upload::session::{CropSession, SessionError};
use crop_upload::upload::{UploadClient, UploadResult, UploadTarget};

const USAGE: &str = "用法: crop-upload <job.json> | init | login <token> | logout";

/// 一次裁剪任务。
///
/// 裁剪区域二选一：直接给 `crop`（配合 `rotation`），
/// 或给 `crop_state` + `viewport` 由交互状态推算（旋转取 `crop_state.rotation`）。
#[derive(Debug, Deserialize)]
struct Job {
    source: String,
    #[serde(default)]
    crop: Option<PixelCrop>,
    #[serde(default)]
    crop_state: Option<CropState>,
    #[serde(default)]
    viewport: Option<Size>,
    #[serde(default)]
    rotation: i64,
    #[serde(default)]
    display: Option<Size>,
    #[serde(default)]
    output: Option<PathBuf>,
    #[serde(default)]
    upload: Option<UploadTarget>,
}

#[derive(Debug, Serialize)]
struct JobReport {
    crop: PixelCrop,
    rotation: i64,
    width: u32,
    height: u32,
    mime_type: &'static str,
    bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    upload: Option<UploadResult>,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config_path = std::env::var_os("CROP_UPLOAD_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.json"));

    let outcome = match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["init"] => init_config(&config_path).map(|path| serde_json::json!({ "written": path })),
        ["login", token] => login(&config_path, token).map(|path| serde_json::json!({ "saved": path })),
        ["logout"] => logout(&config_path).map(|path| serde_json::json!({ "cleared": path })),
        [job_path] => run_job(Path::new(job_path), &config_path)
            .await
            .and_then(|report| {
                serde_json::to_value(report)
                    .map_err(|e| AppError::Storage(format!("序列化结果失败: {}", e)))
            }),
        _ => {
            eprintln!("{}", USAGE);
            return ExitCode::from(2);
        }
    };

    match outcome {
        Ok(value) => {
            println!("{}", value);
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("❌ 执行失败 [{}]: {}", err.code(), err);
            println!("{}", serde_json::json!({ "code": err.code(), "error": err }));
            ExitCode::FAILURE
        }
    }
}

fn resolve_config(config_path: &Path) -> (AppConfig, PathBuf) {
    let config = AppConfig::load_from_path(config_path);
    let config_dir = config_path.parent().unwrap_or(Path::new("."));
    let path = config.resolve_credentials_path(config_dir);
    (config, path)
}

fn init_config(config_path: &Path) -> Result<PathBuf, AppError> {
    let config = AppConfig::load_from_path(config_path);
    config.save_to_path(config_path)?;
    log::info!("📝 已写出配置文件: {}", config_path.display());
    Ok(config_path.to_path_buf())
}

fn login(config_path: &Path, token: &str) -> Result<PathBuf, AppError> {
    if token.trim().is_empty() {
        return Err(AppError::Config("令牌不能为空".to_string()));
    }
    let (_, path) = resolve_config(config_path);
    save_credentials(&path, &Credentials::new(token.trim(), serde_json::Value::Null))?;
    log::info!("🔑 已保存登录令牌: {}", path.display());
    Ok(path)
}

fn logout(config_path: &Path) -> Result<PathBuf, AppError> {
    let (_, path) = resolve_config(config_path);
    clear_credentials(&path)?;
    log::info!("🔒 已清除登录令牌: {}", path.display());
    Ok(path)
}

async fn run_job(job_path: &Path, config_path: &Path) -> Result<JobReport, AppError> {
    let content = fs::read_to_string(job_path)?;
    let job: Job = serde_json::from_str(&content)
        .map_err(|e| AppError::Config(format!("任务文件格式无效: {}", e)))?;

    // 显式裁剪区域在加载之前校验
    if let Some(crop) = job.crop {
        crop.output_dimensions()?;
    }

    let (config, credentials_path) = resolve_config(config_path);
    let exporter = CropExporter::new(config.export_config()?)?;

    let source = exporter.load(&ImageSource::detect(&job.source), job.display).await?;
    let mut session = CropSession::new();
    session.open(source)?;

    match (job.crop, job.crop_state, job.viewport) {
        (Some(crop), _, _) => {
            session.set_pixel_crop(crop)?;
            session.set_rotation(job.rotation)?;
        }
        (None, Some(state), Some(viewport)) => {
            session.update_crop(state.with_rotation(state.rotation), viewport)?;
        }
        _ => {
            return Err(AppError::Config(
                "任务需要 crop，或同时提供 crop_state 与 viewport".to_string(),
            ));
        }
    }

    let crop = session.pixel_crop().ok_or(SessionError::MissingCrop)?;
    let rotation = session.crop_state().rotation;

    // 上传时落盘的文件与上传内容来自同一次导出
    let (image, upload) = match job.upload {
        Some(target) => {
            let token = load_credentials(&credentials_path).map(|c| c.token);
            let client = UploadClient::new(&config.api_base_url, config.upload_timeout_secs)?.with_token(token);
            let confirmed = session.confirm(&exporter, &client, &target).await?;
            (confirmed.image, Some(confirmed.upload))
        }
        None => {
            let source = session.source().ok_or(SessionError::MissingCrop)?;
            (exporter.export_decoded(source, &crop, rotation)?, None)
        }
    };

    let mut report = JobReport {
        crop,
        rotation,
        width: image.width,
        height: image.height,
        mime_type: image.mime_type(),
        bytes: image.bytes.len(),
        output: None,
        upload,
    };

    if let Some(path) = job.output {
        fs::write(&path, &image.bytes)
            .map_err(|e| AppError::Storage(format!("写入输出文件失败: {}", e)))?;
        log::info!("💾 已写入 {}", path.display());
        report.output = Some(path);
    }

    Ok(report)
}
