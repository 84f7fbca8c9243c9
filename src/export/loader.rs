//! # 来源加载
//!
//! 三类来源统一产出 `RawImageData`，任何一步失败都以 `DecodeError` 结束整次导出。
//!
//! - URL：仅 http/https；默认拒绝本机与内网目标；重定向手动跟随，每一跳重新检查；
//!   响应头先查 `Content-Type` 与 `Content-Length`，正文按块读取并累计限额。
//! - 内联数据：`data:image/*;base64,` 或纯 Base64，解码前按长度估算上限。
//! - 本地文件：按 metadata 限额后读取。
//!
//! 最终字节都要通过 magic bytes 检查才交给解码。

use base64::{Engine as _, engine::general_purpose};
use bytes::BytesMut;
use reqwest::Url;
use std::net::IpAddr;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::source::{ImageSource, RawImageData};
use super::{CropExporter, DecodeError, ExportConfig};

const SIGNATURE_PROBE_LIMIT: usize = 4096;
const FETCH_ATTEMPTS: u8 = 3;
const BACKOFF_BASE_MS: u64 = 200;
const BODY_CHUNK_TIMEOUT: Duration = Duration::from_secs(15);
const BODY_MIN_CAPACITY: usize = 16 * 1024;

impl CropExporter {
    pub(super) async fn load_source(
        &self,
        source: &ImageSource,
        config: &ExportConfig,
    ) -> Result<RawImageData, DecodeError> {
        match source {
            ImageSource::Url(url) => self.load_url(url, config).await,
            ImageSource::Base64(data) => load_inline(data, config),
            ImageSource::FilePath(path) => load_path(path, config),
        }
    }

    async fn load_url(&self, url: &str, config: &ExportConfig) -> Result<RawImageData, DecodeError> {
        let target = remote_target(url, config)?;

        if let Some(bytes) = self.cached_source(url, config) {
            log::debug!("♻️ 复用已下载的源图 - {}", redact(&target));
            return Ok(RawImageData {
                bytes,
                source_hint: "url-cache",
            });
        }

        log::info!("🌐 下载源图 - {}", redact(&target));
        let bytes = fetch_image(target, config).await?;
        sniff_image(&bytes)?;
        self.store_source(url, &bytes, config);

        Ok(RawImageData {
            bytes,
            source_hint: "url",
        })
    }
}

fn load_inline(data: &str, config: &ExportConfig) -> Result<RawImageData, DecodeError> {
    let bytes = decode_inline_payload(data, config.max_file_size)?;
    if bytes.len() as u64 > config.max_file_size {
        return Err(DecodeError::ResourceLimit(format!(
            "内联图片 {} 字节，超过上限 {} 字节",
            bytes.len(),
            config.max_file_size
        )));
    }
    sniff_image(&bytes)?;
    log::debug!("📝 内联图片 {} 字节", bytes.len());

    Ok(RawImageData {
        bytes,
        source_hint: "base64",
    })
}

fn load_path(path: &str, config: &ExportConfig) -> Result<RawImageData, DecodeError> {
    let file = Path::new(path);
    let metadata = std::fs::metadata(file)
        .map_err(|e| DecodeError::FileSystem(format!("无法访问 {}：{}", path, e)))?;

    if !metadata.is_file() {
        return Err(DecodeError::FileSystem(format!("不是文件：{}", path)));
    }
    if metadata.len() > config.max_file_size {
        return Err(DecodeError::ResourceLimit(format!(
            "文件 {} 字节，超过上限 {} 字节",
            metadata.len(),
            config.max_file_size
        )));
    }

    let bytes = std::fs::read(file)
        .map_err(|e| DecodeError::FileSystem(format!("读取 {} 失败：{}", path, e)))?;
    sniff_image(&bytes)?;
    log::debug!("📁 读取本地图片 {} - {} 字节", path, bytes.len());

    Ok(RawImageData {
        bytes,
        source_hint: "file",
    })
}

/// 解析并检查远程地址。
fn remote_target(url: &str, config: &ExportConfig) -> Result<Url, DecodeError> {
    let parsed = Url::parse(url).map_err(|e| DecodeError::InvalidFormat(format!("URL 无法解析：{}", e)))?;
    ensure_reachable(&parsed, config)?;
    Ok(parsed)
}

fn ensure_reachable(url: &Url, config: &ExportConfig) -> Result<(), DecodeError> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err(DecodeError::InvalidFormat(format!(
            "不支持的协议：{}",
            url.scheme()
        )));
    }
    if config.allow_private_network {
        return Ok(());
    }

    let host = url
        .host_str()
        .ok_or_else(|| DecodeError::InvalidFormat("URL 没有主机名".to_string()))?;
    let literal = host.trim_start_matches('[').trim_end_matches(']');

    let blocked = match literal.parse::<IpAddr>() {
        Ok(ip) => is_non_public(ip),
        Err(_) => {
            let name = host.trim_end_matches('.').to_ascii_lowercase();
            name == "localhost" || name.ends_with(".localhost") || name.ends_with(".local")
        }
    };

    if blocked {
        return Err(DecodeError::InvalidFormat(format!("拒绝访问本机或内网地址：{}", host)));
    }
    Ok(())
}

fn is_non_public(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_documentation()
                || v4.is_unspecified()
                || v4.is_multicast()
                || a == 0
                // 100.64.0.0/10
                || (a == 100 && (64..128).contains(&b))
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_non_public(IpAddr::V4(v4));
            }
            v6.is_loopback()
                || v6.is_unspecified()
                || v6.is_multicast()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
        }
    }
}

fn http_client(config: &ExportConfig) -> Result<reqwest::Client, DecodeError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.download_timeout))
        .connect_timeout(Duration::from_secs(config.connect_timeout))
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| DecodeError::Network(format!("HTTP 客户端初始化失败：{}", e)))
}

async fn fetch_image(start: Url, config: &ExportConfig) -> Result<Vec<u8>, DecodeError> {
    let client = http_client(config)?;
    let mut url = start;
    let mut hops: usize = 0;

    loop {
        let response = send_with_retry(&client, &url, config).await?;

        if response.status().is_redirection() {
            if hops >= config.max_redirects {
                return Err(DecodeError::Network(format!(
                    "重定向超过 {} 次",
                    config.max_redirects
                )));
            }
            hops += 1;
            url = redirect_target(&url, &response, config)?;
            log::debug!("↪️ 第 {} 次跳转 - {}", hops, redact(&url));
            continue;
        }

        check_response_head(&response, config)?;
        return read_capped_body(response, config).await;
    }
}

/// 连接失败、超时和 408/429/5xx 会重试；最后一次的响应原样返回。
async fn send_with_retry(
    client: &reqwest::Client,
    url: &Url,
    config: &ExportConfig,
) -> Result<reqwest::Response, DecodeError> {
    let mut attempt: u8 = 1;
    loop {
        let outcome = client.get(url.clone()).send().await;
        let transient = match &outcome {
            Ok(response) => is_transient_status(response.status()),
            Err(e) => e.is_timeout() || e.is_connect(),
        };

        if !transient || attempt >= FETCH_ATTEMPTS {
            return outcome.map_err(|e| describe_request_error(e, url, config));
        }

        let pause = backoff_delay(attempt);
        log::warn!(
            "⚠️ 请求未成功（{}/{}），{}ms 后重试 - {}",
            attempt,
            FETCH_ATTEMPTS,
            pause.as_millis(),
            redact(url)
        );
        tokio::time::sleep(pause).await;
        attempt += 1;
    }
}

fn is_transient_status(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 429) || status.is_server_error()
}

/// 指数退避加抖动。
fn backoff_delay(attempt: u8) -> Duration {
    let base = BACKOFF_BASE_MS << u32::from(attempt.saturating_sub(1)).min(6);
    let jitter = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::from(d.subsec_nanos()))
        .unwrap_or(0)
        % (base / 2 + 1);
    Duration::from_millis(base + jitter)
}

fn redirect_target(
    current: &Url,
    response: &reqwest::Response,
    config: &ExportConfig,
) -> Result<Url, DecodeError> {
    let location = response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| DecodeError::Network("重定向缺少有效的 Location".to_string()))?;

    let next = current
        .join(location)
        .map_err(|e| DecodeError::InvalidFormat(format!("重定向地址无法解析：{}", e)))?;
    ensure_reachable(&next, config)?;
    Ok(next)
}

fn check_response_head(response: &reqwest::Response, config: &ExportConfig) -> Result<(), DecodeError> {
    let status = response.status();
    if !status.is_success() {
        return Err(DecodeError::Network(format!(
            "HTTP {} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        )));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    if let Some(content_type) = content_type {
        if !is_image_mime(content_type) {
            return Err(DecodeError::InvalidFormat(format!(
                "响应类型不是图片：{}",
                content_type
            )));
        }
    }

    if let Some(length) = response.content_length() {
        if length > config.max_file_size {
            return Err(DecodeError::ResourceLimit(format!(
                "响应声明 {} 字节，超过上限 {} 字节",
                length, config.max_file_size
            )));
        }
    }
    Ok(())
}

fn is_image_mime(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim().to_ascii_lowercase().starts_with("image/"))
}

async fn read_capped_body(mut response: reqwest::Response, config: &ExportConfig) -> Result<Vec<u8>, DecodeError> {
    let capacity = response
        .content_length()
        .and_then(|len| usize::try_from(len).ok())
        .filter(|len| *len > 0)
        .unwrap_or(BODY_MIN_CAPACITY);
    let mut body = BytesMut::with_capacity(capacity);
    let mut recognized = false;

    while let Some(chunk) = tokio::time::timeout(BODY_CHUNK_TIMEOUT, response.chunk())
        .await
        .map_err(|_| DecodeError::Timeout(format!("{} 秒内未收到数据", BODY_CHUNK_TIMEOUT.as_secs())))?
        .map_err(|e| DecodeError::Network(format!("读取响应失败：{}", e)))?
    {
        if (body.len() + chunk.len()) as u64 > config.max_file_size {
            return Err(DecodeError::ResourceLimit(format!(
                "下载内容超过上限 {} 字节",
                config.max_file_size
            )));
        }
        body.extend_from_slice(&chunk);

        if !recognized {
            recognized = probe_signature(&body, SIGNATURE_PROBE_LIMIT)?;
        }
    }

    log::debug!("✅ 下载完成 - {} 字节", body.len());
    Ok(body.to_vec())
}

fn describe_request_error(e: reqwest::Error, url: &Url, config: &ExportConfig) -> DecodeError {
    if e.is_timeout() {
        return DecodeError::Timeout(format!("下载超过 {} 秒", config.download_timeout));
    }
    // reqwest 的错误文本会带完整 URL
    let message = e.to_string().replace(url.as_str(), &redact(url));
    if e.is_connect() {
        DecodeError::Network(format!("连接失败：{}", message))
    } else {
        DecodeError::Network(format!("请求失败：{}", message))
    }
}

/// 日志用地址：去掉 query 与 fragment。
fn redact(url: &Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.set_fragment(None);
    let _ = shown.set_password(None);
    let _ = shown.set_username("");
    shown.to_string()
}

/// 解析 `data:image/*;base64,` 或纯 Base64。
fn decode_inline_payload(data: &str, max_file_size: u64) -> Result<Vec<u8>, DecodeError> {
    let trimmed = data.trim();

    let payload = match trimmed.strip_prefix("data:") {
        Some(rest) => {
            let (header, body) = rest
                .split_once(',')
                .ok_or_else(|| DecodeError::InvalidFormat("Data URL 缺少数据段".to_string()))?;
            let mut params = header.split(';');
            let mime = params.next().unwrap_or_default().trim().to_ascii_lowercase();
            if !mime.starts_with("image/") {
                return Err(DecodeError::InvalidFormat(format!("Data URL 类型不是图片：{}", mime)));
            }
            if !params.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
                return Err(DecodeError::InvalidFormat("Data URL 未使用 base64 编码".to_string()));
            }
            body
        }
        None => trimmed,
    };

    let upper_bound = (payload.len() as u64).div_ceil(4).saturating_mul(3);
    if upper_bound > max_file_size {
        return Err(DecodeError::ResourceLimit(format!(
            "Base64 数据约 {} 字节，超过上限 {} 字节",
            upper_bound, max_file_size
        )));
    }

    general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| DecodeError::Malformed(format!("Base64 解码失败：{}", e)))
}

/// 完整字节的签名检查。
fn sniff_image(bytes: &[u8]) -> Result<(), DecodeError> {
    match infer::get(bytes) {
        Some(kind) if kind.matcher_type() == infer::MatcherType::Image => Ok(()),
        Some(kind) => Err(DecodeError::InvalidFormat(format!(
            "内容签名为 {}，不是图片",
            kind.mime_type()
        ))),
        None if bytes.is_empty() => Err(DecodeError::InvalidFormat("图片内容为空".to_string())),
        None => Err(DecodeError::InvalidFormat("无法识别的图片签名".to_string())),
    }
}

/// 下载过程中的签名探测：`Ok(false)` 表示字节还不够判断。
fn probe_signature(bytes: &[u8], limit: usize) -> Result<bool, DecodeError> {
    match infer::get(bytes) {
        Some(_) => sniff_image(bytes).map(|_| true),
        None if bytes.len() >= limit => Err(DecodeError::InvalidFormat(format!(
            "前 {} 字节内无法识别图片签名",
            limit
        ))),
        None => Ok(false),
    }
}
