//! # 头像 / 课程封面裁剪上传：库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  调用方（命令行 job.json / 裁剪界面）                     │
//! │       │ CropState ──pixel_crop──▶ PixelCrop               │
//! └───────┼──────────────────────────────────────────────────┘
//!         ↕ Result<T, AppError>
//! ┌───────┼──────────────────────────────────────────────────┐
//! │  ┌─ session ──── Idle → Cropping → Exporting → Uploading  │
//! │  │                 → Done / Failed（单次进行中门控）      │
//! │  │                                                       │
//! │  ├─ export ───── 加载 · 解码 · 缩放绘制 · 中心旋转 · JPEG  │
//! │  ├─ upload ───── POST {api}/upload/{tipo}（Bearer 令牌）   │
//! │  ├─ credentials  令牌 + 用户信息（JSON 文件）             │
//! │  ├─ config ───── AppConfig（JSON 文件，缺省回退默认）     │
//! │  └─ error ────── AppError（统一错误类型）                 │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError` |
//! | [`config`] | 应用配置文件读写、导出配置合成 |
//! | [`credentials`] | 登录令牌的加载、保存与清除 |
//! | [`export`] | 从 URL/Base64/文件加载图片，按裁剪区域与旋转导出 JPEG |
//! | [`upload`] | 将导出结果提交到上传接口 |
//! | [`session`] | 裁剪会话状态机，串联导出与上传 |

pub mod config;
pub mod credentials;
pub mod error;
pub mod export;
pub mod session;
pub mod upload;
