//! # 裁剪导出模块（export）
//!
//! ## 设计思路
//!
//! 该模块将“来源识别 → 加载校验 → 解码 → 画布渲染 → JPEG 编码”
//! 按职责拆分为多个子模块，避免单文件膨胀与耦合。
//!
//! - `handler`：编排整条导出流水线（`CropExporter`）
//! - `loader`：负责 URL/Base64/文件加载与安全校验
//! - `pipeline`：负责解码与资源上限
//! - `render`：复刻 canvas 的缩放绘制与中心旋转
//! - `encode`：JPEG 编码与 Data URL 输出
//! - `geometry`：裁剪状态、裁剪矩形与坐标换算
//! - `config/error/source`：配置、错误、中间数据模型
//!
//! ## 调用链
//!
//! ```text
//! CropExporter::export
//!    ├─ PixelCrop::output_dimensions（先校验，失败不解码）
//!    ├─ loader.rs（来源加载 + URL/体积/签名校验）
//!    ├─ pipeline.rs（header 尺寸探测 + 完整解码）
//!    ├─ render.rs（缩放绘制 + 以画布中心旋转）
//!    └─ encode.rs（JPEG q=95）
//!    ↓
//! ExportedImage（交给上传模块）
//! ```

mod config;
mod encode;
mod error;
mod geometry;
mod handler;
mod loader;
mod pipeline;
mod render;
mod source;

pub use config::{DEFAULT_JPEG_QUALITY, ExportConfig, ExportOverrides, ResampleProfile};
pub use encode::{ExportedImage, JPEG_MIME, MAX_JPEG_DIMENSION};
pub use error::{DecodeError, ExportError};
pub use geometry::{CropState, PixelCrop, Size, SourceRect, normalize_rotation, rotated_bounds};
pub use handler::{CropExporter, ExportRequest};
pub use render::render_crop;
pub use source::{ImageSource, SourceImage};
