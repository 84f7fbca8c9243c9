//! # 裁剪会话状态机
//!
//! ## 设计思路
//!
//! 一个会话对应一次“打开裁剪 → 确认 → 导出 → 上传”的交互。
//! 忙碌状态用显式阶段表达，而不是布尔标志：
//!
//! ```text
//! Idle ──open──▶ Cropping ──begin_export──▶ Exporting ──begin_upload──▶ Uploading ──complete──▶ Done
//!                   ▲                           │                           │
//!                   └──────── update_crop ◀──── Failed ◀────── fail ────────┘
//! ```
//!
//! ## 实现思路
//!
//! - `Exporting`/`Uploading` 期间任何再次提交都返回 `SessionError::Busy`，保证同一时刻只有一次导出/上传。
//! - 失败不修改源图、`CropState`、`PixelCrop`，重试从相同输入开始。
//! - 导出结果不在会话中保存；上传失败后需要重新导出。
//! - 一旦开始不可取消，只能完成或失败。

use crate::export::{CropExporter, CropState, ExportError, ExportedImage, PixelCrop, Size, SourceImage};
use crate::upload::{UploadClient, UploadError, UploadResult, UploadTarget};

/// 会话阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Cropping,
    Exporting,
    Uploading,
    Done,
    Failed,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Cropping => "cropping",
            Self::Exporting => "exporting",
            Self::Uploading => "uploading",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// 已有导出/上传在进行中。
    #[error("操作进行中，请稍候")]
    Busy,

    #[error("当前阶段 {from} 不允许执行 {action}")]
    InvalidTransition { from: &'static str, action: &'static str },

    #[error("尚未确定裁剪区域")]
    MissingCrop,

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Upload(#[from] UploadError),
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Busy => "E_BUSY",
            Self::InvalidTransition { .. } => "E_INVALID_TRANSITION",
            Self::MissingCrop => "E_INVALID_CROP",
            Self::Export(e) => e.code(),
            Self::Upload(e) => e.code(),
        }
    }
}

/// 上传通道抽象，便于替换为测试桩。
pub trait Uploader {
    fn submit(
        &self,
        image: &ExportedImage,
        target: &UploadTarget,
    ) -> impl Future<Output = Result<UploadResult, UploadError>> + Send;
}

impl Uploader for UploadClient {
    fn submit(
        &self,
        image: &ExportedImage,
        target: &UploadTarget,
    ) -> impl Future<Output = Result<UploadResult, UploadError>> + Send {
        self.upload(image, target)
    }
}

/// 裁剪会话。
pub struct CropSession {
    phase: Phase,
    source: Option<SourceImage>,
    crop_state: CropState,
    pixel_crop: Option<PixelCrop>,
    /// `update_crop` 使用的裁剪框尺寸；直接设置 `PixelCrop` 时为空。
    viewport: Option<Size>,
    last_error: Option<String>,
    result: Option<UploadResult>,
}

/// 确认成功的结果：上传的正是这份导出。
#[derive(Debug, Clone)]
pub struct Confirmed {
    pub image: ExportedImage,
    pub upload: UploadResult,
}

impl Default for CropSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CropSession {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            source: None,
            crop_state: CropState::default(),
            pixel_crop: None,
            viewport: None,
            last_error: None,
            result: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// 导出/上传进行中，界面应禁用裁剪与保存。
    pub fn is_busy(&self) -> bool {
        matches!(self.phase, Phase::Exporting | Phase::Uploading)
    }

    pub fn source(&self) -> Option<&SourceImage> {
        self.source.as_ref()
    }

    pub fn crop_state(&self) -> CropState {
        self.crop_state
    }

    pub fn pixel_crop(&self) -> Option<PixelCrop> {
        self.pixel_crop
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn result(&self) -> Option<&UploadResult> {
        self.result.as_ref()
    }

    /// 打开新的裁剪（会话可复用）。
    pub fn open(&mut self, source: SourceImage) -> Result<(), SessionError> {
        match self.phase {
            Phase::Idle | Phase::Done | Phase::Failed => {}
            Phase::Exporting | Phase::Uploading => return Err(SessionError::Busy),
            Phase::Cropping => return Err(self.invalid("open")),
        }

        self.source = Some(source);
        self.crop_state = CropState::default();
        self.pixel_crop = None;
        self.viewport = None;
        self.last_error = None;
        self.result = None;
        self.phase = Phase::Cropping;
        Ok(())
    }

    /// 交互更新：限制平移后按视口重新计算 `PixelCrop`。
    pub fn update_crop(&mut self, state: CropState, viewport: Size) -> Result<PixelCrop, SessionError> {
        self.ensure_editable("update_crop")?;
        let display = self
            .source
            .as_ref()
            .map(SourceImage::display_size)
            .ok_or_else(|| self.invalid("update_crop"))?;

        let state = state.clamp_pan(display, viewport);
        let crop = state.pixel_crop(display, viewport)?;

        self.crop_state = state;
        self.pixel_crop = Some(crop);
        self.viewport = Some(viewport);
        self.phase = Phase::Cropping;
        Ok(crop)
    }

    /// 直接设置裁剪矩形（由外部裁剪控件计算）。
    pub fn set_pixel_crop(&mut self, crop: PixelCrop) -> Result<(), SessionError> {
        self.ensure_editable("set_pixel_crop")?;
        crop.output_dimensions()?;
        self.pixel_crop = Some(crop);
        self.viewport = None;
        self.phase = Phase::Cropping;
        Ok(())
    }

    /// 旋转后按记录的裁剪框重新计算 `PixelCrop`；直接设置的矩形保持不变。
    pub fn set_rotation(&mut self, rotation: i64) -> Result<(), SessionError> {
        self.ensure_editable("set_rotation")?;
        let state = self.crop_state.with_rotation(rotation);

        match (self.viewport, self.source.as_ref().map(SourceImage::display_size)) {
            (Some(viewport), Some(display)) => {
                let state = state.clamp_pan(display, viewport);
                self.pixel_crop = Some(state.pixel_crop(display, viewport)?);
                self.crop_state = state;
            }
            _ => self.crop_state = state,
        }

        self.phase = Phase::Cropping;
        Ok(())
    }

    pub fn begin_export(&mut self) -> Result<(), SessionError> {
        match self.phase {
            Phase::Cropping | Phase::Failed => {}
            Phase::Exporting | Phase::Uploading => return Err(SessionError::Busy),
            Phase::Idle | Phase::Done => return Err(self.invalid("begin_export")),
        }
        if self.pixel_crop.is_none() {
            return Err(SessionError::MissingCrop);
        }

        self.last_error = None;
        self.phase = Phase::Exporting;
        Ok(())
    }

    pub fn begin_upload(&mut self) -> Result<(), SessionError> {
        if self.phase != Phase::Exporting {
            return Err(self.invalid("begin_upload"));
        }
        self.phase = Phase::Uploading;
        Ok(())
    }

    pub fn complete(&mut self, result: UploadResult) -> Result<(), SessionError> {
        if self.phase != Phase::Uploading {
            return Err(self.invalid("complete"));
        }
        self.result = Some(result);
        self.phase = Phase::Done;
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), SessionError> {
        if !self.is_busy() {
            return Err(self.invalid("fail"));
        }
        self.last_error = Some(message.into());
        self.phase = Phase::Failed;
        Ok(())
    }

    /// 确认裁剪：导出并上传。
    ///
    /// 成功时返回上传所用的那份导出结果。
    /// 失败时会话进入 `Failed`，输入保持不变，可直接再次调用重试。
    pub async fn confirm<U: Uploader>(
        &mut self,
        exporter: &CropExporter,
        uploader: &U,
        target: &UploadTarget,
    ) -> Result<Confirmed, SessionError> {
        self.begin_export()?;

        let exported = match (self.source.as_ref(), self.pixel_crop) {
            (Some(source), Some(crop)) => exporter.export_decoded(source, &crop, self.crop_state.rotation),
            _ => Err(ExportError::InvalidCrop("会话缺少源图或裁剪区域".to_string())),
        };

        let image = match exported {
            Ok(image) => image,
            Err(e) => {
                log::warn!("⚠️ 裁剪导出失败：{}", e);
                self.fail(e.to_string())?;
                return Err(e.into());
            }
        };

        self.begin_upload()?;

        match uploader.submit(&image, target).await {
            Ok(result) => {
                self.complete(result.clone())?;
                Ok(Confirmed { image, upload: result })
            }
            Err(e) => {
                log::warn!("⚠️ 上传失败，导出结果已丢弃：{}", e);
                self.fail(e.to_string())?;
                Err(e.into())
            }
        }
    }

    fn ensure_editable(&self, action: &'static str) -> Result<(), SessionError> {
        match self.phase {
            Phase::Cropping | Phase::Failed => Ok(()),
            Phase::Exporting | Phase::Uploading => Err(SessionError::Busy),
            Phase::Idle | Phase::Done => Err(self.invalid(action)),
        }
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            from: self.phase.as_str(),
            action,
        }
    }
}
