//! # 裁剪几何
//!
//! 裁剪界面的平移/缩放/旋转状态（`CropState`）、裁剪矩形（`PixelCrop`），
//! 以及导出阶段需要的坐标换算。
//!
//! 坐标约定：原点在左上角，y 轴向下；正角度为视觉上的顺时针旋转（与 canvas 一致）。

use serde::{Deserialize, Serialize};

use super::ExportError;

/// 宽高对。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    fn is_positive(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// 以源图像素坐标表示的裁剪矩形。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelCrop {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl PixelCrop {
    pub fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self { x, y, width, height }
    }

    /// 校验并返回输出画布尺寸。
    ///
    /// 在任何解码或画布分配之前调用。
    pub fn output_dimensions(&self) -> Result<(u32, u32), ExportError> {
        if self.width <= 0 || self.height <= 0 {
            return Err(ExportError::InvalidCrop(format!(
                "宽高必须为正数：{}x{}",
                self.width, self.height
            )));
        }
        if self.x < 0 || self.y < 0 {
            return Err(ExportError::InvalidCrop(format!(
                "坐标不能为负数：({}, {})",
                self.x, self.y
            )));
        }

        let width = u32::try_from(self.width)
            .map_err(|_| ExportError::InvalidCrop(format!("宽度超出范围：{}", self.width)))?;
        let height = u32::try_from(self.height)
            .map_err(|_| ExportError::InvalidCrop(format!("高度超出范围：{}", self.height)))?;

        Ok((width, height))
    }

    /// 按缩放因子映射到位图上的源矩形。
    pub fn scaled(&self, scale_x: f64, scale_y: f64) -> SourceRect {
        SourceRect {
            left: self.x as f64 * scale_x,
            top: self.y as f64 * scale_y,
            width: self.width as f64 * scale_x,
            height: self.height as f64 * scale_y,
        }
    }
}

/// 位图上的浮点源矩形（`drawImage` 的 sx/sy/sw/sh）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl SourceRect {
    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// 与 `[0, width) x [0, height)` 位图的交集；无交集时返回 `None`。
    pub fn intersect_bounds(&self, width: u32, height: u32) -> Option<SourceRect> {
        let left = self.left.max(0.0);
        let top = self.top.max(0.0);
        let right = self.right().min(width as f64);
        let bottom = self.bottom().min(height as f64);

        if right <= left || bottom <= top {
            return None;
        }

        Some(SourceRect {
            left,
            top,
            width: right - left,
            height: bottom - top,
        })
    }

    /// 四条边是否都落在整数像素上。
    pub fn is_pixel_aligned(&self) -> bool {
        [self.left, self.top, self.width, self.height]
            .iter()
            .all(|v| v.fract() == 0.0)
    }
}

/// 将任意整数角度归一化到 `[0, 360)`。
pub fn normalize_rotation(degrees: i64) -> u32 {
    degrees.rem_euclid(360) as u32
}

/// 归一化角度对应的 (sin, cos)。
///
/// 直角返回精确值，避免浮点误差让四分之一旋转产生插值模糊。
pub fn rotation_sin_cos(normalized: u32) -> (f64, f64) {
    match normalized {
        0 => (0.0, 1.0),
        90 => (1.0, 0.0),
        180 => (0.0, -1.0),
        270 => (-1.0, 0.0),
        other => (other as f64).to_radians().sin_cos(),
    }
}

/// 旋转后外接矩形尺寸。
pub fn rotated_bounds(size: Size, rotation: i64) -> Size {
    let (sin, cos) = rotation_sin_cos(normalize_rotation(rotation));
    Size {
        width: (size.width * cos).abs() + (size.height * sin).abs(),
        height: (size.width * sin).abs() + (size.height * cos).abs(),
    }
}

/// 裁剪界面的交互状态。
///
/// 不可变值对象：每次交互通过 `with_*` 产生新值。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropState {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
    pub rotation: i64,
}

impl Default for CropState {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
            rotation: 0,
        }
    }
}

impl CropState {
    pub const MIN_ZOOM: f64 = 1.0;
    pub const MAX_ZOOM: f64 = 3.0;

    pub fn with_pan(self, x: f64, y: f64) -> Self {
        Self { x, y, ..self }
    }

    /// 缩放被限制在 `[MIN_ZOOM, MAX_ZOOM]`。
    pub fn with_zoom(self, zoom: f64) -> Self {
        let zoom = if zoom.is_finite() {
            zoom.clamp(Self::MIN_ZOOM, Self::MAX_ZOOM)
        } else {
            Self::MIN_ZOOM
        };
        Self { zoom, ..self }
    }

    pub fn with_rotation(self, rotation: i64) -> Self {
        Self {
            rotation: normalize_rotation(rotation) as i64,
            ..self
        }
    }

    /// 把平移限制在媒体范围内，使视口不会露出媒体之外的区域。
    pub fn clamp_pan(self, display: Size, viewport: Size) -> Self {
        let bounds = rotated_bounds(display, self.rotation);
        let max_x = ((bounds.width * self.zoom - viewport.width) / 2.0).max(0.0);
        let max_y = ((bounds.height * self.zoom - viewport.height) / 2.0).max(0.0);

        Self {
            x: self.x.clamp(-max_x, max_x),
            y: self.y.clamp(-max_y, max_y),
            ..self
        }
    }

    /// 计算当前状态在显示图坐标系中框住的矩形。
    ///
    /// `display` 为媒体在界面上的渲染尺寸，`viewport` 为裁剪框尺寸。
    /// 结果限制在旋转后的外接矩形内并取整，宽高至少为 1。
    pub fn pixel_crop(&self, display: Size, viewport: Size) -> Result<PixelCrop, ExportError> {
        if !display.is_positive() || !viewport.is_positive() {
            return Err(ExportError::InvalidCrop(format!(
                "显示尺寸或裁剪框尺寸无效：{:?} / {:?}",
                display, viewport
            )));
        }

        let zoom = self.zoom.max(Self::MIN_ZOOM);
        let bounds = rotated_bounds(display, self.rotation);

        let visible_w = (viewport.width / zoom).min(bounds.width);
        let visible_h = (viewport.height / zoom).min(bounds.height);
        let left = ((bounds.width - viewport.width / zoom) / 2.0 - self.x / zoom)
            .clamp(0.0, bounds.width - visible_w);
        let top = ((bounds.height - viewport.height / zoom) / 2.0 - self.y / zoom)
            .clamp(0.0, bounds.height - visible_h);

        Ok(PixelCrop {
            x: left.round() as i64,
            y: top.round() as i64,
            width: (visible_w.round() as i64).max(1),
            height: (visible_h.round() as i64).max(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_normalizes_negative_and_large_values() {
        assert_eq!(normalize_rotation(0), 0);
        assert_eq!(normalize_rotation(450), 90);
        assert_eq!(normalize_rotation(-90), 270);
        assert_eq!(normalize_rotation(-720), 0);
    }

    #[test]
    fn quarter_turns_have_exact_trig() {
        assert_eq!(rotation_sin_cos(90), (1.0, 0.0));
        assert_eq!(rotation_sin_cos(270), (-1.0, 0.0));
    }

    #[test]
    fn zero_or_negative_extent_is_invalid() {
        assert!(matches!(
            PixelCrop::new(0, 0, 0, 10).output_dimensions(),
            Err(ExportError::InvalidCrop(_))
        ));
        assert!(matches!(
            PixelCrop::new(0, 0, 10, -1).output_dimensions(),
            Err(ExportError::InvalidCrop(_))
        ));
        assert!(matches!(
            PixelCrop::new(-1, 0, 10, 10).output_dimensions(),
            Err(ExportError::InvalidCrop(_))
        ));
        assert_eq!(PixelCrop::new(3, 4, 10, 20).output_dimensions().unwrap(), (10, 20));
    }

    #[test]
    fn scaled_rect_matches_display_to_natural_ratio() {
        let rect = PixelCrop::new(100, 50, 200, 200).scaled(2.0, 2.0);
        assert_eq!(
            rect,
            SourceRect {
                left: 200.0,
                top: 100.0,
                width: 400.0,
                height: 400.0
            }
        );
        assert!(rect.is_pixel_aligned());
    }

    #[test]
    fn intersect_clips_rect_hanging_off_the_edge() {
        let rect = SourceRect {
            left: -10.0,
            top: 90.0,
            width: 30.0,
            height: 30.0,
        };
        let clipped = rect.intersect_bounds(100, 100).expect("overlap");
        assert_eq!(clipped.left, 0.0);
        assert_eq!(clipped.width, 20.0);
        assert_eq!(clipped.height, 10.0);

        let outside = SourceRect {
            left: 200.0,
            top: 0.0,
            width: 10.0,
            height: 10.0,
        };
        assert!(outside.intersect_bounds(100, 100).is_none());
    }

    #[test]
    fn centered_state_frames_middle_of_media() {
        let state = CropState::default();
        let crop = state
            .pixel_crop(Size::new(600.0, 400.0), Size::new(200.0, 200.0))
            .expect("valid sizes");
        assert_eq!(crop, PixelCrop::new(200, 100, 200, 200));
    }

    #[test]
    fn zoom_shrinks_the_framed_region() {
        let state = CropState::default().with_zoom(2.0);
        let crop = state
            .pixel_crop(Size::new(600.0, 400.0), Size::new(200.0, 200.0))
            .expect("valid sizes");
        assert_eq!(crop, PixelCrop::new(250, 150, 100, 100));
    }

    #[test]
    fn pan_moves_opposite_to_drag_and_is_clamped() {
        let state = CropState::default().with_pan(100.0, 0.0);
        let crop = state
            .pixel_crop(Size::new(600.0, 400.0), Size::new(200.0, 200.0))
            .expect("valid sizes");
        assert_eq!(crop.x, 100);

        let far = CropState::default().with_pan(10_000.0, -10_000.0);
        let crop = far
            .pixel_crop(Size::new(600.0, 400.0), Size::new(200.0, 200.0))
            .expect("valid sizes");
        assert_eq!((crop.x, crop.y), (0, 200));
    }

    #[test]
    fn rotation_uses_rotated_bounding_box() {
        let state = CropState::default().with_rotation(90);
        let crop = state
            .pixel_crop(Size::new(600.0, 400.0), Size::new(200.0, 200.0))
            .expect("valid sizes");
        assert_eq!(crop, PixelCrop::new(100, 200, 200, 200));
    }

    #[test]
    fn clamp_pan_limits_offset_to_media_overhang() {
        let state = CropState::default().with_pan(500.0, 500.0);
        let clamped = state.clamp_pan(Size::new(600.0, 400.0), Size::new(200.0, 200.0));
        assert_eq!((clamped.x, clamped.y), (200.0, 100.0));
    }

    #[test]
    fn zoom_is_kept_in_range() {
        assert_eq!(CropState::default().with_zoom(0.2).zoom, CropState::MIN_ZOOM);
        assert_eq!(CropState::default().with_zoom(10.0).zoom, CropState::MAX_ZOOM);
        assert_eq!(CropState::default().with_zoom(f64::NAN).zoom, CropState::MIN_ZOOM);
    }

    #[test]
    fn invalid_viewport_is_rejected() {
        let result = CropState::default().pixel_crop(Size::new(600.0, 400.0), Size::new(0.0, 10.0));
        assert!(matches!(result, Err(ExportError::InvalidCrop(_))));
    }
}
