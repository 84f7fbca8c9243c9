//! # 画布渲染模块
//!
//! ## 设计思路
//!
//! 复刻网页端 canvas 的绘制语义，而不是做“更正确”的裁剪：
//! 1. 画布尺寸恒为 `PixelCrop.width × PixelCrop.height`
//! 2. 源矩形 `(x*sx, y*sy, w*sx, h*sy)` 重采样铺满画布，越界部分保持透明
//! 3. 透明区域按 JPEG 导出规则压成黑色
//! 4. 以画布中心为轴旋转；90°/270° 时宽高不交换，非正方形裁剪会被裁掉角落
//!
//! ## 实现思路
//!
//! - 重采样优先走 `fast_image_resize`（支持浮点源矩形），失败回退 `image::imageops`。
//! - 整像素对齐且尺寸相同的源矩形直接拷贝，保证无损。
//! - 旋转使用逆映射 + 双线性采样，直角使用精确三角值。

use fast_image_resize as fr;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage, Rgba, RgbaImage};

use super::geometry::{PixelCrop, SourceRect, normalize_rotation, rotation_sin_cos};
use super::source::SourceImage;
use super::ExportError;

/// 渲染裁剪结果（未编码）。
///
/// 先校验裁剪区域，再分配画布。
pub fn render_crop(
    source: &SourceImage,
    crop: &PixelCrop,
    rotation: i64,
    filter: FilterType,
) -> Result<RgbImage, ExportError> {
    let (width, height) = crop.output_dimensions()?;
    let (scale_x, scale_y) = source.scale_factors();
    let rect = crop.scaled(scale_x, scale_y);

    let frame = draw_region(source.bitmap(), rect, width, height, filter);
    let flat = flatten_over_black(&frame);

    Ok(rotate_about_center(flat, normalize_rotation(rotation)))
}

/// 把源矩形绘制到 `width × height` 的透明画布上（`drawImage` 九参数版本）。
pub(crate) fn draw_region(
    bitmap: &RgbaImage,
    rect: SourceRect,
    width: u32,
    height: u32,
    filter: FilterType,
) -> RgbaImage {
    let Some(visible) = rect.intersect_bounds(bitmap.width(), bitmap.height()) else {
        log::debug!("🕳️ 源矩形完全落在位图之外：{:?}", rect);
        return RgbaImage::new(width, height);
    };

    let to_dest_x = |v: f64| ((v - rect.left) / rect.width * width as f64).round().clamp(0.0, width as f64) as u32;
    let to_dest_y = |v: f64| ((v - rect.top) / rect.height * height as f64).round().clamp(0.0, height as f64) as u32;

    let dest_left = to_dest_x(visible.left);
    let dest_right = to_dest_x(visible.right());
    let dest_top = to_dest_y(visible.top);
    let dest_bottom = to_dest_y(visible.bottom());

    if dest_right <= dest_left || dest_bottom <= dest_top {
        return RgbaImage::new(width, height);
    }

    let piece = resample(
        bitmap,
        visible,
        dest_right - dest_left,
        dest_bottom - dest_top,
        filter,
    );

    if piece.dimensions() == (width, height) {
        return piece;
    }

    let mut canvas = RgbaImage::new(width, height);
    imageops::replace(&mut canvas, &piece, dest_left as i64, dest_top as i64);
    canvas
}

/// 将位图内的浮点源矩形重采样到目标尺寸。
fn resample(
    bitmap: &RgbaImage,
    rect: SourceRect,
    target_width: u32,
    target_height: u32,
    filter: FilterType,
) -> RgbaImage {
    if rect.is_pixel_aligned()
        && rect.width as u32 == target_width
        && rect.height as u32 == target_height
    {
        return imageops::crop_imm(
            bitmap,
            rect.left as u32,
            rect.top as u32,
            target_width,
            target_height,
        )
        .to_image();
    }

    match resample_with_fast_image_resize(bitmap, rect, target_width, target_height, filter) {
        Ok(resized) => resized,
        Err(err) => {
            log::warn!("⚠️ fast_image_resize 重采样失败，回退 image::imageops：{}", err);

            let left = rect.left.floor() as u32;
            let top = rect.top.floor() as u32;
            let width = (rect.right().ceil() as u32).saturating_sub(left).max(1);
            let height = (rect.bottom().ceil() as u32).saturating_sub(top).max(1);
            let sub = imageops::crop_imm(bitmap, left, top, width, height).to_image();
            imageops::resize(&sub, target_width, target_height, filter)
        }
    }
}

fn resample_with_fast_image_resize(
    bitmap: &RgbaImage,
    rect: SourceRect,
    target_width: u32,
    target_height: u32,
    filter: FilterType,
) -> Result<RgbaImage, String> {
    let src_image = fr::images::ImageRef::new(
        bitmap.width(),
        bitmap.height(),
        bitmap.as_raw(),
        fr::PixelType::U8x4,
    )
    .map_err(|e| format!("构建源图像缓冲失败：{}", e))?;

    let mut dst_image = fr::images::Image::new(target_width, target_height, fr::PixelType::U8x4);

    let options = fr::ResizeOptions::new()
        .resize_alg(to_fast_alg(filter))
        .crop(rect.left, rect.top, rect.width, rect.height);

    fr::Resizer::new()
        .resize(&src_image, &mut dst_image, &options)
        .map_err(|e| format!("fast_image_resize 执行失败：{}", e))?;

    RgbaImage::from_raw(target_width, target_height, dst_image.into_vec())
        .ok_or_else(|| "fast_image_resize 输出缓冲长度异常".to_string())
}

fn to_fast_alg(filter: FilterType) -> fr::ResizeAlg {
    match filter {
        FilterType::Nearest => fr::ResizeAlg::Nearest,
        FilterType::Triangle => fr::ResizeAlg::Convolution(fr::FilterType::Bilinear),
        FilterType::CatmullRom => fr::ResizeAlg::Convolution(fr::FilterType::CatmullRom),
        FilterType::Gaussian => fr::ResizeAlg::Convolution(fr::FilterType::Mitchell),
        FilterType::Lanczos3 => fr::ResizeAlg::Convolution(fr::FilterType::Lanczos3),
    }
}

/// 透明像素压到黑底上（与 canvas 导出 JPEG 的行为一致）。
pub(crate) fn flatten_over_black(frame: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
        let Rgba([r, g, b, a]) = *frame.get_pixel(x, y);
        let mul = |c: u8| ((c as u16 * a as u16 + 127) / 255) as u8;
        Rgb([mul(r), mul(g), mul(b)])
    })
}

/// 以画布中心为轴旋转，输出尺寸与输入相同，落在画布外的区域为黑色。
pub(crate) fn rotate_about_center(frame: RgbImage, normalized_degrees: u32) -> RgbImage {
    if normalized_degrees == 0 {
        return frame;
    }

    let (width, height) = frame.dimensions();
    let (sin, cos) = rotation_sin_cos(normalized_degrees);
    let cx = width as f64 / 2.0;
    let cy = height as f64 / 2.0;

    RgbImage::from_fn(width, height, |x, y| {
        let dx = x as f64 + 0.5 - cx;
        let dy = y as f64 + 0.5 - cy;
        let src_x = cx + cos * dx + sin * dy;
        let src_y = cy - sin * dx + cos * dy;
        sample_bilinear(&frame, src_x - 0.5, src_y - 0.5)
    })
}

/// 在像素中心坐标系下双线性采样，越界邻居视为黑色。
fn sample_bilinear(image: &RgbImage, fx: f64, fy: f64) -> Rgb<u8> {
    let x0 = fx.floor();
    let y0 = fy.floor();
    let tx = fx - x0;
    let ty = fy - y0;

    let fetch = |x: f64, y: f64| -> [f64; 3] {
        if x < 0.0 || y < 0.0 || x >= image.width() as f64 || y >= image.height() as f64 {
            return [0.0; 3];
        }
        let Rgb([r, g, b]) = *image.get_pixel(x as u32, y as u32);
        [r as f64, g as f64, b as f64]
    };

    let taps = [
        (x0, y0, (1.0 - tx) * (1.0 - ty)),
        (x0 + 1.0, y0, tx * (1.0 - ty)),
        (x0, y0 + 1.0, (1.0 - tx) * ty),
        (x0 + 1.0, y0 + 1.0, tx * ty),
    ];

    let mut acc = [0.0_f64; 3];
    for (x, y, weight) in taps {
        if weight == 0.0 {
            continue;
        }
        let px = fetch(x, y);
        for channel in 0..3 {
            acc[channel] += px[channel] * weight;
        }
    }

    Rgb(acc.map(|v| v.round().clamp(0.0, 255.0) as u8))
}
