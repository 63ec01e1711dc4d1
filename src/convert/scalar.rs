// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 标量 YUV420 → RGB 转换 (BT.601)
//!
//! 直接按 row/pixel stride 从各平面取样, 因此全平面与半平面布局都适用.

use super::buffer_pool::FrameBuffers;
use super::{Backend, ColorConversion};
use crate::error::ConvertError;
use crate::input::RawFrame;

/// 单像素 BT.601 转换, 先向零截断再钳位
#[inline]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y_adj = (y as i32 - 16) as f32;
    let u_adj = (u as i32 - 128) as f32;
    let v_adj = (v as i32 - 128) as f32;

    let r = 1.164 * y_adj + 1.596 * v_adj;
    let g = 1.164 * y_adj - 0.392 * u_adj - 0.813 * v_adj;
    let b = 1.164 * y_adj + 2.017 * u_adj;

    [
        (r as i32).clamp(0, 255) as u8,
        (g as i32).clamp(0, 255) as u8,
        (b as i32).clamp(0, 255) as u8,
    ]
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ScalarConverter;

impl ColorConversion for ScalarConverter {
    fn backend(&self) -> Backend {
        Backend::Scalar
    }

    fn convert(&mut self, frame: &RawFrame, buffers: &mut FrameBuffers) -> Result<(), ConvertError> {
        let (w, h) = (frame.width() as usize, frame.height() as usize);
        let out = buffers.image.as_rgb_mut();
        if out.len() < w * h * 3 {
            return Err(ConvertError::InvalidDimensions {
                width: frame.width(),
                height: frame.height(),
            });
        }

        let (y_plane, u_plane, v_plane) = (frame.y(), frame.u(), frame.v());
        for (row, out_row) in out.chunks_exact_mut(w * 3).take(h).enumerate() {
            for (col, px) in out_row.chunks_exact_mut(3).enumerate() {
                let y = y_plane.sample(row, col).unwrap_or(0);
                let u = u_plane.sample(row >> 1, col >> 1).unwrap_or(128);
                let v = v_plane.sample(row >> 1, col >> 1).unwrap_or(128);
                px.copy_from_slice(&yuv_to_rgb(y, u, v));
            }
        }
        Ok(())
    }
}
