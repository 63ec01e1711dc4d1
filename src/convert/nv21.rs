// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! NV21 暂存: Y 平面 (紧凑) + 交错 VU 平面
//!
//! - pixel stride 1 (全平面): U、V 分别读取, 手动交错为 V,U
//! - pixel stride 2 (半平面): U 平面已按 U,V 交错, 拷贝时交换为 V,U
//!
//! 越界的亮度样本填 0, 色度样本填 128.

use crate::error::ConvertError;
use crate::input::{Plane, RawFrame};

/// 色度平面尺寸 (4:2:0, 向上取整)
#[inline]
pub fn chroma_size(width: u32, height: u32) -> (usize, usize) {
    ((width as usize + 1) / 2, (height as usize + 1) / 2)
}

/// NV21 实际数据长度
pub fn nv21_len(width: u32, height: u32) -> usize {
    let (cw, ch) = chroma_size(width, height);
    width as usize * height as usize + cw * ch * 2
}

/// 暂存区长度 (按4字节对齐, GPU 拷贝要求)
pub fn staging_len(width: u32, height: u32) -> usize {
    (nv21_len(width, height) + 3) & !3
}

/// 将原始帧写入 NV21 暂存区
pub fn stage(frame: &RawFrame, staging: &mut [u8]) -> Result<(), ConvertError> {
    let (w, h) = (frame.width() as usize, frame.height() as usize);
    let required = nv21_len(frame.width(), frame.height());
    if staging.len() < required {
        return Err(ConvertError::InvalidDimensions {
            width: frame.width(),
            height: frame.height(),
        });
    }

    let (luma, chroma) = staging[..required].split_at_mut(w * h);
    copy_luma(frame.y(), w, h, luma);

    let (cw, ch) = chroma_size(frame.width(), frame.height());
    match frame.u().pixel_stride() {
        1 => interleave_planar(frame.u(), frame.v(), cw, ch, chroma),
        2 => swap_semi_planar(frame.u(), frame.v(), cw, ch, chroma),
        pixel_stride => return Err(ConvertError::UnsupportedChromaLayout { pixel_stride }),
    }
    Ok(())
}

fn copy_luma(plane: &Plane, w: usize, h: usize, dst: &mut [u8]) {
    for (row, dst_row) in dst.chunks_exact_mut(w).take(h).enumerate() {
        if plane.pixel_stride() == 1 {
            // 整行拷贝, 不足部分补0
            let start = row * plane.row_stride();
            let src = plane.data().get(start..).unwrap_or(&[]);
            let n = src.len().min(w);
            dst_row[..n].copy_from_slice(&src[..n]);
            dst_row[n..].fill(0);
        } else {
            for (col, px) in dst_row.iter_mut().enumerate() {
                *px = plane.sample(row, col).unwrap_or(0);
            }
        }
    }
}

fn interleave_planar(u: &Plane, v: &Plane, cw: usize, ch: usize, dst: &mut [u8]) {
    for row in 0..ch {
        for col in 0..cw {
            let i = (row * cw + col) * 2;
            dst[i] = v.sample(row, col).unwrap_or(128);
            dst[i + 1] = u.sample(row, col).unwrap_or(128);
        }
    }
}

fn swap_semi_planar(u: &Plane, v: &Plane, cw: usize, ch: usize, dst: &mut [u8]) {
    let src = u.data();
    for row in 0..ch {
        let base = row * u.row_stride();
        for col in 0..cw {
            let idx = base + col * 2;
            let i = (row * cw + col) * 2;
            // U 平面的下一个字节即 V; 缓冲区末尾被截断时从 V 平面补
            let cu = src.get(idx).copied().unwrap_or(128);
            let cv = src
                .get(idx + 1)
                .copied()
                .or_else(|| v.sample(row, col))
                .unwrap_or(128);
            dst[i] = cv;
            dst[i + 1] = cu;
        }
    }
}
