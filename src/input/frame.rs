// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 原始相机帧 (RawFrame)
//!
//! 帧的底层缓冲区属于相机子系统, 流水线只持有一次处理过程.
//! 释放回调在 `Drop` 中执行, 因此无论走哪个分支都恰好释放一次.

use std::fmt;
use std::sync::Arc;

/// 单个像素平面 (Y / U / V)
#[derive(Clone)]
pub struct Plane {
    data: Arc<[u8]>,
    row_stride: usize,
    pixel_stride: usize,
}

impl Plane {
    pub fn new(data: impl Into<Arc<[u8]>>, row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data: data.into(),
            row_stride,
            pixel_stride,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    pub fn pixel_stride(&self) -> usize {
        self.pixel_stride
    }

    /// 按 (行, 列) 取样, 越界返回 None
    #[inline]
    pub fn sample(&self, row: usize, col: usize) -> Option<u8> {
        let idx = row
            .checked_mul(self.row_stride)?
            .checked_add(col.checked_mul(self.pixel_stride)?)?;
        self.data.get(idx).copied()
    }
}

impl fmt::Debug for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plane")
            .field("len", &self.data.len())
            .field("row_stride", &self.row_stride)
            .field("pixel_stride", &self.pixel_stride)
            .finish()
    }
}

type ReleaseHook = Box<dyn FnOnce() + Send>;

/// YUV 4:2:0 原始帧
pub struct RawFrame {
    width: u32,
    height: u32,
    rotation_degrees: u32,
    timestamp_ms: u64,
    planes: [Plane; 3],
    release: Option<ReleaseHook>,
}

impl RawFrame {
    /// 创建原始帧, planes 顺序为 Y, U, V
    pub fn new(
        width: u32,
        height: u32,
        rotation_degrees: u32,
        timestamp_ms: u64,
        planes: [Plane; 3],
    ) -> Self {
        Self {
            width,
            height,
            rotation_degrees,
            timestamp_ms,
            planes,
            release: None,
        }
    }

    /// 设置释放回调 (归还相机缓冲区)
    pub fn with_release(mut self, release: impl FnOnce() + Send + 'static) -> Self {
        self.release = Some(Box::new(release));
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rotation_degrees(&self) -> u32 {
        self.rotation_degrees
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    pub fn y(&self) -> &Plane {
        &self.planes[0]
    }

    pub fn u(&self) -> &Plane {
        &self.planes[1]
    }

    pub fn v(&self) -> &Plane {
        &self.planes[2]
    }

    /// 显式释放, 等同于 drop
    pub fn release(self) {}
}

impl Drop for RawFrame {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("rotation_degrees", &self.rotation_degrees)
            .field("timestamp_ms", &self.timestamp_ms)
            .field("planes", &self.planes)
            .field("has_release", &self.release.is_some())
            .finish()
    }
}
