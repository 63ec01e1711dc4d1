// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 颜色空间转换 (Color Conversion)
///
/// - ScalarConverter: BT.601 标量实现, 任意 stride 都可用
/// - WgpuConverter:   GPU计算着色器 (feature `gpu`), 构造时探测一次
/// - ColorConverter:  加速路径优先, 失败时同一帧回退到标量路径
pub mod buffer_pool;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod nv21;
pub mod scalar;

use std::sync::Arc;

use crate::error::ConvertError;
use crate::input::RawFrame;
use crate::telemetry::{ObservabilitySink, PipelineEvent};

pub use buffer_pool::{BufferPool, FrameBuffers};
#[cfg(feature = "gpu")]
pub use gpu::WgpuConverter;
pub use scalar::{yuv_to_rgb, ScalarConverter};

/// 单边最大尺寸
pub const MAX_DIMENSION: u32 = 8192;

/// 转换后端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Scalar,
    Gpu,
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Scalar => "scalar",
            Backend::Gpu => "gpu",
        }
    }
}

/// 紧凑RGB图像 (每像素3字节), 由缓冲区池持有
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConvertedImage {
    width: u32,
    height: u32,
    rotation_degrees: u32,
    data: Vec<u8>,
}

impl ConvertedImage {
    pub(crate) fn allocate(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rotation_degrees: 0,
            data: vec![0u8; width as usize * height as usize * 3],
        }
    }

    pub fn from_rgb(width: u32, height: u32, rotation_degrees: u32, data: Vec<u8>) -> Option<Self> {
        (data.len() == width as usize * height as usize * 3).then_some(Self {
            width,
            height,
            rotation_degrees,
            data,
        })
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

    pub fn as_rgb(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn as_rgb_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 3;
        Some([self.data[i], self.data[i + 1], self.data[i + 2]])
    }

    /// 拷贝为 image::RgbImage (保存调试图片等)
    pub fn to_rgb_image(&self) -> Option<image::RgbImage> {
        image::RgbImage::from_raw(self.width, self.height, self.data.clone())
    }
}

/// 转换策略
pub trait ColorConversion: Send {
    fn backend(&self) -> Backend;

    /// 将帧转换到 `buffers.image`; 尺寸已由调用方校验
    fn convert(&mut self, frame: &RawFrame, buffers: &mut FrameBuffers) -> Result<(), ConvertError>;

    /// 释放后端持有的资源
    fn release(&mut self) {}
}

/// 颜色转换器
pub struct ColorConverter {
    accelerated: Option<Box<dyn ColorConversion>>,
    scalar: ScalarConverter,
    pool: BufferPool,
    sink: Arc<dyn ObservabilitySink>,
    fallbacks: u64,
}

impl ColorConverter {
    /// 创建转换器; `prefer_accelerated` 时探测一次GPU
    pub fn new(prefer_accelerated: bool, sink: Arc<dyn ObservabilitySink>) -> Self {
        let accelerated = if prefer_accelerated {
            probe_accelerator(sink.as_ref())
        } else {
            None
        };
        Self::build(accelerated, sink)
    }

    pub fn scalar_only(sink: Arc<dyn ObservabilitySink>) -> Self {
        Self::build(None, sink)
    }

    /// 使用指定的加速实现
    pub fn with_accelerator(accelerated: Box<dyn ColorConversion>, sink: Arc<dyn ObservabilitySink>) -> Self {
        Self::build(Some(accelerated), sink)
    }

    fn build(accelerated: Option<Box<dyn ColorConversion>>, sink: Arc<dyn ObservabilitySink>) -> Self {
        let pool = BufferPool::new(accelerated.is_some());
        let converter = Self {
            accelerated,
            scalar: ScalarConverter,
            pool,
            sink,
            fallbacks: 0,
        };
        converter.sink.record(&PipelineEvent::BackendSelected {
            backend: converter.backend(),
        });
        converter
    }

    /// 当前首选后端
    pub fn backend(&self) -> Backend {
        self.accelerated
            .as_ref()
            .map(|a| a.backend())
            .unwrap_or(Backend::Scalar)
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// 加速路径失败后回退到标量路径的次数
    pub fn fallbacks(&self) -> u64 {
        self.fallbacks
    }

    /// 转换一帧. 返回的图像借用自缓冲区池, 下次转换前有效.
    pub fn convert(&mut self, frame: &RawFrame) -> Result<&ConvertedImage, ConvertError> {
        let (width, height) = (frame.width(), frame.height());
        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            let err = ConvertError::InvalidDimensions { width, height };
            self.sink.record(&PipelineEvent::ConversionFailed {
                error: err.to_string(),
            });
            return Err(err);
        }

        if self.pool.acquire(width, height) {
            self.sink
                .record(&PipelineEvent::BuffersReallocated { width, height });
        }
        let buffers = self.pool.buffers_mut();
        buffers.image.rotation_degrees = frame.rotation_degrees();

        let mut done = false;
        if let Some(accelerated) = self.accelerated.as_mut() {
            match accelerated.convert(frame, buffers) {
                Ok(()) => done = true,
                Err(err) => {
                    self.fallbacks += 1;
                    self.sink.record(&PipelineEvent::ConversionFallback {
                        backend: accelerated.backend(),
                        error: err.to_string(),
                    });
                }
            }
        }

        if !done {
            if let Err(err) = self.scalar.convert(frame, buffers) {
                self.sink.record(&PipelineEvent::ConversionFailed {
                    error: err.to_string(),
                });
                return Err(err);
            }
        }

        Ok(self.pool.image())
    }

    /// 释放GPU上下文和缓存的缓冲区 (可重复调用).
    /// 之后仍可继续转换, 但只走标量路径.
    pub fn release(&mut self) {
        let held = self.accelerated.is_some() || self.pool.key().is_some();
        if let Some(mut accelerated) = self.accelerated.take() {
            accelerated.release();
        }
        // 之后只走标量路径, 不再需要NV21暂存区
        self.pool.set_staging(false);
        self.pool.release();
        if held {
            self.sink.record(&PipelineEvent::Released {
                component: "converter",
            });
        }
    }
}

#[cfg(feature = "gpu")]
fn probe_accelerator(sink: &dyn ObservabilitySink) -> Option<Box<dyn ColorConversion>> {
    match WgpuConverter::new() {
        Ok(converter) => Some(Box::new(converter) as Box<dyn ColorConversion>),
        Err(err) => {
            sink.record(&PipelineEvent::AcceleratorUnavailable {
                reason: err.to_string(),
            });
            None
        }
    }
}

#[cfg(not(feature = "gpu"))]
fn probe_accelerator(sink: &dyn ObservabilitySink) -> Option<Box<dyn ColorConversion>> {
    sink.record(&PipelineEvent::AcceleratorUnavailable {
        reason: "built without the `gpu` feature".to_string(),
    });
    None
}
