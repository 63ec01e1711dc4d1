// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 观测接口 (Observability sink)
//!
//! 核心组件不直接调用日志库, 只向注入的 `ObservabilitySink` 发送结构化事件.
//! 默认实现 `TracingSink` 转发到 `tracing`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::convert::Backend;

/// 流水线阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Conversion,
    Inference,
    Total,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Conversion => "conversion",
            Stage::Inference => "inference",
            Stage::Total => "total",
        }
    }
}

/// 流水线事件
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// 节流丢弃
    FrameThrottled { timestamp_ms: u64 },
    /// 转换策略已选定
    BackendSelected { backend: Backend },
    /// 加速路径不可用 (初始化失败)
    AcceleratorUnavailable { reason: String },
    /// 加速路径失败, 当前帧回退到标量路径
    ConversionFallback { backend: Backend, error: String },
    /// 两条路径都失败, 丢弃该帧
    ConversionFailed { error: String },
    /// 尺寸变化, 释放旧缓冲区并重新分配
    BuffersReallocated { width: u32, height: u32 },
    /// 检测器未就绪
    DetectorUnavailable,
    /// 模型加载结果
    ModelLoaded,
    ModelLoadFailed { error: String },
    /// 推理失败 (错误或panic)
    InferenceFailed { error: String },
    /// 阶段耗时
    Timing { stage: Stage, elapsed: Duration },
    /// 每秒吞吐统计
    Throughput {
        fps: f64,
        seen: u64,
        throttled: u64,
        failed: u64,
        detections: u64,
    },
    /// 资源已释放
    Released { component: &'static str },
}

/// 可注入的观测接口
pub trait ObservabilitySink: Send + Sync {
    fn record(&self, event: &PipelineEvent);
}

/// 默认实现: 转发到 tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
    fn record(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::FrameThrottled { timestamp_ms } => {
                tracing::trace!(timestamp_ms, "⏭️ 节流丢帧");
            }
            PipelineEvent::BackendSelected { backend } => {
                tracing::info!(backend = backend.name(), "✅ 颜色转换后端");
            }
            PipelineEvent::AcceleratorUnavailable { reason } => {
                tracing::warn!(%reason, "⚠️ 加速转换不可用, 使用标量路径");
            }
            PipelineEvent::ConversionFallback { backend, error } => {
                tracing::warn!(backend = backend.name(), %error, "⚠️ 加速转换失败, 回退到标量路径");
            }
            PipelineEvent::ConversionFailed { error } => {
                tracing::error!(%error, "❌ 颜色转换失败, 丢弃该帧");
            }
            PipelineEvent::BuffersReallocated { width, height } => {
                tracing::info!(width, height, "🔄 图像尺寸变化, 重新分配缓冲区");
            }
            PipelineEvent::DetectorUnavailable => {
                tracing::debug!("⚠️ 检测器未就绪");
            }
            PipelineEvent::ModelLoaded => {
                tracing::info!("✅ 检测模型加载成功");
            }
            PipelineEvent::ModelLoadFailed { error } => {
                tracing::error!(%error, "❌ 检测模型加载失败");
            }
            PipelineEvent::InferenceFailed { error } => {
                tracing::error!(%error, "❌ 推理失败");
            }
            PipelineEvent::Timing { stage, elapsed } => {
                tracing::debug!(
                    stage = stage.name(),
                    ms = elapsed.as_secs_f64() * 1000.0,
                    "⏱️ 阶段耗时"
                );
            }
            PipelineEvent::Throughput {
                fps,
                seen,
                throttled,
                failed,
                detections,
            } => {
                tracing::info!(
                    "📺 处理统计: {:.1}fps | 总帧{} | 节流{} | 失败{} | 检测{}",
                    fps,
                    seen,
                    throttled,
                    failed,
                    detections
                );
            }
            PipelineEvent::Released { component } => {
                tracing::debug!(component, "🧹 资源已释放");
            }
        }
    }
}

/// 丢弃所有事件
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ObservabilitySink for NullSink {
    fn record(&self, _event: &PipelineEvent) {}
}

/// 内存记录 (用于测试和调试)
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self, pred: impl Fn(&PipelineEvent) -> bool) -> usize {
        self.events
            .lock()
            .map(|e| e.iter().filter(|ev| pred(ev)).count())
            .unwrap_or(0)
    }
}

impl ObservabilitySink for MemorySink {
    fn record(&self, event: &PipelineEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// 默认观测接口
pub fn default_sink() -> Arc<dyn ObservabilitySink> {
    Arc::new(TracingSink)
}
