// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 处理流水线
//! RawFrame → FrameGate → ColorConverter → DetectionAdapter → Vec<AnnotatedDetection>
//!
//! `Pipeline::process` 是全函数: 不返回错误、不panic, 每一帧恰好释放一次.
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::convert::ColorConverter;
use crate::detection::{AnnotatedDetection, DetectionAdapter};
use crate::error::ConvertError;
use crate::input::{FrameGate, RawFrame};
use crate::telemetry::{ObservabilitySink, PipelineEvent, Stage};

/// 单帧处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// 节流丢弃
    Throttled,
    /// 两条转换路径都失败
    ConversionFailed(ConvertError),
    /// 已处理 (检测器未就绪或推理失败时为空列表)
    Processed(Vec<AnnotatedDetection>),
}

impl FrameOutcome {
    pub fn detections(&self) -> &[AnnotatedDetection] {
        match self {
            FrameOutcome::Processed(detections) => detections,
            _ => &[],
        }
    }

    pub fn into_detections(self) -> Vec<AnnotatedDetection> {
        match self {
            FrameOutcome::Processed(detections) => detections,
            _ => Vec::new(),
        }
    }
}

/// 累计统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub seen: u64,
    pub throttled: u64,
    pub converted: u64,
    pub failed: u64,
    pub fallbacks: u64,
    pub detections: u64,
}

/// 每秒吞吐计算
#[derive(Debug)]
struct ThroughputMeter {
    count: u64,
    last: Instant,
}

impl ThroughputMeter {
    fn new(now: Instant) -> Self {
        Self { count: 0, last: now }
    }

    /// 计一帧; 满一秒时返回该窗口的fps
    fn tick(&mut self, now: Instant) -> Option<f64> {
        self.count += 1;
        let elapsed = now.duration_since(self.last).as_secs_f64();
        if elapsed >= 1.0 {
            let fps = self.count as f64 / elapsed;
            self.count = 0;
            self.last = now;
            Some(fps)
        } else {
            None
        }
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    gate: FrameGate,
    converter: ColorConverter,
    adapter: DetectionAdapter,
    stats: PipelineStats,
    meter: ThroughputMeter,
    sink: Arc<dyn ObservabilitySink>,
    shut_down: bool,
}

impl Pipeline {
    /// 按配置创建流水线 (GPU在此探测一次)
    pub fn new(config: PipelineConfig, adapter: DetectionAdapter, sink: Arc<dyn ObservabilitySink>) -> Self {
        let converter = ColorConverter::new(config.prefer_accelerated, sink.clone());
        Self::with_converter(config, converter, adapter, sink)
    }

    pub fn with_converter(
        config: PipelineConfig,
        converter: ColorConverter,
        adapter: DetectionAdapter,
        sink: Arc<dyn ObservabilitySink>,
    ) -> Self {
        Self {
            gate: FrameGate::new(config.throttle_ms),
            config,
            converter,
            adapter,
            stats: PipelineStats::default(),
            meter: ThroughputMeter::new(Instant::now()),
            sink,
            shut_down: false,
        }
    }

    /// 处理一帧, 使用档位默认的置信度阈值. 帧在返回前释放.
    pub fn process(&mut self, frame: RawFrame) -> FrameOutcome {
        let threshold = self.config.confidence_threshold;
        self.process_with_threshold(frame, threshold)
    }

    /// 处理一帧, 置信度阈值由调用方逐帧指定 (不保存). 帧在返回前释放.
    pub fn process_with_threshold(&mut self, frame: RawFrame, confidence_threshold: f32) -> FrameOutcome {
        let outcome = if self.shut_down {
            // 已关闭: 不再转换, 避免重新分配缓冲区
            FrameOutcome::Processed(Vec::new())
        } else {
            self.run(&frame, confidence_threshold)
        };
        frame.release();
        outcome
    }

    fn run(&mut self, frame: &RawFrame, confidence_threshold: f32) -> FrameOutcome {
        self.stats.seen += 1;

        if !self.gate.accept(frame.timestamp_ms()) {
            self.stats.throttled += 1;
            self.sink.record(&PipelineEvent::FrameThrottled {
                timestamp_ms: frame.timestamp_ms(),
            });
            return FrameOutcome::Throttled;
        }

        let start = Instant::now();
        let image = match self.converter.convert(frame) {
            Ok(image) => image,
            Err(err) => {
                self.stats.failed += 1;
                return FrameOutcome::ConversionFailed(err);
            }
        };
        self.sink.record(&PipelineEvent::Timing {
            stage: Stage::Conversion,
            elapsed: start.elapsed(),
        });

        let detections = self.adapter.detect(image, confidence_threshold);

        self.stats.converted += 1;
        self.stats.detections += detections.len() as u64;
        self.sink.record(&PipelineEvent::Timing {
            stage: Stage::Total,
            elapsed: start.elapsed(),
        });

        if let Some(fps) = self.meter.tick(Instant::now()) {
            self.sink.record(&PipelineEvent::Throughput {
                fps,
                seen: self.stats.seen,
                throttled: self.stats.throttled,
                failed: self.stats.failed,
                detections: self.stats.detections,
            });
        }

        FrameOutcome::Processed(detections)
    }

    /// 释放GPU上下文、缓冲区和模型句柄 (可重复调用)
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.converter.release();
        self.adapter.close();
        self.sink.record(&PipelineEvent::Released {
            component: "pipeline",
        });
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            fallbacks: self.converter.fallbacks(),
            ..self.stats
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn converter(&self) -> &ColorConverter {
        &self.converter
    }

    pub fn adapter(&self) -> &DetectionAdapter {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut DetectionAdapter {
        &mut self.adapter
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// 处理线程: 独占流水线, 逐帧处理直到通道关闭
pub struct FrameWorker;

impl FrameWorker {
    /// `frames` 可以是 crossbeam `Receiver` 或 `FrameReceiver` (只保留最新帧)
    pub fn spawn<I, F>(
        mut pipeline: Pipeline,
        frames: I,
        mut consumer: F,
    ) -> std::io::Result<JoinHandle<PipelineStats>>
    where
        I: IntoIterator<Item = RawFrame> + Send + 'static,
        F: FnMut(FrameOutcome) + Send + 'static,
    {
        std::thread::Builder::new()
            .name("objsize-worker".to_string())
            .spawn(move || {
                tracing::info!("🎬 处理线程启动");
                for frame in frames {
                    consumer(pipeline.process(frame));
                }
                pipeline.shutdown();
                let stats = pipeline.stats();
                tracing::info!(
                    seen = stats.seen,
                    converted = stats.converted,
                    "❌ 处理线程退出"
                );
                stats
            })
    }
}
