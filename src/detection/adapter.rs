// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 检测适配器 (DetectionAdapter)
//! 职责: ConvertedImage → 模型推理 → 置信度过滤 → 尺寸估计
//!
//! 对外从不返回错误: 模型未就绪、推理出错或panic时都返回空列表.
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use super::size_estimator::estimate;
use super::types::{AnnotatedDetection, Detection, RawDetection, UNKNOWN_LABEL};
use crate::convert::ConvertedImage;
use crate::models::DetectionModel;
use crate::telemetry::{ObservabilitySink, PipelineEvent, Stage};

/// 模型句柄状态
enum DetectorState {
    Uninitialized,
    Ready(Box<dyn DetectionModel>),
    Closed,
}

/// 对外可见的状态 (不含模型句柄)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorStatus {
    Uninitialized,
    Ready,
    Closed,
}

pub struct DetectionAdapter {
    state: DetectorState,
    sink: Arc<dyn ObservabilitySink>,
}

impl DetectionAdapter {
    /// 未加载模型的适配器
    pub fn new(sink: Arc<dyn ObservabilitySink>) -> Self {
        Self {
            state: DetectorState::Uninitialized,
            sink,
        }
    }

    /// 使用已加载的模型
    pub fn with_model(model: Box<dyn DetectionModel>, sink: Arc<dyn ObservabilitySink>) -> Self {
        sink.record(&PipelineEvent::ModelLoaded);
        Self {
            state: DetectorState::Ready(model),
            sink,
        }
    }

    /// 加载模型 (一次性). 成功返回 true; 关闭后不能再加载.
    pub fn load<F>(&mut self, loader: F) -> bool
    where
        F: FnOnce() -> anyhow::Result<Box<dyn DetectionModel>>,
    {
        match self.state {
            DetectorState::Ready(_) => return true,
            DetectorState::Closed => {
                self.sink.record(&PipelineEvent::ModelLoadFailed {
                    error: "detector already closed".to_string(),
                });
                return false;
            }
            DetectorState::Uninitialized => {}
        }

        match panic::catch_unwind(AssertUnwindSafe(loader)) {
            Ok(Ok(model)) => {
                self.state = DetectorState::Ready(model);
                self.sink.record(&PipelineEvent::ModelLoaded);
                true
            }
            Ok(Err(err)) => {
                self.sink.record(&PipelineEvent::ModelLoadFailed {
                    error: format!("{:#}", err),
                });
                false
            }
            Err(payload) => {
                self.sink.record(&PipelineEvent::ModelLoadFailed {
                    error: panic_message(payload.as_ref()),
                });
                false
            }
        }
    }

    pub fn status(&self) -> DetectorStatus {
        match self.state {
            DetectorState::Uninitialized => DetectorStatus::Uninitialized,
            DetectorState::Ready(_) => DetectorStatus::Ready,
            DetectorState::Closed => DetectorStatus::Closed,
        }
    }

    /// 检测并估计尺寸. 置信度低于阈值的丢弃, 等于阈值的保留.
    pub fn detect(&mut self, image: &ConvertedImage, confidence_threshold: f32) -> Vec<AnnotatedDetection> {
        let DetectorState::Ready(model) = &mut self.state else {
            self.sink.record(&PipelineEvent::DetectorUnavailable);
            return Vec::new();
        };

        let start = Instant::now();
        let raw = match panic::catch_unwind(AssertUnwindSafe(|| model.detect(image))) {
            Ok(Ok(raw)) => raw,
            Ok(Err(err)) => {
                self.sink.record(&PipelineEvent::InferenceFailed {
                    error: format!("{:#}", err),
                });
                return Vec::new();
            }
            Err(payload) => {
                self.sink.record(&PipelineEvent::InferenceFailed {
                    error: panic_message(payload.as_ref()),
                });
                return Vec::new();
            }
        };
        self.sink.record(&PipelineEvent::Timing {
            stage: Stage::Inference,
            elapsed: start.elapsed(),
        });

        raw.into_iter()
            .filter_map(|r| annotate(r, image, confidence_threshold))
            .collect()
    }

    /// 释放模型句柄 (可重复调用)
    pub fn close(&mut self) {
        match std::mem::replace(&mut self.state, DetectorState::Closed) {
            DetectorState::Ready(mut model) => {
                model.close();
                self.sink.record(&PipelineEvent::Released {
                    component: "detector",
                });
            }
            DetectorState::Uninitialized | DetectorState::Closed => {}
        }
    }
}

/// 取最高分类别, 过滤阈值, 裁剪检测框并估计尺寸
fn annotate(raw: RawDetection, image: &ConvertedImage, threshold: f32) -> Option<AnnotatedDetection> {
    let (label, confidence) = match raw.top_category() {
        Some(c) => (c.label.clone(), c.score),
        None => (UNKNOWN_LABEL.to_string(), 0.0),
    };
    // NaN 分数也丢弃
    if !(confidence >= threshold) {
        return None;
    }

    let bbox = raw.bbox.clamp_to(image.width(), image.height());
    let size = estimate(&bbox, &label, image.width());
    Some(AnnotatedDetection {
        detection: Detection {
            label,
            confidence,
            bbox,
        },
        estimated_size: Some(size),
        image_width: image.width(),
        image_height: image.height(),
        rotation_degrees: image.rotation_degrees(),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic: <unknown>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{BoundingBox, Category};
    use crate::telemetry::MemorySink;
    use crate::test_support::{raw, Script, ScriptedModel};
    use std::sync::atomic::Ordering;

    fn image(width: u32, height: u32) -> ConvertedImage {
        ConvertedImage::from_rgb(width, height, 90, vec![0u8; (width * height * 3) as usize]).unwrap()
    }

    fn adapter_with(model: ScriptedModel) -> (DetectionAdapter, Arc<MemorySink>) {
        let sink = MemorySink::new();
        (DetectionAdapter::with_model(Box::new(model), sink.clone()), sink)
    }

    #[test]
    fn test_threshold_equal_kept_below_dropped() {
        let model = ScriptedModel::returning(vec![
            raw("cup", 0.49, (0.0, 0.0, 10.0, 10.0)),
            raw("bottle", 0.5, (0.0, 0.0, 10.0, 20.0)),
            raw("book", 0.51, (5.0, 5.0, 20.0, 30.0)),
        ]);
        let (mut adapter, _) = adapter_with(model);

        let out = adapter.detect(&image(64, 48), 0.5);
        let labels: Vec<&str> = out.iter().map(|d| d.detection.label.as_str()).collect();
        assert_eq!(labels, vec!["bottle", "book"]);
        assert_eq!(out[0].detection.confidence, 0.5);
        assert_eq!(out[0].image_width, 64);
        assert_eq!(out[0].image_height, 48);
        assert_eq!(out[0].rotation_degrees, 90);
        assert!(out[0].estimated_size.is_some());
    }

    #[test]
    fn test_uses_top_category_only() {
        let detection = RawDetection::new(
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            vec![
                Category::new("dog", 0.3),
                Category::new("cat", 0.7),
                Category::new("person", 0.7),
            ],
        );
        let (mut adapter, _) = adapter_with(ScriptedModel::returning(vec![detection]));
        let out = adapter.detect(&image(32, 32), 0.5);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].detection.label, "cat");
        // cat 先验 25×25
        let size = out[0].estimated_size.unwrap();
        assert!((size.width_cm - 25.0).abs() < 0.01);
    }

    #[test]
    fn test_nan_category_does_not_hide_detection() {
        let detection = RawDetection::new(
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            vec![Category::new("cat", 0.9), Category::new("dog", f32::NAN)],
        );
        let (mut adapter, _) = adapter_with(ScriptedModel::returning(vec![detection]));
        let out = adapter.detect(&image(32, 32), 0.5);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].detection.label, "cat");
        assert_eq!(out[0].detection.confidence, 0.9);
    }

    #[test]
    fn test_no_categories_is_unknown_with_zero_confidence() {
        let detection = RawDetection::new(BoundingBox::new(0.0, 0.0, 8.0, 8.0), vec![]);
        let (mut adapter, _) = adapter_with(ScriptedModel::returning(vec![detection]));

        assert!(adapter.detect(&image(16, 16), 0.5).is_empty());
        let out = adapter.detect(&image(16, 16), 0.0);
        assert_eq!(out[0].detection.label, "Unknown");
        assert_eq!(out[0].detection.confidence, 0.0);
    }

    #[test]
    fn test_boxes_clamped_to_image() {
        let model = ScriptedModel::returning(vec![raw("person", 0.9, (-20.0, -5.0, 700.0, 500.0))]);
        let (mut adapter, _) = adapter_with(model);
        let out = adapter.detect(&image(640, 480), 0.5);
        assert_eq!(out[0].detection.bbox, BoundingBox::new(0.0, 0.0, 640.0, 480.0));
    }

    #[test]
    fn test_not_ready_returns_empty() {
        let sink = MemorySink::new();
        let mut adapter = DetectionAdapter::new(sink.clone());
        assert_eq!(adapter.status(), DetectorStatus::Uninitialized);
        assert!(adapter.detect(&image(4, 4), 0.5).is_empty());
        assert_eq!(
            sink.count(|e| matches!(e, PipelineEvent::DetectorUnavailable)),
            1
        );
    }

    #[test]
    fn test_model_error_and_panic_are_caught() {
        let (mut failing, sink) = adapter_with(ScriptedModel::new(Script::Fail("tensor shape".into())));
        assert!(failing.detect(&image(4, 4), 0.5).is_empty());

        let (mut panicking, panic_sink) = adapter_with(ScriptedModel::new(Script::Panic));
        assert!(panicking.detect(&image(4, 4), 0.5).is_empty());
        // panic 后仍可继续调用
        assert!(panicking.detect(&image(4, 4), 0.5).is_empty());

        assert_eq!(
            sink.count(|e| matches!(e, PipelineEvent::InferenceFailed { error } if error.contains("tensor shape"))),
            1
        );
        assert_eq!(
            panic_sink.count(|e| matches!(e, PipelineEvent::InferenceFailed { error } if error.contains("scripted model panic"))),
            2
        );
    }

    #[test]
    fn test_load_and_close_lifecycle() {
        let sink = MemorySink::new();
        let mut adapter = DetectionAdapter::new(sink.clone());

        assert!(!adapter.load(|| Err(anyhow::anyhow!("asset missing"))));
        assert_eq!(adapter.status(), DetectorStatus::Uninitialized);

        let model = ScriptedModel::returning(vec![]);
        let closed = model.closed();
        assert!(adapter.load(move || Ok(Box::new(model) as Box<dyn DetectionModel>)));
        assert_eq!(adapter.status(), DetectorStatus::Ready);

        adapter.close();
        adapter.close();
        assert_eq!(adapter.status(), DetectorStatus::Closed);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(adapter.detect(&image(4, 4), 0.5).is_empty());
        assert!(!adapter.load(|| Ok(Box::new(ScriptedModel::returning(vec![])) as Box<dyn DetectionModel>)));

        assert_eq!(sink.count(|e| matches!(e, PipelineEvent::ModelLoadFailed { .. })), 2);
        assert_eq!(sink.count(|e| matches!(e, PipelineEvent::Released { .. })), 1);
    }
}
