// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 测试辅助: 合成YUV帧、脚本化检测模型

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::convert::ConvertedImage;
use crate::detection::{BoundingBox, Category, RawDetection};
use crate::input::{Plane, RawFrame};
use crate::models::DetectionModel;

pub fn released_counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

fn with_counter(frame: RawFrame, released: &Arc<AtomicUsize>) -> RawFrame {
    let counter = released.clone();
    frame.with_release(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

/// 纯色全平面帧 (pixel stride 1), Y=235 U=V=128 (白色)
pub fn solid_frame(
    width: u32,
    height: u32,
    timestamp_ms: u64,
    released: &Arc<AtomicUsize>,
) -> RawFrame {
    let frame = planar_frame(width, height, timestamp_ms, |_, _| 235, |_, _| (128, 128));
    with_counter(frame, released)
}

/// 全平面布局 (I420): U、V 各自独立, pixel stride 1
pub fn planar_frame(
    width: u32,
    height: u32,
    timestamp_ms: u64,
    luma: impl Fn(usize, usize) -> u8,
    chroma: impl Fn(usize, usize) -> (u8, u8),
) -> RawFrame {
    let (w, h) = (width as usize, height as usize);
    let (cw, ch) = ((w + 1) / 2, (h + 1) / 2);

    let mut y = Vec::with_capacity(w * h);
    for row in 0..h {
        for col in 0..w {
            y.push(luma(row, col));
        }
    }

    let mut u = Vec::with_capacity(cw * ch);
    let mut v = Vec::with_capacity(cw * ch);
    for row in 0..ch {
        for col in 0..cw {
            let (cu, cv) = chroma(row, col);
            u.push(cu);
            v.push(cv);
        }
    }

    RawFrame::new(
        width,
        height,
        0,
        timestamp_ms,
        [
            Plane::new(y, w, 1),
            Plane::new(u, cw, 1),
            Plane::new(v, cw, 1),
        ],
    )
}

/// 半平面布局: U 平面为 U,V,U,V..., V 平面为 V,U,V,U..., pixel stride 2.
/// 两个平面共享同一段交错内存 (错开一个字节), 与相机常见输出一致.
pub fn semi_planar_frame(
    width: u32,
    height: u32,
    timestamp_ms: u64,
    luma: impl Fn(usize, usize) -> u8,
    chroma: impl Fn(usize, usize) -> (u8, u8),
) -> RawFrame {
    let (w, h) = (width as usize, height as usize);
    let (cw, ch) = ((w + 1) / 2, (h + 1) / 2);
    let row_stride = cw * 2;

    let mut y = Vec::with_capacity(w * h);
    for row in 0..h {
        for col in 0..w {
            y.push(luma(row, col));
        }
    }

    let mut uv = Vec::with_capacity(row_stride * ch);
    for row in 0..ch {
        for col in 0..cw {
            let (cu, cv) = chroma(row, col);
            uv.push(cu);
            uv.push(cv);
        }
    }
    // 相机缓冲区在最后一个样本处截断
    let u_plane = uv[..uv.len() - 1].to_vec();
    let v_plane = uv[1..].to_vec();

    RawFrame::new(
        width,
        height,
        0,
        timestamp_ms,
        [
            Plane::new(y, w, 1),
            Plane::new(u_plane, row_stride, 2),
            Plane::new(v_plane, row_stride, 2),
        ],
    )
}

pub fn counted(frame: RawFrame, released: &Arc<AtomicUsize>) -> RawFrame {
    with_counter(frame, released)
}

/// 脚本化的检测模型
#[derive(Clone)]
pub enum Script {
    Detections(Vec<RawDetection>),
    Fail(String),
    Panic,
}

pub struct ScriptedModel {
    script: Script,
    calls: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl ScriptedModel {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            calls: released_counter(),
            closed: released_counter(),
        }
    }

    pub fn returning(detections: Vec<RawDetection>) -> Self {
        Self::new(Script::Detections(detections))
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    pub fn closed(&self) -> Arc<AtomicUsize> {
        self.closed.clone()
    }
}

impl DetectionModel for ScriptedModel {
    fn detect(&mut self, _image: &ConvertedImage) -> anyhow::Result<Vec<RawDetection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Detections(detections) => Ok(detections.clone()),
            Script::Fail(msg) => Err(anyhow::anyhow!("{}", msg)),
            Script::Panic => panic!("scripted model panic"),
        }
    }

    fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn raw(label: &str, score: f32, bbox: (f32, f32, f32, f32)) -> RawDetection {
    RawDetection::new(
        BoundingBox::new(bbox.0, bbox.1, bbox.2, bbox.3),
        vec![Category::new(label, score)],
    )
}
