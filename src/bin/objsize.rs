// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
// 单目物体尺寸估计 - 批量处理原始YUV帧文件
//
// 主程序入口 - 直接运行: cargo run --bin objsize --features onnx --release -- \
//     --model models/ssd_mobilenet_v1.onnx --width 640 --height 480 frames/
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use objsize_rs::input::LatestFrameQueue;
use objsize_rs::models::{DetectionModel, ModelConfig, SsdMobileNet};
use objsize_rs::telemetry::default_sink;
use objsize_rs::{
    DetectionAdapter, FrameOutcome, FrameWorker, Pipeline, PipelineConfig, Plane, RawFrame,
    RuntimeProfile,
};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// 帧文件的色度布局
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Layout {
    /// Y + U + V 三个独立平面
    I420,
    /// Y + 交错 UV (pixel stride 2)
    Nv12,
}

/// 单目物体尺寸估计程序
#[derive(Parser, Debug)]
#[command(author, version, about = "单目物体尺寸/距离估计", long_about = None)]
struct Args {
    /// 检测模型 (SSD-MobileNet ONNX)
    #[arg(short, long, default_value = "models/ssd_mobilenet_v1.onnx")]
    model: PathBuf,

    /// 帧文件或目录 (目录按文件名排序)
    #[arg(required = true)]
    frames: Vec<PathBuf>,

    /// 帧宽度
    #[arg(long)]
    width: u32,

    /// 帧高度
    #[arg(long)]
    height: u32,

    /// 传感器旋转角度
    #[arg(long, default_value_t = 0)]
    rotation: u32,

    /// 相邻帧时间间隔 (毫秒)
    #[arg(long, default_value_t = 100)]
    interval_ms: u64,

    /// 色度布局: i420 或 nv12
    #[arg(long, value_enum, default_value_t = Layout::I420)]
    layout: Layout,

    /// 运行档位: standard 或 constrained
    #[arg(long, default_value = "standard")]
    profile: RuntimeProfile,

    /// 流水线配置文件 (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// 保存最终使用的配置
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// 禁用GPU颜色转换
    #[arg(long)]
    no_gpu: bool,

    /// 模拟实时相机: 处理线程忙时只保留最新帧
    #[arg(long)]
    live: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path, args.profile),
        None => PipelineConfig::for_profile(args.profile),
    };
    if args.no_gpu {
        config.prefer_accelerated = false;
    }
    if let Some(path) = &args.save_config {
        config.save(path)?;
    }

    let files = collect_frames(&args.frames)?;
    if files.is_empty() {
        bail!("没有找到帧文件");
    }
    tracing::info!(
        "✅ 档位 {} | 节流 {}ms | 阈值 {:.2} | {} 帧",
        config.profile.name(),
        config.throttle_ms,
        config.confidence_threshold,
        files.len()
    );
    println!("📦 检测模型: {}", args.model.display());

    let sink = default_sink();
    let mut adapter = DetectionAdapter::new(sink.clone());
    let model_config = ModelConfig::new(&args.model);
    if !adapter.load(|| Ok(Box::new(SsdMobileNet::new(model_config)?) as Box<dyn DetectionModel>)) {
        bail!("模型加载失败: {}", args.model.display());
    }
    let pipeline = Pipeline::new(config, adapter, sink);

    // 输出 JSON lines
    let index = Arc::new(AtomicU64::new(0));
    let counter = index.clone();
    let print = move |outcome: FrameOutcome| {
        let n = counter.fetch_add(1, Ordering::Relaxed);
        let (status, detections) = match outcome {
            FrameOutcome::Throttled => ("throttled", Vec::new()),
            FrameOutcome::ConversionFailed(err) => {
                tracing::warn!(index = n, %err, "⚠️ 帧转换失败");
                ("conversion_failed", Vec::new())
            }
            FrameOutcome::Processed(detections) => ("processed", detections),
        };
        let line = serde_json::json!({
            "index": n,
            "status": status,
            "detections": detections,
        });
        println!("{}", line);
    };

    let (width, height, rotation) = (args.width, args.height, args.rotation);
    let stats = if args.live {
        let (sender, rx) = LatestFrameQueue::new().split();
        let handle = FrameWorker::spawn(pipeline, rx, print)?;
        for (i, path) in files.iter().enumerate() {
            let frame = read_frame(path, width, height, rotation, i as u64 * args.interval_ms, args.layout)?;
            if !sender.push(frame) {
                break;
            }
        }
        let evicted = sender.evicted();
        drop(sender);
        let stats = handle.join().map_err(|_| anyhow::anyhow!("处理线程panic"))?;
        tracing::info!(evicted, "⏭️ 实时模式丢弃的旧帧");
        stats
    } else {
        let (tx, rx) = crossbeam_channel::bounded(2);
        let handle = FrameWorker::spawn(pipeline, rx, print)?;
        for (i, path) in files.iter().enumerate() {
            let frame = read_frame(path, width, height, rotation, i as u64 * args.interval_ms, args.layout)?;
            if tx.send(frame).is_err() {
                break;
            }
        }
        drop(tx);
        handle.join().map_err(|_| anyhow::anyhow!("处理线程panic"))?
    };

    tracing::info!(
        "📺 完成: 总帧{} | 节流{} | 处理{} | 失败{} | 检测{}",
        stats.seen,
        stats.throttled,
        stats.converted,
        stats.failed,
        stats.detections
    );
    Ok(())
}

/// 展开目录, 保持命令行顺序
fn collect_frames(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(input)
                .with_context(|| format!("无法读取目录 {}", input.display()))?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.is_file())
                .collect();
            entries.sort();
            files.extend(entries);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}

/// 读取一帧原始YUV420数据
fn read_frame(
    path: &Path,
    width: u32,
    height: u32,
    rotation: u32,
    timestamp_ms: u64,
    layout: Layout,
) -> Result<RawFrame> {
    let data = std::fs::read(path).with_context(|| format!("无法读取帧文件 {}", path.display()))?;
    let (w, h) = (width as usize, height as usize);
    let (cw, ch) = ((w + 1) / 2, (h + 1) / 2);
    let luma_len = w * h;
    let expected = luma_len + cw * ch * 2;
    if data.len() < expected {
        bail!(
            "帧文件 {} 长度 {} 小于 {}x{} 所需的 {}",
            path.display(),
            data.len(),
            width,
            height,
            expected
        );
    }

    let y = Plane::new(data[..luma_len].to_vec(), w, 1);
    let (u, v) = match layout {
        Layout::I420 => {
            let u_end = luma_len + cw * ch;
            (
                Plane::new(data[luma_len..u_end].to_vec(), cw, 1),
                Plane::new(data[u_end..expected].to_vec(), cw, 1),
            )
        }
        Layout::Nv12 => (
            Plane::new(data[luma_len..expected - 1].to_vec(), cw * 2, 2),
            Plane::new(data[luma_len + 1..expected].to_vec(), cw * 2, 2),
        ),
    };

    let name = path.display().to_string();
    Ok(
        RawFrame::new(width, height, rotation, timestamp_ms, [y, u, v]).with_release(move || {
            tracing::trace!(frame = %name, "🧹 帧已释放");
        }),
    )
}
