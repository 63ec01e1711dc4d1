// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// GPU加速的 NV21 → RGB 转换 (使用wgpu)
/// 每个像素一个计算线程, 设备缓冲区按 (width, height) 复用

use super::buffer_pool::FrameBuffers;
use super::{nv21, Backend, ColorConversion};
use crate::error::ConvertError;
use crate::input::RawFrame;

/// GPU转换上下文
/// 设备、管线只创建一次; 尺寸变化时销毁旧缓冲区再创建
pub struct WgpuConverter {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    max_binding_size: u64,
    buffers: Option<GpuBuffers>,
}

/// 某一尺寸下的设备缓冲区
struct GpuBuffers {
    key: (u32, u32),
    params: wgpu::Buffer,
    input: wgpu::Buffer,
    output: wgpu::Buffer,
    readback: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    output_size: u64,
}

impl GpuBuffers {
    fn destroy(self) {
        self.params.destroy();
        self.input.destroy();
        self.output.destroy();
        self.readback.destroy();
    }
}

fn gpu_err(msg: impl std::fmt::Display) -> ConvertError {
    ConvertError::Accelerated(msg.to_string())
}

impl WgpuConverter {
    /// 探测GPU并编译着色器
    ///
    /// 注意: 使用pollster::block_on内部处理异步,外部是同步调用
    pub fn new() -> Result<Self, ConvertError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| gpu_err("无法找到合适的GPU"))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("NV21 Convert Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        ))
        .map_err(gpu_err)?;

        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("NV21 Convert Shader"),
            source: wgpu::ShaderSource::Wgsl(NV21_SHADER.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("NV21 Bind Group Layout"),
            entries: &[
                // 参数
                layout_entry(0, wgpu::BufferBindingType::Uniform),
                // NV21 输入
                layout_entry(1, wgpu::BufferBindingType::Storage { read_only: true }),
                // RGBA 输出
                layout_entry(2, wgpu::BufferBindingType::Storage { read_only: false }),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("NV21 Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("NV21 Compute Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader_module,
            entry_point: Some("nv21_to_rgb"),
            cache: None,
            compilation_options: Default::default(),
        });

        let max_binding_size = device.limits().max_storage_buffer_binding_size as u64;

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            max_binding_size,
            buffers: None,
        })
    }

    /// 按尺寸准备设备缓冲区
    fn ensure_buffers(&mut self, width: u32, height: u32) -> Result<(), ConvertError> {
        if matches!(&self.buffers, Some(b) if b.key == (width, height)) {
            return Ok(());
        }
        if let Some(old) = self.buffers.take() {
            old.destroy();
        }

        let input_size = nv21::staging_len(width, height) as u64;
        let output_size = width as u64 * height as u64 * 4;
        if output_size > self.max_binding_size || input_size > self.max_binding_size {
            return Err(gpu_err(format!(
                "帧尺寸 {}x{} 超出GPU缓冲区上限 {}",
                width, height, self.max_binding_size
            )));
        }

        let (chroma_width, _) = nv21::chroma_size(width, height);
        let params = Nv21Params {
            width,
            height,
            chroma_width: chroma_width as u32,
            luma_len: width * height,
        };

        let params_buffer = wgpu::util::DeviceExt::create_buffer_init(
            &self.device,
            &wgpu::util::BufferInitDescriptor {
                label: Some("NV21 Params Buffer"),
                contents: bytemuck::bytes_of(&params),
                usage: wgpu::BufferUsages::UNIFORM,
            },
        );

        let input = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("NV21 Input Buffer"),
            size: input_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let output = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("RGBA Output Buffer"),
            size: output_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("RGBA Readback Buffer"),
            size: output_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("NV21 Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: input.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: output.as_entire_binding(),
                },
            ],
        });

        self.buffers = Some(GpuBuffers {
            key: (width, height),
            params: params_buffer,
            input,
            output,
            readback,
            bind_group,
            output_size,
        });
        Ok(())
    }

    /// 上传暂存区, 执行计算并读回结果
    fn dispatch(&self, width: u32, height: u32, buffers: &mut FrameBuffers) -> Result<(), ConvertError> {
        let gpu = self
            .buffers
            .as_ref()
            .ok_or_else(|| gpu_err("GPU缓冲区未就绪"))?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        self.queue.write_buffer(&gpu.input, 0, &buffers.staging);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("NV21 Encoder"),
            });

        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("NV21 Compute Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.pipeline);
            compute_pass.set_bind_group(0, &gpu.bind_group, &[]);

            // 分组大小: 8x8 像素
            compute_pass.dispatch_workgroups(width.div_ceil(8), height.div_ceil(8), 1);
        }

        encoder.copy_buffer_to_buffer(&gpu.output, 0, &gpu.readback, 0, gpu.output_size);
        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = gpu.readback.slice(..);
        let (tx, rx) = futures::channel::oneshot::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        // 等待GPU完成
        self.device.poll(wgpu::Maintain::Wait);

        let mapped = pollster::block_on(rx)
            .map_err(|_| gpu_err("映射回调被取消"))
            .and_then(|r| r.map_err(gpu_err));
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(gpu_err(err));
        }
        mapped?;

        {
            // RGBA(u32) → 紧凑RGB
            let data = buffer_slice.get_mapped_range();
            let out = buffers.image.as_rgb_mut();
            for (dst, src) in out.chunks_exact_mut(3).zip(data.chunks_exact(4)) {
                dst.copy_from_slice(&src[..3]);
            }
        }
        gpu.readback.unmap();

        Ok(())
    }
}

impl ColorConversion for WgpuConverter {
    fn backend(&self) -> Backend {
        Backend::Gpu
    }

    fn convert(&mut self, frame: &RawFrame, buffers: &mut FrameBuffers) -> Result<(), ConvertError> {
        nv21::stage(frame, &mut buffers.staging)?;
        self.ensure_buffers(frame.width(), frame.height())?;
        let result = self.dispatch(frame.width(), frame.height(), buffers);
        if result.is_err() {
            // 失败后缓冲区状态未知, 下一帧重新创建
            self.release();
        }
        result
    }

    fn release(&mut self) {
        if let Some(old) = self.buffers.take() {
            old.destroy();
        }
    }
}

fn layout_entry(binding: u32, ty: wgpu::BufferBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// 参数结构 (16字节对齐)
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct Nv21Params {
    width: u32,
    height: u32,
    chroma_width: u32,
    luma_len: u32,
}

/// WGSL计算着色器
const NV21_SHADER: &str = r#"
struct Nv21Params {
    width: u32,
    height: u32,
    chroma_width: u32,
    luma_len: u32,
}

@group(0) @binding(0) var<uniform> params: Nv21Params;
@group(0) @binding(1) var<storage, read> src: array<u32>;
@group(0) @binding(2) var<storage, read_write> dst: array<u32>;

// 从打包的u32数组中读取一个字节
fn read_byte(idx: u32) -> i32 {
    let word = src[idx / 4u];
    let shift = (idx % 4u) * 8u;
    return i32((word >> shift) & 0xFFu);
}

fn to_channel(v: f32) -> u32 {
    return u32(clamp(i32(v), 0, 255));
}

@compute @workgroup_size(8, 8)
fn nv21_to_rgb(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let x = global_id.x;
    let y = global_id.y;

    if (x >= params.width || y >= params.height) {
        return;
    }

    let vu = params.luma_len + ((y / 2u) * params.chroma_width + (x / 2u)) * 2u;

    let y_adj = f32(read_byte(y * params.width + x) - 16);
    let v_adj = f32(read_byte(vu) - 128);
    let u_adj = f32(read_byte(vu + 1u) - 128);

    let r = to_channel(1.164 * y_adj + 1.596 * v_adj);
    let g = to_channel(1.164 * y_adj - 0.392 * u_adj - 0.813 * v_adj);
    let b = to_channel(1.164 * y_adj + 2.017 * u_adj);

    dst[y * params.width + x] = r | (g << 8u) | (b << 16u) | (255u << 24u);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::buffer_pool::BufferPool;
    use crate::convert::scalar::ScalarConverter;
    use crate::convert::ConvertedImage;
    use crate::test_support::{planar_frame, released_counter, semi_planar_frame, solid_frame};

    fn gradient_luma(row: usize, col: usize) -> u8 {
        (20 + row * 31 + col * 13) as u8
    }

    fn gradient_chroma(row: usize, col: usize) -> (u8, u8) {
        ((90 + row * 17 + col * 23) as u8, (170 - row * 19 - col * 7) as u8)
    }

    /// 没有可用GPU (CI等) 时返回 None
    fn gpu_or_skip() -> Option<WgpuConverter> {
        match WgpuConverter::new() {
            Ok(converter) => Some(converter),
            Err(err) => {
                eprintln!("⚠️ 跳过GPU测试: {}", err);
                None
            }
        }
    }

    fn run(converter: &mut dyn ColorConversion, frame: &RawFrame) -> ConvertedImage {
        let mut pool = BufferPool::new(true);
        pool.acquire(frame.width(), frame.height());
        converter.convert(frame, pool.buffers_mut()).unwrap();
        pool.image().clone()
    }

    /// GPU与CPU浮点截断可能差1
    fn assert_close(gpu: &ConvertedImage, scalar: &ConvertedImage) {
        assert_eq!(gpu.as_rgb().len(), scalar.as_rgb().len());
        for (i, (a, b)) in gpu.as_rgb().iter().zip(scalar.as_rgb()).enumerate() {
            assert!(a.abs_diff(*b) <= 1, "byte {i}: gpu {a} scalar {b}");
        }
    }

    #[test]
    fn test_gpu_matches_scalar_on_gradients() {
        let Some(mut gpu) = gpu_or_skip() else {
            return;
        };

        // 奇数尺寸后再换成偶数尺寸, 覆盖设备缓冲区重建
        for (w, h) in [(7, 5), (16, 12)] {
            let planar = planar_frame(w, h, 0, gradient_luma, gradient_chroma);
            let semi = semi_planar_frame(w, h, 0, gradient_luma, gradient_chroma);

            let expected = run(&mut ScalarConverter, &planar);
            let from_planar = run(&mut gpu, &planar);
            let from_semi = run(&mut gpu, &semi);

            assert_close(&from_planar, &expected);
            assert_eq!(from_planar, from_semi);
        }
    }

    #[test]
    fn test_gpu_solid_white() {
        let Some(mut gpu) = gpu_or_skip() else {
            return;
        };
        let released = released_counter();
        let image = run(&mut gpu, &solid_frame(8, 6, 0, &released));
        assert!(image.as_rgb().iter().all(|&c| c >= 253));

        gpu.release();
        gpu.release();
        // 释放后再次转换会重新创建缓冲区
        let image = run(&mut gpu, &solid_frame(8, 6, 100, &released));
        assert!(image.as_rgb().iter().all(|&c| c >= 253));
    }
}
