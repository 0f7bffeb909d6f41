// GPU-accelerated rendering using wgpu with raw Wayland surface
// Draws the image as a textured quad positioned by the view transform

use crate::image_loader::ImageAsset;
use crate::view::{DestRect, BACKGROUND_RGB};
use anyhow::{Context, Result};
use image::RgbaImage;
use log::{debug, info, warn};
use std::ptr::NonNull;
use wgpu::rwh::{
    RawDisplayHandle, RawWindowHandle, WaylandDisplayHandle, WaylandWindowHandle,
};
use wgpu::util::DeviceExt;

// Maximum surface size to prevent GPU memory issues
const MAX_SURFACE_SIZE: u32 = 4096;
const MAX_TEXTURE_SIZE: u32 = 8192;

pub struct WgpuRenderer {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    render_pipeline: wgpu::RenderPipeline,
    // Keeps the uploaded image alive for the bind group
    _texture: Option<wgpu::Texture>,
    texture_bind_group: Option<wgpu::BindGroup>,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    clear_color: wgpu::Color,
    width: u32,
    height: u32,
    max_texture_size: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    position: [f32; 3],
    tex_coords: [f32; 2],
}

impl Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

// Unit quad; the vertex shader stretches it over the destination rectangle
const VERTICES: &[Vertex] = &[
    Vertex {
        position: [0.0, 0.0, 0.0],
        tex_coords: [0.0, 0.0],
    }, // Top-left
    Vertex {
        position: [1.0, 0.0, 0.0],
        tex_coords: [1.0, 0.0],
    }, // Top-right
    Vertex {
        position: [1.0, 1.0, 0.0],
        tex_coords: [1.0, 1.0],
    }, // Bottom-right
    Vertex {
        position: [0.0, 1.0, 0.0],
        tex_coords: [0.0, 1.0],
    }, // Bottom-left
];

const INDICES: &[u16] = &[0, 1, 2, 0, 2, 3];

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Uniforms {
    /// Destination rectangle in clip space: left, top, right, bottom
    rect: [f32; 4],
}

/// Surface size for a requested window size, within device and safety limits
fn surface_size(width: u32, height: u32, max_texture_size: u32) -> (u32, u32) {
    let limit = MAX_SURFACE_SIZE.min(max_texture_size);
    (width.clamp(1, limit), height.clamp(1, limit))
}

/// Map a window-pixel rectangle to clip-space edges (y up)
fn rect_to_clip(rect: DestRect, width: u32, height: u32) -> [f32; 4] {
    let w = width.max(1) as f64;
    let h = height.max(1) as f64;
    let to_x = |px: f64| (px / w * 2.0 - 1.0) as f32;
    let to_y = |py: f64| (1.0 - py / h * 2.0) as f32;
    [
        to_x(rect.x as f64),
        to_y(rect.y as f64),
        to_x(rect.right() as f64),
        to_y(rect.bottom() as f64),
    ]
}

fn srgb_to_linear(c: u8) -> f64 {
    let c = c as f64 / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// Background clear color; sRGB targets expect linear values
fn background_color(srgb_target: bool) -> wgpu::Color {
    let channel = |c: u8| {
        if srgb_target {
            srgb_to_linear(c)
        } else {
            c as f64 / 255.0
        }
    };
    let [r, g, b] = BACKGROUND_RGB;
    wgpu::Color {
        r: channel(r),
        g: channel(g),
        b: channel(b),
        a: 1.0,
    }
}

impl WgpuRenderer {
    /// Create a new WgpuRenderer from raw Wayland display and surface pointers
    ///
    /// # Safety
    /// - `display_ptr` must be a valid pointer to a wl_display
    /// - `surface_ptr` must be a valid pointer to a wl_surface
    /// - The display and surface must remain valid for the lifetime of the renderer
    pub fn new(
        display_ptr: *mut std::ffi::c_void,
        surface_ptr: *mut std::ffi::c_void,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        info!("Initializing wgpu renderer with size {}x{}", width, height);

        let display_non_null = NonNull::new(display_ptr)
            .context("Display pointer is null")?;
        let surface_non_null = NonNull::new(surface_ptr)
            .context("Surface pointer is null")?;

        let raw_display_handle =
            RawDisplayHandle::Wayland(WaylandDisplayHandle::new(display_non_null));
        let raw_window_handle =
            RawWindowHandle::Wayland(WaylandWindowHandle::new(surface_non_null));

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::VULKAN | wgpu::Backends::GL,
            ..Default::default()
        });

        // Create surface from raw handles
        let surface = unsafe {
            instance.create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                raw_display_handle,
                raw_window_handle,
            })?
        };

        pollster::block_on(Self::init_async(surface, instance, width, height))
    }

    async fn init_async(
        surface: wgpu::Surface<'static>,
        instance: wgpu::Instance,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::LowPower,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("Failed to find an appropriate adapter")?;

        info!("Using adapter: {:?}", adapter.get_info());

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: None,
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .context("Failed to create device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        debug!("Surface capabilities: {:?}", surface_caps);

        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .context("Surface reports no supported formats")?;

        // The viewer paints every pixel, so prefer an opaque surface
        let alpha_mode = if surface_caps
            .alpha_modes
            .contains(&wgpu::CompositeAlphaMode::Opaque)
        {
            wgpu::CompositeAlphaMode::Opaque
        } else {
            surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto)
        };
        info!("Using surface format {:?}, alpha mode {:?}", surface_format, alpha_mode);

        // Get device limits
        let max_texture_size = adapter
            .limits()
            .max_texture_dimension_2d
            .min(MAX_TEXTURE_SIZE);
        info!("Max texture size: {}", max_texture_size);

        // Clamp dimensions to safe limits
        let (safe_width, safe_height) = surface_size(width, height, max_texture_size);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: safe_width,
            height: safe_height,
            present_mode: wgpu::PresentMode::Fifo, // VSync, stable
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        surface.configure(&device, &config);

        // Shader
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shader.wgsl").into()),
        });

        // Texture bind group layout
        let texture_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            multisampled: false,
                            view_dimension: wgpu::TextureViewDimension::D2,
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
                label: Some("texture_bind_group_layout"),
            });

        // Uniform bind group layout
        let uniform_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
                label: Some("uniform_bind_group_layout"),
            });

        // Uniform buffer
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Uniform Buffer"),
            contents: bytemuck::cast_slice(&[Uniforms {
                rect: [-1.0, 1.0, 1.0, -1.0],
            }]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &uniform_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
            label: Some("uniform_bind_group"),
        });

        let render_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Render Pipeline Layout"),
                bind_group_layouts: &[&texture_bind_group_layout, &uniform_bind_group_layout],
                push_constant_ranges: &[],
            });

        let render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Render Pipeline"),
            layout: Some(&render_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[Vertex::desc()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: config.format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                // Winding flips with the y axis; draw both faces
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
        });

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Vertex Buffer"),
            contents: bytemuck::cast_slice(VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Index Buffer"),
            contents: bytemuck::cast_slice(INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        Ok(Self {
            surface,
            device,
            queue,
            clear_color: background_color(config.format.is_srgb()),
            config,
            render_pipeline,
            _texture: None,
            texture_bind_group: None,
            vertex_buffer,
            index_buffer,
            uniform_buffer,
            uniform_bind_group,
            width: safe_width,
            height: safe_height,
            max_texture_size,
        })
    }

    pub fn resize(&mut self, new_width: u32, new_height: u32) {
        if new_width > 0 && new_height > 0 {
            // Clamp to safe limits to prevent broken pipe
            let (safe_width, safe_height) =
                surface_size(new_width, new_height, self.max_texture_size);

            if safe_width != self.width || safe_height != self.height {
                self.width = safe_width;
                self.height = safe_height;
                self.config.width = safe_width;
                self.config.height = safe_height;

                // Reconfigure surface with new size
                self.surface.configure(&self.device, &self.config);
                debug!("Resized to {}x{}", safe_width, safe_height);
            }
        }
    }

    /// Size of the configured surface, which frames are laid out in
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Upload the image as the display texture. The decoded pixels are
    /// released once the upload has been queued.
    pub fn upload_texture(&mut self, image: ImageAsset) -> Result<()> {
        let (orig_width, orig_height) = image.size();
        let mut pixels = RgbaImage::from_raw(orig_width, orig_height, image.rgba_data)
            .context("Pixel buffer does not match image dimensions")?;

        // Downscale images the device cannot hold in one texture
        if orig_width > self.max_texture_size || orig_height > self.max_texture_size {
            let scale = (self.max_texture_size as f32 / orig_width as f32)
                .min(self.max_texture_size as f32 / orig_height as f32);
            let new_width = ((orig_width as f32 * scale) as u32).clamp(1, self.max_texture_size);
            let new_height = ((orig_height as f32 * scale) as u32).clamp(1, self.max_texture_size);
            warn!(
                "Image {}x{} exceeds texture limit {}, downscaling to {}x{}",
                orig_width, orig_height, self.max_texture_size, new_width, new_height
            );
            pixels = image::imageops::resize(
                &pixels,
                new_width,
                new_height,
                image::imageops::FilterType::Triangle,
            );
        }

        let (tex_width, tex_height) = pixels.dimensions();
        debug!(
            "Uploading texture: {}x{} (source {}x{})",
            tex_width, tex_height, orig_width, orig_height
        );

        let texture_size = wgpu::Extent3d {
            width: tex_width,
            height: tex_height,
            depth_or_array_layers: 1,
        };

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            size: texture_size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            label: Some("image_texture"),
            view_formats: &[],
        });

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels.as_raw(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * tex_width),
                rows_per_image: Some(tex_height),
            },
            texture_size,
        );

        let texture_view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let texture_bind_group_layout = &self.render_pipeline.get_bind_group_layout(0);

        let texture_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: texture_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&texture_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
            label: Some("texture_bind_group"),
        });

        self._texture = Some(texture);
        self.texture_bind_group = Some(texture_bind_group);

        Ok(())
    }

    /// Render a frame with the image in `rect` and return whether it was presented
    pub fn render(&mut self, rect: DestRect) -> Result<bool> {
        let Some(texture_bind_group) = self.texture_bind_group.as_ref() else {
            return Ok(false); // No texture uploaded yet
        };

        let uniforms = Uniforms {
            rect: rect_to_clip(rect, self.width, self.height),
        };
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Timeout) => {
                debug!("Surface timeout, skipping frame");
                return Ok(false);
            }
            Err(wgpu::SurfaceError::Outdated) => {
                debug!("Surface outdated, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                return Ok(false);
            }
            Err(wgpu::SurfaceError::Lost) => {
                debug!("Surface lost, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                return Ok(false);
            }
            Err(e) => {
                warn!("Surface error: {:?}", e);
                return Err(e.into());
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            if !rect.is_empty() {
                render_pass.set_pipeline(&self.render_pipeline);
                render_pass.set_bind_group(0, texture_bind_group, &[]);
                render_pass.set_bind_group(1, &self.uniform_bind_group, &[]);
                render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
                render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
                render_pass.draw_indexed(0..INDICES.len() as u32, 0, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn full_window_rect_covers_clip_space() {
        let rect = DestRect { x: 0, y: 0, w: 800, h: 600 };
        let [l, t, r, b] = rect_to_clip(rect, 800, 600);
        assert_relative_eq!(l, -1.0);
        assert_relative_eq!(t, 1.0);
        assert_relative_eq!(r, 1.0);
        assert_relative_eq!(b, -1.0);
    }

    #[test]
    fn centred_rect_is_symmetric() {
        let rect = DestRect { x: 100, y: 50, w: 200, h: 100 };
        let [l, t, r, b] = rect_to_clip(rect, 400, 200);
        assert_relative_eq!(l, -0.5);
        assert_relative_eq!(r, 0.5);
        assert_relative_eq!(t, 0.5);
        assert_relative_eq!(b, -0.5);
    }

    #[test]
    fn oversized_window_is_clamped_to_surface_limit() {
        assert_eq!(surface_size(5120, 2880, 8192), (MAX_SURFACE_SIZE, 2880));
        assert_eq!(surface_size(5120, 2880, 2048), (2048, 2048));
        assert_eq!(surface_size(0, 0, 8192), (1, 1));
    }

    #[test]
    fn rect_laid_out_in_clamped_surface_is_centred() {
        use crate::view::ViewState;

        let (w, h) = surface_size(5120, 2880, 8192);
        let rect = ViewState::identity().dest_rect((1000, 500), (w, h));
        let [l, t, r, b] = rect_to_clip(rect, w, h);
        assert_relative_eq!(l, -r, epsilon = 1e-6);
        assert_relative_eq!(t, -b, epsilon = 1e-6);
    }

    #[test]
    fn offscreen_rect_stays_finite() {
        let rect = DestRect { x: i32::MIN, y: i32::MAX, w: i32::MAX, h: i32::MAX };
        assert!(rect_to_clip(rect, 0, 0).iter().all(|v| v.is_finite()));
    }

    #[test]
    fn background_is_dark_gray() {
        let plain = background_color(false);
        assert_relative_eq!(plain.r, 30.0 / 255.0);
        assert_relative_eq!(plain.g, plain.b);
        assert_relative_eq!(plain.a, 1.0);

        let linear = background_color(true);
        assert!(linear.r < plain.r);
        assert_relative_eq!(linear.r, 0.0129, epsilon = 1e-3);
    }
}
