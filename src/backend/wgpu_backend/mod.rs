//! wgpu backend
//!
//! Executes recorded command lists against a wgpu device: render targets are
//! real textures, blit commands run through a cached fullscreen pipeline per
//! pass/format/blend combination, and geometry commands are resolved by an
//! optional [`DrawDelegate`] supplying pre-recorded render bundles.

mod shaders;

use crate::backend::command::{
    Attachment, CommandList, FrameCommand, GlobalParam, ParamValue, PostPass, TargetRef,
};
use crate::backend::traits::{
    BackendError, BackendResult, DisplayInfo, GraphicsBackend, TargetId,
};
use crate::backend::types::{
    BlendFactor, DepthConvention, FilterMode, FinalBlendMode, LoadAction, Rect, StoreAction,
    TargetDesc, TextureFormat,
};
use crate::settings::{CascadeBlendMode, FxaaQuality, ShadowFilter, ShadowmaskMode};
use crate::submit::DrawRequest;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use std::collections::HashMap;
use std::sync::Arc;

/// Attachment formats of the pass a render bundle executes in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassFormats {
    pub color: Option<wgpu::TextureFormat>,
    pub depth: Option<wgpu::TextureFormat>,
}

/// Per-draw state snapshot handed to the draw delegate
#[derive(Debug, Clone, Copy)]
pub struct DelegateContext {
    pub view: Mat4,
    pub projection: Mat4,
    pub slope_scale_bias: f32,
    pub formats: PassFormats,
}

/// Host hook that turns recorded geometry commands into GPU work.
///
/// Draw-call batching stays in the host engine; it hands back render
/// bundles compatible with the pass formats in the context.
pub trait DrawDelegate {
    fn geometry(
        &mut self,
        device: &wgpu::Device,
        ctx: &DelegateContext,
        request: &DrawRequest,
    ) -> Vec<wgpu::RenderBundle>;

    fn skybox(&mut self, device: &wgpu::Device, ctx: &DelegateContext)
        -> Option<wgpu::RenderBundle>;

    fn shadow_casters(
        &mut self,
        device: &wgpu::Device,
        ctx: &DelegateContext,
        visible_light: usize,
        cascade: usize,
        cull_factor: f32,
    ) -> Vec<wgpu::RenderBundle>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    pass: PostPass,
    format: wgpu::TextureFormat,
    blend: Option<FinalBlendMode>,
}

struct StoredTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    desc: TargetDesc,
}

/// Uniform block backing the built-in post-effect kernels; layout mirrors
/// `PostFxUniform` in the WGSL module.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct PostFxUniform {
    bloom_threshold: Vec4,
    color_adjustments: Vec4,
    color_filter: Vec4,
    white_balance: Vec4,
    split_shadows: Vec4,
    split_highlights: Vec4,
    mixer_red: Vec4,
    mixer_green: Vec4,
    mixer_blue: Vec4,
    smh_shadows: Vec4,
    smh_midtones: Vec4,
    smh_highlights: Vec4,
    smh_range: Vec4,
    lut_parameters: Vec4,
    fxaa_config: Vec4,
    buffer_size: Vec4,
    misc: Vec4,
}

/// Shadow shader variant currently selected (available to delegates)
#[derive(Debug, Clone, Copy)]
pub struct ShadowVariant {
    pub filter: ShadowFilter,
    pub blend: CascadeBlendMode,
    pub mask: Option<ShadowmaskMode>,
}

impl Default for ShadowVariant {
    fn default() -> Self {
        Self {
            filter: ShadowFilter::Pcf2x2,
            blend: CascadeBlendMode::Hard,
            mask: None,
        }
    }
}

// Planned execution steps produced before any wgpu pass is open
enum Step {
    Begin {
        color: Option<(TargetRef, LoadAction, StoreAction)>,
        depth: Option<(TargetRef, LoadAction, StoreAction)>,
    },
    End,
    Viewport(Rect),
    Blit {
        key: PipelineKey,
        group: usize,
    },
    Bundles(usize),
    Copy {
        source: TargetRef,
        destination: TargetRef,
    },
}

/// wgpu implementation of [`GraphicsBackend`]
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    surface: wgpu::Surface<'static>,
    #[allow(dead_code)]
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_config: wgpu::SurfaceConfiguration,

    current_texture: Option<wgpu::SurfaceTexture>,
    display_view: Option<wgpu::TextureView>,
    display_depth_view: wgpu::TextureView,
    encoder: Option<wgpu::CommandEncoder>,

    targets: HashMap<u64, StoredTarget>,
    next_target_id: u64,

    linear_sampler: wgpu::Sampler,
    nearest_sampler: wgpu::Sampler,
    dummy_view: wgpu::TextureView,
    shader_module: wgpu::ShaderModule,
    shader_overrides: HashMap<PostPass, wgpu::ShaderModule>,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,

    globals: HashMap<GlobalParam, ParamValue>,
    shadow_variant: ShadowVariant,
    fxaa_quality: FxaaQuality,
    delegate: Option<Box<dyn DrawDelegate>>,
}

impl WgpuBackend {
    /// Create a backend presenting to the given window
    pub fn new(window: Arc<winit::window::Window>, vsync: bool) -> BackendResult<Self> {
        pollster::block_on(Self::new_async(window, vsync))
    }

    async fn new_async(window: Arc<winit::window::Window>, vsync: bool) -> BackendResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());

        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BackendError::InitializationFailed("no suitable adapter".into()))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "selected GPU: {} ({:?} backend)",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Frame Renderer Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or(surface_caps.formats[0]);

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: if vsync {
                wgpu::PresentMode::AutoVsync
            } else {
                wgpu::PresentMode::AutoNoVsync
            },
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let display_depth_view =
            Self::create_display_depth(&device, surface_config.width, surface_config.height);

        let clamp_sampler = |filter: wgpu::FilterMode| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("PostFx Sampler"),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                address_mode_w: wgpu::AddressMode::ClampToEdge,
                mag_filter: filter,
                min_filter: filter,
                ..Default::default()
            })
        };
        let linear_sampler = clamp_sampler(wgpu::FilterMode::Linear);
        let nearest_sampler = clamp_sampler(wgpu::FilterMode::Nearest);

        let dummy = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Dummy Binding"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let dummy_view = dummy.create_view(&wgpu::TextureViewDescriptor::default());

        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("PostFx Shaders"),
            source: wgpu::ShaderSource::Wgsl(shaders::POSTFX_SHADER.into()),
        });

        let texture_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("PostFx Bindings"),
                entries: &[
                    texture_entry(0),
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    texture_entry(3),
                    texture_entry(4),
                ],
            });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("PostFx Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        Ok(Self {
            instance,
            surface,
            adapter,
            device,
            queue,
            surface_config,
            current_texture: None,
            display_view: None,
            display_depth_view,
            encoder: None,
            targets: HashMap::new(),
            next_target_id: 1,
            linear_sampler,
            nearest_sampler,
            dummy_view,
            shader_module,
            shader_overrides: HashMap::new(),
            bind_group_layout,
            pipeline_layout,
            pipelines: HashMap::new(),
            globals: HashMap::new(),
            shadow_variant: ShadowVariant::default(),
            fxaa_quality: FxaaQuality::Medium,
            delegate: None,
        })
    }

    fn create_display_depth(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Display Depth"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Depth32Float,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    /// Install the host's geometry draw hook
    pub fn set_delegate(&mut self, delegate: Box<dyn DrawDelegate>) {
        self.delegate = Some(delegate);
    }

    /// Replace the built-in kernel of one post pass with host WGSL
    pub fn set_post_shader(&mut self, pass: PostPass, wgsl: &str) {
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("PostFx Override"),
            source: wgpu::ShaderSource::Wgsl(wgsl.into()),
        });
        self.shader_overrides.insert(pass, module);
        self.pipelines.retain(|key, _| key.pass != pass);
    }

    /// Currently selected shadow shader variant
    pub fn shadow_variant(&self) -> ShadowVariant {
        self.shadow_variant
    }

    /// Currently selected FXAA quality tier
    pub fn fxaa_quality(&self) -> FxaaQuality {
        self.fxaa_quality
    }

    /// Last value bound to a global parameter slot
    pub fn global(&self, param: GlobalParam) -> Option<&ParamValue> {
        self.globals.get(&param)
    }

    /// Resize the swapchain
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.surface_config.width = width;
            self.surface_config.height = height;
            self.surface.configure(&self.device, &self.surface_config);
            self.display_depth_view = Self::create_display_depth(&self.device, width, height);
        }
    }

    pub fn surface_size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    fn convert_format(format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
            TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            TextureFormat::Depth32Float | TextureFormat::Shadowmap => {
                wgpu::TextureFormat::Depth32Float
            }
        }
    }

    fn convert_blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
        match factor {
            BlendFactor::Zero => wgpu::BlendFactor::Zero,
            BlendFactor::One => wgpu::BlendFactor::One,
            BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
            BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
            BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
            BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
        }
    }

    fn convert_blend(blend: FinalBlendMode) -> wgpu::BlendState {
        let component = wgpu::BlendComponent {
            src_factor: Self::convert_blend_factor(blend.source),
            dst_factor: Self::convert_blend_factor(blend.destination),
            operation: wgpu::BlendOperation::Add,
        };
        wgpu::BlendState {
            color: component,
            alpha: component,
        }
    }

    fn fragment_entry(pass: PostPass) -> &'static str {
        match pass {
            PostPass::Copy => "fs_copy",
            PostPass::BloomPrefilter => "fs_bloom_prefilter",
            PostPass::BloomPrefilterFireflies => "fs_bloom_prefilter_fireflies",
            PostPass::BloomHorizontal => "fs_bloom_horizontal",
            PostPass::BloomVertical => "fs_bloom_vertical",
            PostPass::BloomAdd => "fs_bloom_add",
            PostPass::BloomScatter => "fs_bloom_scatter",
            PostPass::BloomScatterFinal => "fs_bloom_scatter_final",
            PostPass::ColorGradingNone => "fs_grading_none",
            PostPass::ColorGradingAces => "fs_grading_aces",
            PostPass::ColorGradingNeutral => "fs_grading_neutral",
            PostPass::ColorGradingReinhard => "fs_grading_reinhard",
            PostPass::ApplyColorGrading => "fs_apply_grading",
            PostPass::ApplyColorGradingWithLuma => "fs_apply_grading_luma",
            PostPass::Fxaa | PostPass::FxaaWithLuma => "fs_fxaa",
            PostPass::FinalRescale => "fs_final_rescale",
        }
    }

    fn ensure_pipeline(&mut self, key: PipelineKey) {
        if self.pipelines.contains_key(&key) {
            return;
        }
        let module = self
            .shader_overrides
            .get(&key.pass)
            .unwrap_or(&self.shader_module);
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("PostFx Pipeline"),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: shaders::VS_ENTRY,
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: Self::fragment_entry(key.pass),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: key.format,
                        blend: key.blend.map(Self::convert_blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            });
        self.pipelines.insert(key, pipeline);
    }

    fn target_format(&self, target: TargetRef) -> BackendResult<wgpu::TextureFormat> {
        match target {
            TargetRef::Display => Ok(self.surface_config.format),
            TargetRef::Temporary(id) => self
                .targets
                .get(&id.0)
                .map(|t| Self::convert_format(t.desc.format))
                .ok_or(BackendError::UnknownTarget(id)),
        }
    }

    fn sampled_view(&self, target: TargetRef) -> &wgpu::TextureView {
        match target {
            TargetRef::Display => {
                log::warn!("the display target cannot be sampled, binding a dummy");
                &self.dummy_view
            }
            TargetRef::Temporary(id) => self
                .targets
                .get(&id.0)
                .map(|t| &t.view)
                .unwrap_or(&self.dummy_view),
        }
    }

    fn global_texture_view(&self, param: GlobalParam) -> &wgpu::TextureView {
        match self.globals.get(&param) {
            Some(ParamValue::Texture(target)) => self.sampled_view(*target),
            _ => &self.dummy_view,
        }
    }

    fn global_vec4(&self, param: GlobalParam) -> Vec4 {
        match self.globals.get(&param) {
            Some(ParamValue::Vec4(v)) => *v,
            _ => Vec4::ZERO,
        }
    }

    fn global_float(&self, param: GlobalParam) -> f32 {
        match self.globals.get(&param) {
            Some(ParamValue::Float(v)) => *v,
            _ => 0.0,
        }
    }

    fn pack_uniform(&self) -> PostFxUniform {
        PostFxUniform {
            bloom_threshold: self.global_vec4(GlobalParam::BloomThreshold),
            color_adjustments: self.global_vec4(GlobalParam::ColorAdjustments),
            color_filter: self.global_vec4(GlobalParam::ColorFilter),
            white_balance: self.global_vec4(GlobalParam::WhiteBalance),
            split_shadows: self.global_vec4(GlobalParam::SplitToningShadows),
            split_highlights: self.global_vec4(GlobalParam::SplitToningHighlights),
            mixer_red: self.global_vec4(GlobalParam::ChannelMixerRed),
            mixer_green: self.global_vec4(GlobalParam::ChannelMixerGreen),
            mixer_blue: self.global_vec4(GlobalParam::ChannelMixerBlue),
            smh_shadows: self.global_vec4(GlobalParam::SmhShadows),
            smh_midtones: self.global_vec4(GlobalParam::SmhMidtones),
            smh_highlights: self.global_vec4(GlobalParam::SmhHighlights),
            smh_range: self.global_vec4(GlobalParam::SmhRange),
            lut_parameters: self.global_vec4(GlobalParam::ColorGradingLutParameters),
            fxaa_config: self.global_vec4(GlobalParam::FxaaConfig),
            buffer_size: self.global_vec4(GlobalParam::BufferSize),
            misc: Vec4::new(
                self.global_float(GlobalParam::BloomIntensity),
                self.global_float(GlobalParam::BloomBicubicUpsampling),
                self.global_float(GlobalParam::CopyBicubic),
                self.global_float(GlobalParam::ColorGradingLutInLogC),
            ),
        }
    }

    fn create_blit_group(&self, source: TargetRef) -> wgpu::BindGroup {
        use wgpu::util::DeviceExt;
        let uniform = self.pack_uniform();
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("PostFx Params"),
                contents: bytemuck::bytes_of(&uniform),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let sampler = match source {
            TargetRef::Temporary(id) => match self.targets.get(&id.0) {
                Some(target) if target.desc.filter == FilterMode::Nearest => {
                    &self.nearest_sampler
                }
                _ => &self.linear_sampler,
            },
            TargetRef::Display => &self.linear_sampler,
        };
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("PostFx Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(self.sampled_view(source)),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(
                        self.global_texture_view(GlobalParam::PostFxSource2),
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(
                        self.global_texture_view(GlobalParam::ColorGradingLut),
                    ),
                },
            ],
        })
    }

    fn attachment_formats(
        &self,
        color: Option<&Attachment>,
        depth: Option<&Attachment>,
    ) -> PassFormats {
        let color = color.map(|a| {
            self.target_format(a.target)
                .unwrap_or(self.surface_config.format)
        });
        let depth = depth.map(|a| match a.target {
            TargetRef::Display => wgpu::TextureFormat::Depth32Float,
            TargetRef::Temporary(id) => self
                .targets
                .get(&id.0)
                .map(|t| Self::convert_format(t.desc.format))
                .unwrap_or(wgpu::TextureFormat::Depth32Float),
        });
        PassFormats { color, depth }
    }

    fn attachment_view(&self, target: TargetRef, depth: bool) -> BackendResult<&wgpu::TextureView> {
        match target {
            TargetRef::Display if depth => Ok(&self.display_depth_view),
            TargetRef::Display => self
                .display_view
                .as_ref()
                .ok_or_else(|| BackendError::AcquireImageFailed("no frame in flight".into())),
            TargetRef::Temporary(id) => self
                .targets
                .get(&id.0)
                .map(|t| &t.view)
                .ok_or(BackendError::UnknownTarget(id)),
        }
    }

    fn color_load_op(load: LoadAction) -> wgpu::LoadOp<wgpu::Color> {
        match load {
            LoadAction::Clear([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: r as f64,
                g: g as f64,
                b: b as f64,
                a: a as f64,
            }),
            LoadAction::Load => wgpu::LoadOp::Load,
            // wgpu has no don't-care load; a clear is the cheapest fallback
            LoadAction::DontCare => wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
        }
    }

    fn depth_load_op(load: LoadAction) -> wgpu::LoadOp<f32> {
        match load {
            LoadAction::Clear([depth, ..]) => wgpu::LoadOp::Clear(depth),
            LoadAction::Load => wgpu::LoadOp::Load,
            LoadAction::DontCare => wgpu::LoadOp::Clear(1.0),
        }
    }

    fn store_op(store: StoreAction) -> wgpu::StoreOp {
        match store {
            StoreAction::Store => wgpu::StoreOp::Store,
            StoreAction::Discard => wgpu::StoreOp::Discard,
        }
    }

    /// Build the execution plan: allocate pipelines, bind groups and render
    /// bundles so the recording phase only borrows immutably.
    fn plan(
        &mut self,
        list: &CommandList,
    ) -> BackendResult<(Vec<Step>, Vec<wgpu::BindGroup>, Vec<Vec<wgpu::RenderBundle>>)> {
        let mut steps = Vec::new();
        let mut groups: Vec<wgpu::BindGroup> = Vec::new();
        let mut bundle_sets: Vec<Vec<wgpu::RenderBundle>> = Vec::new();

        let mut in_pass = false;
        let mut ctx = DelegateContext {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            slope_scale_bias: 0.0,
            formats: PassFormats {
                color: None,
                depth: None,
            },
        };

        for command in list.commands() {
            match command {
                FrameCommand::SetRenderTarget { color, depth } => {
                    if in_pass {
                        steps.push(Step::End);
                    }
                    ctx.formats = self.attachment_formats(color.as_ref(), depth.as_ref());
                    steps.push(Step::Begin {
                        color: color.as_ref().map(|a| (a.target, a.load, a.store)),
                        depth: depth.as_ref().map(|a| (a.target, a.load, a.store)),
                    });
                    in_pass = true;
                }
                FrameCommand::SetViewport(rect) => {
                    if in_pass {
                        steps.push(Step::Viewport(*rect));
                    }
                }
                FrameCommand::SetViewProjection { view, projection } => {
                    ctx.view = *view;
                    ctx.projection = *projection;
                }
                FrameCommand::SetDepthBias { slope_scale, .. } => {
                    ctx.slope_scale_bias = *slope_scale;
                }
                FrameCommand::SetGlobal { param, value } => {
                    self.globals.insert(*param, value.clone());
                }
                FrameCommand::SetShadowVariant { filter, blend, mask } => {
                    self.shadow_variant = ShadowVariant {
                        filter: *filter,
                        blend: *blend,
                        mask: *mask,
                    };
                }
                FrameCommand::SetFxaaQuality(quality) => {
                    self.fxaa_quality = *quality;
                }
                FrameCommand::Blit {
                    source,
                    destination,
                    pass,
                } => {
                    if in_pass {
                        steps.push(Step::End);
                        in_pass = false;
                    }
                    let key = PipelineKey {
                        pass: *pass,
                        format: self.target_format(*destination)?,
                        blend: None,
                    };
                    self.ensure_pipeline(key);
                    groups.push(self.create_blit_group(*source));
                    steps.push(Step::Begin {
                        color: Some((*destination, LoadAction::DontCare, StoreAction::Store)),
                        depth: None,
                    });
                    steps.push(Step::Blit {
                        key,
                        group: groups.len() - 1,
                    });
                    steps.push(Step::End);
                }
                FrameCommand::FinalDraw {
                    source,
                    pass,
                    viewport,
                    load,
                    blend,
                } => {
                    if in_pass {
                        steps.push(Step::End);
                        in_pass = false;
                    }
                    let key = PipelineKey {
                        pass: *pass,
                        format: self.surface_config.format,
                        blend: Some(*blend),
                    };
                    self.ensure_pipeline(key);
                    groups.push(self.create_blit_group(*source));
                    steps.push(Step::Begin {
                        color: Some((TargetRef::Display, *load, StoreAction::Store)),
                        depth: None,
                    });
                    steps.push(Step::Viewport(*viewport));
                    steps.push(Step::Blit {
                        key,
                        group: groups.len() - 1,
                    });
                    steps.push(Step::End);
                }
                FrameCommand::CopyTexture {
                    source,
                    destination,
                } => {
                    if in_pass {
                        steps.push(Step::End);
                        in_pass = false;
                    }
                    steps.push(Step::Copy {
                        source: *source,
                        destination: *destination,
                    });
                }
                FrameCommand::DrawGeometry(request) => {
                    if let Some(delegate) = self.delegate.as_mut() {
                        let bundles = delegate.geometry(&self.device, &ctx, request);
                        bundle_sets.push(bundles);
                        steps.push(Step::Bundles(bundle_sets.len() - 1));
                    } else {
                        log::trace!("no draw delegate installed, skipping geometry");
                    }
                }
                FrameCommand::DrawSkybox => {
                    if let Some(delegate) = self.delegate.as_mut() {
                        if let Some(bundle) = delegate.skybox(&self.device, &ctx) {
                            bundle_sets.push(vec![bundle]);
                            steps.push(Step::Bundles(bundle_sets.len() - 1));
                        }
                    }
                }
                FrameCommand::DrawShadowCasters {
                    visible_light,
                    cascade,
                    cull_factor,
                } => {
                    if let Some(delegate) = self.delegate.as_mut() {
                        let bundles = delegate.shadow_casters(
                            &self.device,
                            &ctx,
                            *visible_light,
                            *cascade,
                            *cull_factor,
                        );
                        bundle_sets.push(bundles);
                        steps.push(Step::Bundles(bundle_sets.len() - 1));
                    }
                }
            }
        }
        if in_pass {
            steps.push(Step::End);
        }

        Ok((steps, groups, bundle_sets))
    }
}

impl GraphicsBackend for WgpuBackend {
    fn create_target(&mut self, desc: &TargetDesc) -> BackendResult<TargetId> {
        let format = Self::convert_format(desc.format);
        let usage = wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST;

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Frame Target"),
            size: wgpu::Extent3d {
                width: desc.width.max(1),
                height: desc.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let id = self.next_target_id;
        self.next_target_id += 1;
        self.targets.insert(
            id,
            StoredTarget {
                texture,
                view,
                desc: *desc,
            },
        );
        Ok(TargetId(id))
    }

    fn destroy_target(&mut self, target: TargetId) {
        self.targets.remove(&target.0);
    }

    fn begin_frame(&mut self) -> BackendResult<DisplayInfo> {
        let output = self.surface.get_current_texture().map_err(|e| match e {
            wgpu::SurfaceError::Lost => BackendError::SurfaceLost,
            wgpu::SurfaceError::OutOfMemory => BackendError::OutOfMemory,
            _ => BackendError::AcquireImageFailed(e.to_string()),
        })?;

        self.display_view = Some(
            output
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default()),
        );
        self.current_texture = Some(output);
        self.encoder = Some(
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Frame Encoder"),
                }),
        );

        Ok(DisplayInfo {
            width: self.surface_config.width,
            height: self.surface_config.height,
            hdr: false,
        })
    }

    fn execute(&mut self, list: &CommandList) -> BackendResult<()> {
        let (steps, groups, bundle_sets) = self.plan(list)?;

        let mut encoder = self
            .encoder
            .take()
            .ok_or_else(|| BackendError::AcquireImageFailed("execute outside a frame".into()))?;

        {
            let mut i = 0;
            while i < steps.len() {
                match &steps[i] {
                    Step::Begin { color, depth } => {
                        let color_attachment = match color {
                            Some((target, load, store)) => Some(wgpu::RenderPassColorAttachment {
                                view: self.attachment_view(*target, false)?,
                                resolve_target: None,
                                ops: wgpu::Operations {
                                    load: Self::color_load_op(*load),
                                    store: Self::store_op(*store),
                                },
                            }),
                            None => None,
                        };
                        let depth_attachment = match depth {
                            Some((target, load, store)) => {
                                Some(wgpu::RenderPassDepthStencilAttachment {
                                    view: self.attachment_view(*target, true)?,
                                    depth_ops: Some(wgpu::Operations {
                                        load: Self::depth_load_op(*load),
                                        store: Self::store_op(*store),
                                    }),
                                    stencil_ops: None,
                                })
                            }
                            None => None,
                        };
                        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                            label: Some("Frame Pass"),
                            color_attachments: &[color_attachment],
                            depth_stencil_attachment: depth_attachment,
                            timestamp_writes: None,
                            occlusion_query_set: None,
                        });
                        i += 1;
                        while i < steps.len() {
                            match &steps[i] {
                                Step::End => {
                                    i += 1;
                                    break;
                                }
                                Step::Viewport(rect) => {
                                    pass.set_viewport(
                                        rect.x as f32,
                                        rect.y as f32,
                                        rect.width as f32,
                                        rect.height as f32,
                                        0.0,
                                        1.0,
                                    );
                                    i += 1;
                                }
                                Step::Blit { key, group } => {
                                    if let Some(pipeline) = self.pipelines.get(key) {
                                        pass.set_pipeline(pipeline);
                                        pass.set_bind_group(0, &groups[*group], &[]);
                                        pass.draw(0..3, 0..1);
                                    }
                                    i += 1;
                                }
                                Step::Bundles(index) => {
                                    pass.execute_bundles(bundle_sets[*index].iter());
                                    i += 1;
                                }
                                Step::Begin { .. } | Step::Copy { .. } => {
                                    break;
                                }
                            }
                        }
                    }
                    Step::Copy {
                        source,
                        destination,
                    } => {
                        let (src, dst) = match (source, destination) {
                            (TargetRef::Temporary(a), TargetRef::Temporary(b)) => {
                                let src = self
                                    .targets
                                    .get(&a.0)
                                    .ok_or(BackendError::UnknownTarget(*a))?;
                                let dst = self
                                    .targets
                                    .get(&b.0)
                                    .ok_or(BackendError::UnknownTarget(*b))?;
                                (src, dst)
                            }
                            _ => {
                                log::warn!("attachment copies involving the display are skipped");
                                i += 1;
                                continue;
                            }
                        };
                        encoder.copy_texture_to_texture(
                            src.texture.as_image_copy(),
                            dst.texture.as_image_copy(),
                            wgpu::Extent3d {
                                width: src.desc.width,
                                height: src.desc.height,
                                depth_or_array_layers: 1,
                            },
                        );
                        i += 1;
                    }
                    Step::End | Step::Viewport(_) | Step::Blit { .. } | Step::Bundles(_) => {
                        i += 1;
                    }
                }
            }
        }

        self.encoder = Some(encoder);
        Ok(())
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        self.display_view = None;
        if let Some(texture) = self.current_texture.take() {
            texture.present();
        }
        Ok(())
    }

    fn depth_convention(&self) -> DepthConvention {
        DepthConvention::Forward
    }

    fn post_shaders_available(&self) -> bool {
        true
    }
}

