//! Post-processing stack
//!
//! Sequences the post-effect chain for one camera: bloom, color-grading LUT
//! bake, grading apply, optional FXAA, optional rescale, final blend into
//! the display target.

pub mod bloom;
pub mod color_grading;

use crate::backend::command::{CommandList, FrameCommand, GlobalParam, PostPass};
use crate::backend::traits::{GraphicsBackend, TargetId};
use crate::backend::types::{FinalBlendMode, LoadAction, Rect, TargetDesc};
use crate::settings::{BicubicRescalingMode, CameraSettings, FxaaSettings, PostFxSettings};
use crate::targets::{ArenaError, TargetArena, TargetKey};
use glam::Vec4;

/// sRGB gamma to linear conversion for threshold-style UI values
pub(crate) fn gamma_to_linear(value: f32) -> f32 {
    if value <= 0.04045 {
        value / 12.92
    } else {
        ((value + 0.055) / 1.055).powf(2.4)
    }
}

/// Per-camera post-effect compositor
#[derive(Debug, Default)]
pub struct PostFxStack {
    settings: Option<PostFxSettings>,
    buffer_width: u32,
    buffer_height: u32,
    hdr: bool,
    keep_alpha: bool,
    viewport: Rect,
    display_width: u32,
    display_height: u32,
    final_blend: FinalBlendMode,
    bicubic: BicubicRescalingMode,
    fxaa: FxaaSettings,
}

impl PostFxStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the stack for one camera pass.
    ///
    /// `settings = None` or missing post shaders leave the stack inactive;
    /// the orchestrator then blits the camera buffer directly.
    #[allow(clippy::too_many_arguments)]
    pub fn setup(
        &mut self,
        camera_settings: &CameraSettings,
        settings: Option<PostFxSettings>,
        buffer_size: (u32, u32),
        viewport: Rect,
        display_size: (u32, u32),
        hdr: bool,
        mut fxaa: FxaaSettings,
        bicubic: BicubicRescalingMode,
        shaders_available: bool,
    ) {
        self.settings = match (settings, shaders_available) {
            (Some(settings), true) => Some(settings),
            (Some(_), false) => {
                log::warn!("post-effect shaders unavailable, disabling the stack");
                None
            }
            (None, _) => None,
        };
        self.buffer_width = buffer_size.0;
        self.buffer_height = buffer_size.1;
        self.viewport = viewport;
        self.display_width = display_size.0;
        self.display_height = display_size.1;
        self.hdr = hdr;
        self.keep_alpha = camera_settings.keep_alpha;
        self.final_blend = camera_settings.final_blend_mode;
        fxaa.enabled &= camera_settings.allow_fxaa;
        self.fxaa = fxaa;
        self.bicubic = bicubic;
    }

    pub fn is_active(&self) -> bool {
        self.settings.is_some()
    }

    /// Run the chain on `source` and composite into the display target
    pub fn render<B: GraphicsBackend>(
        &self,
        backend: &mut B,
        arena: &mut TargetArena,
        list: &mut CommandList,
        source: TargetId,
    ) -> Result<(), ArenaError> {
        let Some(settings) = &self.settings else {
            return Ok(());
        };

        let bloom_result = bloom::apply(
            backend,
            arena,
            list,
            &settings.bloom,
            source,
            self.buffer_width,
            self.buffer_height,
            self.hdr,
        )?;
        let graded_source = bloom_result.unwrap_or(source);

        self.grade_and_composite(backend, arena, list, settings, graded_source)?;

        if bloom_result.is_some() {
            arena.release(TargetKey::BloomResult)?;
        }
        Ok(())
    }

    fn grade_and_composite<B: GraphicsBackend>(
        &self,
        backend: &mut B,
        arena: &mut TargetArena,
        list: &mut CommandList,
        settings: &PostFxSettings,
        source: TargetId,
    ) -> Result<(), ArenaError> {
        color_grading::bake_lut(backend, arena, list, settings, source, self.hdr)?;

        // Anti-aliasing needs luma in the alpha channel unless the camera
        // insists on keeping its own alpha.
        let apply_pass = if self.keep_alpha {
            PostPass::ApplyColorGrading
        } else {
            PostPass::ApplyColorGradingWithLuma
        };
        let fxaa_pass = if self.keep_alpha {
            PostPass::Fxaa
        } else {
            PostPass::FxaaWithLuma
        };

        let fxaa_input = if self.fxaa.enabled {
            list.push(FrameCommand::SetFxaaQuality(self.fxaa.quality));
            list.set_vec4(
                GlobalParam::FxaaConfig,
                Vec4::new(
                    self.fxaa.fixed_threshold,
                    self.fxaa.relative_threshold,
                    self.fxaa.subpixel_blending,
                    0.0,
                ),
            );
            let graded = arena.acquire(
                backend,
                TargetKey::ColorGradingResult,
                TargetDesc::color(self.buffer_width, self.buffer_height, false),
            )?;
            list.blit(source.into(), graded.into(), apply_pass);
            Some(graded)
        } else {
            None
        };

        let needs_rescale =
            self.buffer_width != self.viewport.width || self.buffer_height != self.viewport.height;

        if !needs_rescale {
            match fxaa_input {
                Some(graded) => {
                    self.final_draw(list, graded, fxaa_pass);
                    arena.release(TargetKey::ColorGradingResult)?;
                }
                None => self.final_draw(list, source, PostPass::ApplyColorGrading),
            }
        } else {
            let final_result = arena.acquire(
                backend,
                TargetKey::FinalResult,
                TargetDesc::color(self.buffer_width, self.buffer_height, false),
            )?;
            match fxaa_input {
                Some(graded) => {
                    list.blit(graded.into(), final_result.into(), fxaa_pass);
                    arena.release(TargetKey::ColorGradingResult)?;
                }
                None => list.blit(source.into(), final_result.into(), PostPass::ApplyColorGrading),
            }

            let bicubic = match self.bicubic {
                BicubicRescalingMode::UpAndDown => true,
                BicubicRescalingMode::UpOnly => self.buffer_width < self.viewport.width,
                BicubicRescalingMode::Off => false,
            };
            list.set_float(GlobalParam::CopyBicubic, if bicubic { 1.0 } else { 0.0 });
            self.final_draw(list, final_result, PostPass::FinalRescale);
            arena.release(TargetKey::FinalResult)?;
        }

        arena.release(TargetKey::ColorGradingLut)?;
        Ok(())
    }

    /// Composite into the display target honoring the camera viewport and
    /// blend factors. The previous display contents only need to be fetched
    /// when the camera covers part of the display or actually blends.
    fn final_draw(&self, list: &mut CommandList, source: TargetId, pass: PostPass) {
        let covers_display = self.viewport.covers(self.display_width, self.display_height);
        let load = if covers_display && self.final_blend.is_replace() {
            LoadAction::DontCare
        } else {
            LoadAction::Load
        };
        list.push(FrameCommand::FinalDraw {
            source: source.into(),
            pass,
            viewport: self.viewport,
            load,
            blend: self.final_blend,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::command::TargetRef;
    use crate::backend::recording::RecordingBackend;
    use crate::backend::types::BlendFactor;

    struct Fixture {
        backend: RecordingBackend,
        arena: TargetArena,
        stack: PostFxStack,
        source: TargetId,
    }

    fn fixture(buffer: (u32, u32), viewport: Rect, display: (u32, u32)) -> Fixture {
        let mut backend = RecordingBackend::new(display.0, display.1);
        let source = backend
            .create_target(&TargetDesc::color(buffer.0, buffer.1, true))
            .unwrap();
        let mut stack = PostFxStack::new();
        stack.setup(
            &CameraSettings::default(),
            Some(PostFxSettings::default()),
            buffer,
            viewport,
            display,
            true,
            FxaaSettings::default(),
            BicubicRescalingMode::Off,
            true,
        );
        Fixture {
            backend,
            arena: TargetArena::new(),
            stack,
            source,
        }
    }

    fn render(fixture: &mut Fixture) -> CommandList {
        let mut list = CommandList::new();
        fixture
            .stack
            .render(&mut fixture.backend, &mut fixture.arena, &mut list, fixture.source)
            .unwrap();
        list
    }

    #[test]
    fn inactive_without_settings() {
        let mut stack = PostFxStack::new();
        stack.setup(
            &CameraSettings::default(),
            None,
            (64, 64),
            Rect::from_size(64, 64),
            (64, 64),
            true,
            FxaaSettings::default(),
            BicubicRescalingMode::Off,
            true,
        );
        assert!(!stack.is_active());
    }

    #[test]
    fn inactive_when_shaders_are_missing() {
        let mut stack = PostFxStack::new();
        stack.setup(
            &CameraSettings::default(),
            Some(PostFxSettings::default()),
            (64, 64),
            Rect::from_size(64, 64),
            (64, 64),
            true,
            FxaaSettings::default(),
            BicubicRescalingMode::Off,
            false,
        );
        assert!(!stack.is_active());
    }

    #[test]
    fn full_viewport_replace_blend_skips_the_display_load() {
        let mut fixture = fixture((512, 256), Rect::from_size(512, 256), (512, 256));
        let list = render(&mut fixture);
        let final_draw = list
            .commands()
            .iter()
            .find_map(|c| match c {
                FrameCommand::FinalDraw { load, .. } => Some(*load),
                _ => None,
            })
            .unwrap();
        assert_eq!(final_draw, LoadAction::DontCare);
        fixture.arena.finish_frame().unwrap();
    }

    #[test]
    fn partial_viewport_loads_the_display() {
        let mut fixture = fixture((256, 256), Rect::new(64, 0, 256, 256), (512, 256));
        let list = render(&mut fixture);
        let load = list
            .commands()
            .iter()
            .find_map(|c| match c {
                FrameCommand::FinalDraw { load, .. } => Some(*load),
                _ => None,
            })
            .unwrap();
        assert_eq!(load, LoadAction::Load);
    }

    #[test]
    fn blending_camera_loads_the_display() {
        let mut fixture = fixture((512, 256), Rect::from_size(512, 256), (512, 256));
        let mut camera_settings = CameraSettings::default();
        camera_settings.final_blend_mode = FinalBlendMode {
            source: BlendFactor::SrcAlpha,
            destination: BlendFactor::OneMinusSrcAlpha,
        };
        fixture.stack.setup(
            &camera_settings,
            Some(PostFxSettings::default()),
            (512, 256),
            Rect::from_size(512, 256),
            (512, 256),
            true,
            FxaaSettings::default(),
            BicubicRescalingMode::Off,
            true,
        );
        let list = render(&mut fixture);
        let load = list
            .commands()
            .iter()
            .find_map(|c| match c {
                FrameCommand::FinalDraw { load, .. } => Some(*load),
                _ => None,
            })
            .unwrap();
        assert_eq!(load, LoadAction::Load);
    }

    #[test]
    fn scaled_buffer_rescales_through_an_ldr_buffer() {
        // Buffer at half the viewport size forces the rescale path
        let mut fixture = fixture((256, 128), Rect::from_size(512, 256), (512, 256));
        let list = render(&mut fixture);

        let rescale = list
            .commands()
            .iter()
            .find_map(|c| match c {
                FrameCommand::FinalDraw { pass, source, .. } => Some((*pass, *source)),
                _ => None,
            })
            .unwrap();
        assert_eq!(rescale.0, PostPass::FinalRescale);

        // The rescale source is LDR at buffer resolution
        if let TargetRef::Temporary(id) = rescale.1 {
            let desc = fixture.backend.target_desc(id).unwrap();
            assert_eq!((desc.width, desc.height), (256, 128));
            assert!(!desc.format.is_hdr());
        } else {
            panic!("rescale reads a temporary target");
        }
        fixture.arena.finish_frame().unwrap();
    }

    #[test]
    fn bicubic_up_only_applies_just_when_upscaling() {
        for (mode, scaled_down, expected) in [
            (BicubicRescalingMode::UpOnly, true, 1.0),
            (BicubicRescalingMode::UpOnly, false, 0.0),
            (BicubicRescalingMode::UpAndDown, false, 1.0),
            (BicubicRescalingMode::Off, true, 0.0),
        ] {
            let buffer = if scaled_down { (256, 128) } else { (1024, 512) };
            let mut fixture = fixture(buffer, Rect::from_size(512, 256), (512, 256));
            fixture.stack.bicubic = mode;
            let list = render(&mut fixture);
            let flag = list
                .commands()
                .iter()
                .find_map(|c| match c {
                    FrameCommand::SetGlobal {
                        param: GlobalParam::CopyBicubic,
                        value: crate::backend::command::ParamValue::Float(v),
                    } => Some(*v),
                    _ => None,
                })
                .unwrap();
            assert_eq!(flag, expected, "mode {mode:?} scaled_down {scaled_down}");
        }
    }

    #[test]
    fn fxaa_grades_into_an_intermediate_and_uses_luma() {
        let mut fixture = fixture((512, 256), Rect::from_size(512, 256), (512, 256));
        let mut fxaa = FxaaSettings::default();
        fxaa.enabled = true;
        fixture.stack.setup(
            &CameraSettings::default(),
            Some(PostFxSettings::default()),
            (512, 256),
            Rect::from_size(512, 256),
            (512, 256),
            true,
            fxaa,
            BicubicRescalingMode::Off,
            true,
        );
        let list = render(&mut fixture);

        assert!(list.commands().iter().any(|c| matches!(
            c,
            FrameCommand::Blit {
                pass: PostPass::ApplyColorGradingWithLuma,
                ..
            }
        )));
        assert!(list.commands().iter().any(|c| matches!(
            c,
            FrameCommand::FinalDraw {
                pass: PostPass::FxaaWithLuma,
                ..
            }
        )));
        fixture.arena.finish_frame().unwrap();
    }

    #[test]
    fn identical_inputs_produce_identical_command_streams() {
        let mut first = fixture((512, 256), Rect::from_size(512, 256), (512, 256));
        let mut second = fixture((512, 256), Rect::from_size(512, 256), (512, 256));
        let list_a = render(&mut first);
        let list_b = render(&mut second);
        assert_eq!(list_a, list_b);

        // And running the same stack again is also bit-identical
        let list_c = render(&mut first);
        assert_eq!(list_a, list_c);
    }
}
