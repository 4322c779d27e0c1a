//! Bloom mip pyramid
//!
//! Prefilters the source with a soft-knee threshold, walks a half-resolution
//! blur pyramid down, then recombines top-down into a full-resolution bloom
//! contribution. Pyramid levels live on the arena's level stack; every level
//! is released as soon as it has been consumed.

use crate::backend::command::{CommandList, GlobalParam, PostPass};
use crate::backend::traits::{GraphicsBackend, TargetId};
use crate::backend::types::TargetDesc;
use crate::settings::{BloomMode, BloomSettings};
use crate::targets::arena::LevelEntry;
use crate::targets::{ArenaError, TargetArena, TargetKey};
use glam::Vec4;

/// Build the bloom contribution for `source`.
///
/// Returns `None` (pass-through) when bloom is disabled, has no intensity,
/// or the half-resolution start already falls below twice the downscale
/// limit. Otherwise the returned target holds the combined bloom image at
/// buffer resolution and stays acquired for the caller to consume.
pub(crate) fn apply<B: GraphicsBackend>(
    backend: &mut B,
    arena: &mut TargetArena,
    list: &mut CommandList,
    settings: &BloomSettings,
    source: TargetId,
    buffer_width: u32,
    buffer_height: u32,
    hdr: bool,
) -> Result<Option<TargetId>, ArenaError> {
    let mut width = buffer_width / 2;
    let mut height = buffer_height / 2;

    if settings.max_iterations == 0
        || settings.intensity <= 0.0
        || height < settings.downscale_limit * 2
        || width < settings.downscale_limit * 2
    {
        return Ok(None);
    }

    // Soft-knee threshold curve: breakpoints at threshold +/- knee, packed
    // for the prefilter kernel.
    let t = super::gamma_to_linear(settings.threshold);
    let knee = t * settings.threshold_knee;
    list.set_vec4(
        GlobalParam::BloomThreshold,
        Vec4::new(t, knee - t, 2.0 * knee, 0.25 / (knee + 1e-5)),
    );

    let prefilter = arena.acquire(
        backend,
        TargetKey::BloomPrefilter,
        TargetDesc::color(width, height, hdr),
    )?;
    let prefilter_pass = if settings.fade_fireflies {
        PostPass::BloomPrefilterFireflies
    } else {
        PostPass::BloomPrefilter
    };
    list.blit(source.into(), prefilter.into(), prefilter_pass);
    width /= 2;
    height /= 2;

    // Downsample: separable blur per level, half resolution each step. The
    // horizontal scratch dies inside its iteration; blurred levels go onto
    // the arena's level stack.
    let mut from = prefilter;
    for i in 0..settings.max_iterations {
        if height < settings.downscale_limit || width < settings.downscale_limit {
            break;
        }
        let level = i as u8;
        let desc = TargetDesc::color(width, height, hdr);
        let horizontal = arena.acquire(backend, TargetKey::BloomHorizontal(level), desc)?;
        let vertical = arena.push_level(backend, TargetKey::BloomVertical(level), desc)?;
        list.blit(from.into(), horizontal.into(), PostPass::BloomHorizontal);
        list.blit(horizontal.into(), vertical.into(), PostPass::BloomVertical);
        arena.release(TargetKey::BloomHorizontal(level))?;
        from = vertical;
        width /= 2;
        height /= 2;
    }
    arena.release(TargetKey::BloomPrefilter)?;

    list.set_float(
        GlobalParam::BloomBicubicUpsampling,
        if settings.bicubic_upsampling { 1.0 } else { 0.0 },
    );

    let (combine_pass, final_pass, final_intensity) = match settings.mode {
        BloomMode::Additive => {
            list.set_float(GlobalParam::BloomIntensity, 1.0);
            (PostPass::BloomAdd, PostPass::BloomAdd, settings.intensity)
        }
        BloomMode::Scattering => {
            list.set_float(GlobalParam::BloomIntensity, settings.scatter);
            (
                PostPass::BloomScatter,
                PostPass::BloomScatterFinal,
                // Full-strength scattering feeds back on itself; cap the
                // final weight below 1.
                settings.intensity.min(0.95),
            )
        }
    };

    // Upsample: pop levels coarse-to-fine, blending the running result into
    // each finer level through a combine buffer of that level's size.
    let mut current = arena
        .detach_level()
        .expect("bloom ran at least one iteration");
    while let Some(finer) = arena.detach_level() {
        let level = match finer.key {
            TargetKey::BloomVertical(level) => level,
            _ => unreachable!("level stack holds bloom levels only"),
        };
        let combine = arena.acquire(backend, TargetKey::BloomCombine(level), finer.desc)?;
        list.set_texture(GlobalParam::PostFxSource2, finer.id.into());
        list.blit(current.id.into(), combine.into(), combine_pass);
        arena.release(current.key)?;
        arena.release(finer.key)?;
        current = LevelEntry {
            key: TargetKey::BloomCombine(level),
            id: combine,
            desc: finer.desc,
        };
    }

    // Final composite back at buffer resolution, source2 carries the
    // unbloomed image.
    list.set_float(GlobalParam::BloomIntensity, final_intensity);
    let result = arena.acquire(
        backend,
        TargetKey::BloomResult,
        TargetDesc::color(buffer_width, buffer_height, hdr),
    )?;
    list.set_texture(GlobalParam::PostFxSource2, source.into());
    list.blit(current.id.into(), result.into(), final_pass);
    arena.release(current.key)?;

    Ok(Some(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::command::{FrameCommand, ParamValue};
    use crate::backend::recording::RecordingBackend;

    fn run(
        settings: &BloomSettings,
        width: u32,
        height: u32,
    ) -> (Option<TargetId>, CommandList, TargetArena, RecordingBackend) {
        let mut backend = RecordingBackend::new(width, height);
        let mut arena = TargetArena::new();
        let mut list = CommandList::new();
        let source = backend.create_target(&TargetDesc::color(width, height, true)).unwrap();
        let result = apply(
            &mut backend,
            &mut arena,
            &mut list,
            settings,
            source,
            width,
            height,
            true,
        )
        .unwrap();
        (result, list, arena, backend)
    }

    #[test]
    fn zero_iterations_is_pass_through() {
        let settings = BloomSettings {
            max_iterations: 0,
            ..BloomSettings::default()
        };
        let (result, list, _, _) = run(&settings, 1024, 512);
        assert!(result.is_none());
        assert!(list.is_empty());
    }

    #[test]
    fn zero_intensity_is_pass_through() {
        let settings = BloomSettings {
            intensity: 0.0,
            ..BloomSettings::default()
        };
        let (result, list, _, _) = run(&settings, 1024, 512);
        assert!(result.is_none());
        assert!(list.is_empty());
    }

    #[test]
    fn tiny_buffer_is_pass_through() {
        let settings = BloomSettings {
            downscale_limit: 64,
            ..BloomSettings::default()
        };
        // Half resolution (120x64) is below 2x the limit
        let (result, list, _, _) = run(&settings, 240, 128);
        assert!(result.is_none());
        assert!(list.is_empty());
    }

    #[test]
    fn pyramid_releases_every_level() {
        let settings = BloomSettings::default();
        let (result, _, mut arena, _) = run(&settings, 1024, 512);
        let result = result.unwrap();

        // Only the bloom result is still acquired
        assert_eq!(arena.get(TargetKey::BloomResult), Some(result));
        assert_eq!(arena.level_count(), 0);
        arena.release(TargetKey::BloomResult).unwrap();
        arena.finish_frame().unwrap();
    }

    #[test]
    fn iteration_count_respects_downscale_limit() {
        let settings = BloomSettings {
            max_iterations: 16,
            downscale_limit: 32,
            ..BloomSettings::default()
        };
        let (_, list, _, _) = run(&settings, 1024, 1024);

        // Levels run at 256, 128, 64, 32, then stop before 16 < limit
        let horizontal_blits = list
            .commands()
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    FrameCommand::Blit {
                        pass: PostPass::BloomHorizontal,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(horizontal_blits, 4);
    }

    #[test]
    fn scattering_caps_final_intensity() {
        let settings = BloomSettings {
            mode: BloomMode::Scattering,
            intensity: 2.0,
            scatter: 0.6,
            ..BloomSettings::default()
        };
        let (_, list, _, _) = run(&settings, 1024, 512);

        let intensities: Vec<f32> = list
            .commands()
            .iter()
            .filter_map(|c| match c {
                FrameCommand::SetGlobal {
                    param: GlobalParam::BloomIntensity,
                    value: ParamValue::Float(v),
                } => Some(*v),
                _ => None,
            })
            .collect();
        assert_eq!(intensities.first(), Some(&0.6));
        assert_eq!(intensities.last(), Some(&0.95));
    }

    #[test]
    fn firefly_fade_selects_its_prefilter_variant() {
        let settings = BloomSettings {
            fade_fireflies: true,
            ..BloomSettings::default()
        };
        let (_, list, _, _) = run(&settings, 1024, 512);
        assert!(list.commands().iter().any(|c| matches!(
            c,
            FrameCommand::Blit {
                pass: PostPass::BloomPrefilterFireflies,
                ..
            }
        )));
    }
}
