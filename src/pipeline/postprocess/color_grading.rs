//! Color grading and tone mapping
//!
//! All adjustment groups are packed into shader-visible parameters and baked
//! into a 2D-tiled 3D lookup table once per frame; the grading apply pass
//! then samples the LUT instead of running the full math per pixel.

use crate::backend::command::{CommandList, GlobalParam, PostPass};
use crate::backend::traits::{GraphicsBackend, TargetId};
use crate::backend::types::{FilterMode, TargetDesc, TextureFormat};
use crate::settings::{LutResolution, PostFxSettings, ToneMapping};
use crate::targets::{ArenaError, TargetArena, TargetKey};
use glam::{Vec3, Vec4};

/// Pass selector for a tone mapping operator.
///
/// An explicit mapping table; the operator enum carries no ordinal
/// relationship to the pass list.
pub fn grading_pass(mode: ToneMapping) -> PostPass {
    match mode {
        ToneMapping::None => PostPass::ColorGradingNone,
        ToneMapping::Aces => PostPass::ColorGradingAces,
        ToneMapping::Neutral => PostPass::ColorGradingNeutral,
        ToneMapping::Reinhard => PostPass::ColorGradingReinhard,
    }
}

/// LUT sampling parameters used while baking:
/// `(height, 0.5/width, 0.5/height, height/(height-1))`
pub fn lut_bake_params(resolution: LutResolution) -> Vec4 {
    let width = resolution.width() as f32;
    let height = resolution.height() as f32;
    Vec4::new(height, 0.5 / width, 0.5 / height, height / (height - 1.0))
}

/// LUT sampling parameters used while applying:
/// `(1/width, 1/height, height-1)`
pub fn lut_apply_params(resolution: LutResolution) -> Vec4 {
    let width = resolution.width() as f32;
    let height = resolution.height() as f32;
    Vec4::new(1.0 / width, 1.0 / height, height - 1.0, 0.0)
}

fn standard_illuminant_y(x: f32) -> f32 {
    2.87 * x - 3.0 * x * x - 0.27509507
}

fn cie_xy_to_lms(x: f32, y: f32) -> Vec3 {
    let big_y = 1.0;
    let big_x = big_y * x / y;
    let big_z = big_y * (1.0 - x - y) / y;
    Vec3::new(
        0.7328 * big_x + 0.4296 * big_y - 0.1624 * big_z,
        -0.7036 * big_x + 1.6975 * big_y + 0.0061 * big_z,
        0.0030 * big_x + 0.0136 * big_y + 0.9834 * big_z,
    )
}

/// White balance temperature/tint offsets converted to LMS cone-response
/// coefficients relative to the standard illuminant.
pub fn white_balance_coefficients(temperature: f32, tint: f32) -> Vec4 {
    let t1 = temperature / 65.0;
    let t2 = tint / 65.0;

    let x = 0.31271 - t1 * (if t1 < 0.0 { 0.1 } else { 0.05 });
    let y = standard_illuminant_y(x) + t2 * 0.05;

    let reference = cie_xy_to_lms(0.31271, standard_illuminant_y(0.31271));
    let white = cie_xy_to_lms(x, y);

    (reference / white).extend(0.0)
}

/// Push every adjustment group as shader-visible parameters
fn configure(list: &mut CommandList, settings: &PostFxSettings) {
    let c = &settings.color_adjustments;
    list.set_vec4(
        GlobalParam::ColorAdjustments,
        Vec4::new(
            2f32.powf(c.post_exposure),
            c.contrast * 0.01 + 1.0,
            // hue shift normalized to turns
            c.hue_shift / 360.0,
            c.saturation * 0.01 + 1.0,
        ),
    );
    list.set_vec4(GlobalParam::ColorFilter, c.color_filter);

    let w = &settings.white_balance;
    list.set_vec4(
        GlobalParam::WhiteBalance,
        white_balance_coefficients(w.temperature, w.tint),
    );

    let s = &settings.split_toning;
    // Balance travels in the shadow tint's alpha channel
    list.set_vec4(
        GlobalParam::SplitToningShadows,
        s.shadows.extend(s.balance * 0.01),
    );
    list.set_vec4(GlobalParam::SplitToningHighlights, s.highlights.extend(0.0));

    let m = &settings.channel_mixer;
    list.set_vec4(GlobalParam::ChannelMixerRed, m.red.extend(0.0));
    list.set_vec4(GlobalParam::ChannelMixerGreen, m.green.extend(0.0));
    list.set_vec4(GlobalParam::ChannelMixerBlue, m.blue.extend(0.0));

    let smh = &settings.shadows_midtones_highlights;
    list.set_vec4(GlobalParam::SmhShadows, smh.shadows);
    list.set_vec4(GlobalParam::SmhMidtones, smh.midtones);
    list.set_vec4(GlobalParam::SmhHighlights, smh.highlights);
    list.set_vec4(
        GlobalParam::SmhRange,
        Vec4::new(
            smh.shadows_start,
            smh.shadows_end,
            smh.highlights_start,
            smh.highlights_end,
        ),
    );
}

/// Bake the frame's color transform into a LUT and bind it for the apply
/// pass. The returned target stays acquired until the compositor releases
/// it after the final draw.
pub(crate) fn bake_lut<B: GraphicsBackend>(
    backend: &mut B,
    arena: &mut TargetArena,
    list: &mut CommandList,
    settings: &PostFxSettings,
    source: TargetId,
    hdr: bool,
) -> Result<TargetId, ArenaError> {
    configure(list, settings);

    let resolution = settings.lut_resolution;
    let lut = arena.acquire(
        backend,
        TargetKey::ColorGradingLut,
        TargetDesc {
            width: resolution.width(),
            height: resolution.height(),
            depth_bits: 0,
            format: TextureFormat::Rgba16Float,
            filter: FilterMode::Linear,
        },
    )?;

    list.set_vec4(
        GlobalParam::ColorGradingLutParameters,
        lut_bake_params(resolution),
    );

    let pass = grading_pass(settings.tone_mapping);
    // A log-encoded LUT source only makes sense when a tone curve will
    // consume it; grading LDR data through a curve input would double-apply.
    let log_c = hdr && pass != PostPass::ColorGradingNone;
    list.set_float(
        GlobalParam::ColorGradingLutInLogC,
        if log_c { 1.0 } else { 0.0 },
    );
    list.blit(source.into(), lut.into(), pass);

    list.set_vec4(
        GlobalParam::ColorGradingLutParameters,
        lut_apply_params(resolution),
    );
    list.set_texture(GlobalParam::ColorGradingLut, lut.into());

    Ok(lut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::command::{FrameCommand, ParamValue};
    use crate::backend::recording::RecordingBackend;

    #[test]
    fn tone_mapping_pass_table_is_total() {
        assert_eq!(grading_pass(ToneMapping::None), PostPass::ColorGradingNone);
        assert_eq!(grading_pass(ToneMapping::Aces), PostPass::ColorGradingAces);
        assert_eq!(grading_pass(ToneMapping::Neutral), PostPass::ColorGradingNeutral);
        assert_eq!(grading_pass(ToneMapping::Reinhard), PostPass::ColorGradingReinhard);
    }

    #[test]
    fn lut_parameter_pairs_are_inverse() {
        for resolution in [
            LutResolution::Lut16,
            LutResolution::Lut32,
            LutResolution::Lut64,
        ] {
            let bake = lut_bake_params(resolution);
            let apply = lut_apply_params(resolution);
            let height = resolution.height() as f32;

            // The bake-time half-texel offsets address the center of the
            // cell that apply-time cell (0, 0) maps onto.
            assert_eq!(bake.y, apply.x * 0.5);
            assert_eq!(bake.z, apply.y * 0.5);
            assert_eq!(bake.x, height);
            assert_eq!(apply.z, height - 1.0);
            assert!((bake.w - height / (height - 1.0)).abs() < 1e-6);
        }
    }

    #[test]
    fn neutral_white_balance_is_identity() {
        let coefficients = white_balance_coefficients(0.0, 0.0);
        assert!((coefficients.x - 1.0).abs() < 1e-5);
        assert!((coefficients.y - 1.0).abs() < 1e-5);
        assert!((coefficients.z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn warm_temperature_raises_the_long_cone_response() {
        let warm = white_balance_coefficients(50.0, 0.0);
        let cool = white_balance_coefficients(-50.0, 0.0);
        assert!(warm.x > 1.0);
        assert!(cool.x < 1.0);
    }

    fn bake(settings: &PostFxSettings, hdr: bool) -> CommandList {
        let mut backend = RecordingBackend::new(64, 64);
        let mut arena = TargetArena::new();
        let mut list = CommandList::new();
        let source = backend
            .create_target(&TargetDesc::color(64, 64, hdr))
            .unwrap();
        bake_lut(&mut backend, &mut arena, &mut list, settings, source, hdr).unwrap();
        list
    }

    fn log_c_flag(list: &CommandList) -> f32 {
        list.commands()
            .iter()
            .find_map(|c| match c {
                FrameCommand::SetGlobal {
                    param: GlobalParam::ColorGradingLutInLogC,
                    value: ParamValue::Float(v),
                } => Some(*v),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn log_encoding_requires_hdr_and_an_operator() {
        let mut settings = PostFxSettings::default();

        settings.tone_mapping = ToneMapping::Aces;
        assert_eq!(log_c_flag(&bake(&settings, true)), 1.0);
        assert_eq!(log_c_flag(&bake(&settings, false)), 0.0);

        settings.tone_mapping = ToneMapping::None;
        assert_eq!(log_c_flag(&bake(&settings, true)), 0.0);
    }

    #[test]
    fn bake_switches_parameters_to_apply_time() {
        let settings = PostFxSettings::default();
        let list = bake(&settings, true);
        let params: Vec<Vec4> = list
            .commands()
            .iter()
            .filter_map(|c| match c {
                FrameCommand::SetGlobal {
                    param: GlobalParam::ColorGradingLutParameters,
                    value: ParamValue::Vec4(v),
                } => Some(*v),
                _ => None,
            })
            .collect();
        assert_eq!(
            params,
            vec![
                lut_bake_params(settings.lut_resolution),
                lut_apply_params(settings.lut_resolution),
            ]
        );
    }
}
