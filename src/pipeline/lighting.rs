//! Directional light setup for a camera pass
//!
//! Binds the visible light data as globals and routes each light through
//! the shadow atlas reservation. Excess lights past the slot limit simply
//! render unshadowed.

use crate::backend::command::{CommandList, GlobalParam};
use crate::pipeline::shadows::ShadowAtlas;
use crate::scene::DirectionalLight;
use crate::visibility::VisibilityResult;
use glam::Vec4;

/// Maximum directional lights bound per frame
pub const MAX_DIRECTIONAL_LIGHTS: usize = 4;

/// Bind light globals and reserve shadow tiles.
///
/// `layer_mask` filters lights when the camera masks them; pass `u32::MAX`
/// to accept all.
pub(crate) fn setup(
    list: &mut CommandList,
    lights: &[DirectionalLight],
    atlas: &mut ShadowAtlas,
    visibility: &dyn VisibilityResult,
    layer_mask: u32,
) {
    let mut colors = Vec::with_capacity(MAX_DIRECTIONAL_LIGHTS);
    let mut directions = Vec::with_capacity(MAX_DIRECTIONAL_LIGHTS);
    let mut shadow_data = Vec::with_capacity(MAX_DIRECTIONAL_LIGHTS);

    for (visible_index, light) in lights.iter().enumerate() {
        if light.rendering_layer_mask & layer_mask == 0 {
            continue;
        }
        if colors.len() >= MAX_DIRECTIONAL_LIGHTS {
            log::warn!("more than {MAX_DIRECTIONAL_LIGHTS} directional lights, ignoring the rest");
            break;
        }

        let reservation = atlas.reserve(light, visible_index, visibility);
        colors.push((light.color * light.intensity).extend(1.0));
        // Shaders want the direction toward the light
        directions.push((-light.direction).extend(0.0));
        shadow_data.push(Vec4::new(
            reservation.strength,
            reservation.tile_base as f32,
            reservation.normal_bias,
            reservation.mask_channel as f32,
        ));
    }

    list.set_int(GlobalParam::DirectionalLightCount, colors.len() as i32);
    list.set_vec4_array(GlobalParam::DirectionalLightColors, colors);
    list.set_vec4_array(GlobalParam::DirectionalLightDirections, directions);
    list.set_vec4_array(GlobalParam::DirectionalLightShadowData, shadow_data);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::command::{FrameCommand, ParamValue};
    use crate::scene::LightShadows;
    use crate::settings::ShadowSettings;
    use crate::visibility::{Bounds, CascadeSlice};
    use glam::{Mat4, Vec3};

    struct AllCasters;

    impl VisibilityResult for AllCasters {
        fn caster_bounds(&self, _light_index: usize) -> Option<Bounds> {
            Some(Bounds::new(Vec3::splat(-1.0), Vec3::splat(1.0)))
        }

        fn cascade_slice(
            &self,
            _light_index: usize,
            _cascade: usize,
            _cascade_count: usize,
            _ratios: [f32; 3],
            _tile_size: u32,
            _near_plane_offset: f32,
        ) -> CascadeSlice {
            CascadeSlice {
                view: Mat4::IDENTITY,
                projection: Mat4::IDENTITY,
                culling_sphere: Vec4::new(0.0, 0.0, 0.0, 10.0),
            }
        }
    }

    fn light_count(list: &CommandList) -> i32 {
        list.commands()
            .iter()
            .find_map(|c| match c {
                FrameCommand::SetGlobal {
                    param: GlobalParam::DirectionalLightCount,
                    value: ParamValue::Int(n),
                } => Some(*n),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn excess_lights_are_dropped() {
        let mut list = CommandList::new();
        let mut atlas = ShadowAtlas::new();
        atlas.begin_frame(&ShadowSettings::default());
        let lights = vec![DirectionalLight::default(); 6];

        setup(&mut list, &lights, &mut atlas, &AllCasters, u32::MAX);
        assert_eq!(light_count(&list), 4);
    }

    #[test]
    fn masked_lights_are_skipped() {
        let mut list = CommandList::new();
        let mut atlas = ShadowAtlas::new();
        atlas.begin_frame(&ShadowSettings::default());

        let mut masked = DirectionalLight::default();
        masked.rendering_layer_mask = 0b0010;
        let lights = vec![DirectionalLight::default(), masked];

        setup(&mut list, &lights, &mut atlas, &AllCasters, 0b0001);
        assert_eq!(light_count(&list), 1);
    }

    #[test]
    fn shadowed_lights_reserve_tiles_in_order() {
        let mut list = CommandList::new();
        let mut atlas = ShadowAtlas::new();
        atlas.begin_frame(&ShadowSettings::default());

        let mut shadowed = DirectionalLight::default();
        shadowed.shadows = LightShadows::Soft;
        shadowed.shadow_strength = 1.0;
        let lights = vec![shadowed.clone(), DirectionalLight::default(), shadowed];

        setup(&mut list, &lights, &mut atlas, &AllCasters, u32::MAX);
        assert_eq!(atlas.reserved_count(), 2);

        let shadow_data = list
            .commands()
            .iter()
            .find_map(|c| match c {
                FrameCommand::SetGlobal {
                    param: GlobalParam::DirectionalLightShadowData,
                    value: ParamValue::Vec4Array(data),
                } => Some(data.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(shadow_data.len(), 3);
        // First shadowed light owns tiles 0.., second owns the next block
        assert_eq!(shadow_data[0].y, 0.0);
        assert_eq!(shadow_data[1].x, 0.0);
        assert_eq!(shadow_data[2].y, 4.0);
    }
}
