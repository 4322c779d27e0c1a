//! Directional shadow atlas builder
//!
//! Packs up to four shadowed directional lights, four cascades each, into a
//! single square atlas. Reservation happens while lights are set up for the
//! frame; rendering happens before any geometry is submitted so the atlas
//! can be bound as a global resource.

use crate::backend::command::{Attachment, CommandList, FrameCommand, GlobalParam};
use crate::backend::traits::GraphicsBackend;
use crate::backend::types::{DepthConvention, LoadAction, Rect, StoreAction, TargetDesc};
use crate::scene::{DirectionalLight, LightShadows};
use crate::settings::ShadowSettings;
use crate::targets::{ArenaError, TargetArena, TargetKey};
use crate::visibility::VisibilityResult;
use glam::{Mat4, Vec4};

/// Maximum number of concurrently shadowed directional lights
pub const MAX_SHADOWED_DIRECTIONAL_LIGHTS: usize = 4;
/// Maximum cascades per light
pub const MAX_CASCADES: usize = 4;

const SQRT_2: f32 = std::f32::consts::SQRT_2;

/// Result of reserving atlas space for one light.
///
/// `strength > 0` means the light owns cascades starting at `tile_base`.
/// `strength < 0` means no shadow map could be rendered but the magnitude
/// still applies to the light's baked shadowmask. `strength == 0` means no
/// shadowing at all.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowReservation {
    pub strength: f32,
    pub tile_base: usize,
    pub normal_bias: f32,
    /// Baked shadowmask channel, -1 when the light is unbaked
    pub mask_channel: i32,
}

impl ShadowReservation {
    /// The "no shadow" sentinel
    pub const NONE: Self = Self {
        strength: 0.0,
        tile_base: 0,
        normal_bias: 0.0,
        mask_channel: -1,
    };

    pub fn has_shadow_map(&self) -> bool {
        self.strength > 0.0
    }
}

#[derive(Debug, Clone, Copy)]
struct ReservedLight {
    visible_index: usize,
    slope_scale_bias: f32,
    near_plane_offset: f32,
}

/// Per-frame shadow atlas state
#[derive(Debug, Default)]
pub struct ShadowAtlas {
    settings: ShadowSettings,
    reserved: Vec<ReservedLight>,
    uses_shadowmask: bool,
}

impl ShadowAtlas {
    pub fn new() -> Self {
        Self {
            settings: ShadowSettings::default(),
            reserved: Vec::with_capacity(MAX_SHADOWED_DIRECTIONAL_LIGHTS),
            uses_shadowmask: false,
        }
    }

    /// Start a new frame with the given settings
    pub fn begin_frame(&mut self, settings: &ShadowSettings) {
        self.settings = settings.clone();
        self.reserved.clear();
        self.uses_shadowmask = false;
    }

    pub fn reserved_count(&self) -> usize {
        self.reserved.len()
    }

    /// Reserve atlas tiles for a light.
    ///
    /// Returns the sentinel when the light cannot or should not shadow; a
    /// light whose caster bounds are absent contributes no shadow map but
    /// reports its strength negated so shadowmask accounting still works.
    pub fn reserve(
        &mut self,
        light: &DirectionalLight,
        visible_index: usize,
        visibility: &dyn VisibilityResult,
    ) -> ShadowReservation {
        if self.reserved.len() >= MAX_SHADOWED_DIRECTIONAL_LIGHTS
            || light.shadows == LightShadows::None
            || light.shadow_strength <= 0.0
        {
            return ShadowReservation::NONE;
        }

        let mask_channel = match light.mask_channel {
            Some(channel) => {
                self.uses_shadowmask = true;
                channel as i32
            }
            None => -1,
        };

        if visibility.caster_bounds(visible_index).is_none() {
            // Nothing in view casts a shadow for this light; the baked mask
            // can still attenuate, so the strength survives with its sign
            // flipped.
            return ShadowReservation {
                strength: -light.shadow_strength,
                tile_base: 0,
                normal_bias: 0.0,
                mask_channel,
            };
        }

        let tile_base = self.settings.directional.cascade_count * self.reserved.len();
        self.reserved.push(ReservedLight {
            visible_index,
            slope_scale_bias: light.slope_scale_bias,
            near_plane_offset: light.near_plane_offset,
        });

        ShadowReservation {
            strength: light.shadow_strength,
            tile_base,
            normal_bias: light.normal_bias,
            mask_channel,
        }
    }

    /// Render all reserved shadows into the atlas and bind the shadow
    /// globals.
    ///
    /// With nothing reserved a 1x1 dummy atlas is bound so shader bindings
    /// stay valid.
    pub fn render<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        arena: &mut TargetArena,
        list: &mut CommandList,
        visibility: &dyn VisibilityResult,
        depth_convention: DepthConvention,
    ) -> Result<(), ArenaError> {
        if self.reserved.is_empty() {
            let dummy = arena.acquire(backend, TargetKey::ShadowAtlas, TargetDesc::shadowmap(1))?;
            list.set_texture(GlobalParam::DirectionalShadowAtlas, dummy.into());
            return Ok(());
        }

        let directional = &self.settings.directional;
        let atlas_size = directional.atlas_size.pixels();
        let cascade_count = directional.cascade_count;

        let atlas = arena.acquire(
            backend,
            TargetKey::ShadowAtlas,
            TargetDesc::shadowmap(atlas_size),
        )?;
        list.push(FrameCommand::SetRenderTarget {
            color: None,
            depth: Some(Attachment {
                target: atlas.into(),
                load: LoadAction::Clear([1.0, 0.0, 0.0, 0.0]),
                store: StoreAction::Store,
            }),
        });

        let tiles = self.reserved.len() * cascade_count;
        let split: u32 = if tiles <= 1 {
            1
        } else if tiles <= 4 {
            2
        } else {
            4
        };
        let tile_size = atlas_size / split;
        let tile_scale = 1.0 / split as f32;

        let mut matrices = vec![Mat4::IDENTITY; tiles];
        let mut culling_spheres = vec![Vec4::ZERO; cascade_count];
        let mut cascade_data = vec![Vec4::ZERO; cascade_count];
        let cull_factor = (0.8 - directional.cascade_fade).max(0.0);

        for (index, light) in self.reserved.iter().enumerate() {
            let tile_offset = index * cascade_count;
            for cascade in 0..cascade_count {
                let slice = visibility.cascade_slice(
                    light.visible_index,
                    cascade,
                    cascade_count,
                    directional.cascade_ratios,
                    tile_size,
                    light.near_plane_offset,
                );

                // Cascades are congruent across lights for the shading-time
                // select test, so only the first light fills the shared
                // arrays.
                if index == 0 {
                    let (sphere, data) = cascade_select_data(
                        slice.culling_sphere,
                        tile_size as f32,
                        directional.filter.size_factor(),
                    );
                    culling_spheres[cascade] = sphere;
                    cascade_data[cascade] = data;
                }

                let tile_index = tile_offset + cascade;
                let offset = tile_offset_in_grid(tile_index, split);
                matrices[tile_index] = to_atlas_matrix(
                    slice.projection * slice.view,
                    offset,
                    tile_scale,
                    depth_convention,
                );

                list.push(FrameCommand::SetViewport(Rect::new(
                    offset.0 * tile_size,
                    offset.1 * tile_size,
                    tile_size,
                    tile_size,
                )));
                list.push(FrameCommand::SetViewProjection {
                    view: slice.view,
                    projection: slice.projection,
                });
                list.push(FrameCommand::SetDepthBias {
                    constant: 0.0,
                    slope_scale: light.slope_scale_bias,
                });
                list.push(FrameCommand::DrawShadowCasters {
                    visible_light: light.visible_index,
                    cascade,
                    cull_factor,
                });
                list.push(FrameCommand::SetDepthBias {
                    constant: 0.0,
                    slope_scale: 0.0,
                });
            }
        }

        list.set_texture(GlobalParam::DirectionalShadowAtlas, atlas.into());
        list.set_int(GlobalParam::CascadeCount, cascade_count as i32);
        list.set_vec4_array(GlobalParam::CascadeCullingSpheres, culling_spheres);
        list.set_vec4_array(GlobalParam::CascadeData, cascade_data);
        list.set_mat4_array(GlobalParam::DirectionalShadowMatrices, matrices);

        let f = 1.0 - directional.cascade_fade;
        list.set_vec4(
            GlobalParam::ShadowDistanceFade,
            Vec4::new(
                1.0 / self.settings.max_distance,
                1.0 / self.settings.distance_fade,
                1.0 / (1.0 - f * f),
                0.0,
            ),
        );
        list.set_vec4(
            GlobalParam::ShadowAtlasSize,
            Vec4::new(atlas_size as f32, 1.0 / atlas_size as f32, 0.0, 0.0),
        );
        list.push(FrameCommand::SetShadowVariant {
            filter: directional.filter,
            blend: directional.cascade_blend,
            mask: self.uses_shadowmask.then_some(self.settings.shadowmask),
        });

        Ok(())
    }
}

/// Grid position of a tile within the atlas
fn tile_offset_in_grid(index: usize, split: u32) -> (u32, u32) {
    let index = index as u32;
    (index % split, index / split)
}

/// Shading-time cascade-select data for one cascade.
///
/// The culling sphere is shrunk by the filter radius before squaring so a
/// filtered sample near the cascade edge never reads outside its tile.
fn cascade_select_data(culling_sphere: Vec4, tile_size: f32, filter_factor: f32) -> (Vec4, Vec4) {
    let texel_size = 2.0 * culling_sphere.w / tile_size;
    let filter_size = texel_size * filter_factor;
    let shrunk = (culling_sphere.w - filter_size).max(0.0);
    let sphere = Vec4::new(
        culling_sphere.x,
        culling_sphere.y,
        culling_sphere.z,
        shrunk * shrunk,
    );
    let data = Vec4::new(
        1.0 / (shrunk * shrunk).max(1e-4),
        filter_size * SQRT_2,
        0.0,
        0.0,
    );
    (sphere, data)
}

/// Remap a light-space clip matrix into atlas space: NDC [-1, 1] to the
/// tile's [0, 1] sub-rectangle, depth to [0, 1], with a sign flip when the
/// backend uses a reversed depth buffer.
fn to_atlas_matrix(
    m: Mat4,
    offset: (u32, u32),
    tile_scale: f32,
    depth_convention: DepthConvention,
) -> Mat4 {
    let (ox, oy) = (offset.0 as f32, offset.1 as f32);
    let mut cols = [m.x_axis, m.y_axis, m.z_axis, m.w_axis];
    for col in &mut cols {
        if depth_convention == DepthConvention::Reversed {
            col.z = -col.z;
        }
        let w = col.w;
        col.x = (0.5 * (col.x + w) + ox * w) * tile_scale;
        col.y = (0.5 * (col.y + w) + oy * w) * tile_scale;
        col.z = 0.5 * (col.z + w);
    }
    Mat4::from_cols(cols[0], cols[1], cols[2], cols[3])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::RecordingBackend;
    use crate::visibility::{Bounds, CascadeSlice};
    use glam::Vec3;

    struct FakeVisibility {
        has_casters: bool,
    }

    impl VisibilityResult for FakeVisibility {
        fn caster_bounds(&self, _light_index: usize) -> Option<Bounds> {
            self.has_casters
                .then(|| Bounds::new(Vec3::splat(-10.0), Vec3::splat(10.0)))
        }

        fn cascade_slice(
            &self,
            _light_index: usize,
            cascade: usize,
            _cascade_count: usize,
            _ratios: [f32; 3],
            _tile_size: u32,
            _near_plane_offset: f32,
        ) -> CascadeSlice {
            CascadeSlice {
                view: Mat4::IDENTITY,
                projection: Mat4::IDENTITY,
                culling_sphere: Vec4::new(0.0, 0.0, 0.0, 10.0 + 5.0 * cascade as f32),
            }
        }
    }

    fn shadowed_light() -> DirectionalLight {
        DirectionalLight::new(Vec3::new(-0.5, -1.0, -0.2), Vec3::ONE, 1.0).with_shadows(1.0)
    }

    fn atlas_with_reservations(count: usize) -> (ShadowAtlas, FakeVisibility) {
        let visibility = FakeVisibility { has_casters: true };
        let mut atlas = ShadowAtlas::new();
        atlas.begin_frame(&ShadowSettings::default());
        for i in 0..count {
            let reservation = atlas.reserve(&shadowed_light(), i, &visibility);
            assert!(reservation.has_shadow_map());
        }
        (atlas, visibility)
    }

    #[test]
    fn capacity_is_bounded_at_four_lights() {
        let visibility = FakeVisibility { has_casters: true };
        let mut atlas = ShadowAtlas::new();
        atlas.begin_frame(&ShadowSettings::default());

        for i in 0..MAX_SHADOWED_DIRECTIONAL_LIGHTS {
            let reservation = atlas.reserve(&shadowed_light(), i, &visibility);
            assert!(reservation.has_shadow_map());
            assert_eq!(reservation.tile_base, 4 * i);
        }
        assert_eq!(atlas.reserved_count(), 4);

        // The fifth light gets the sentinel
        let fifth = atlas.reserve(&shadowed_light(), 4, &visibility);
        assert_eq!(fifth, ShadowReservation::NONE);
        assert_eq!(atlas.reserved_count(), 4);
    }

    #[test]
    fn disabled_or_zero_strength_lights_get_the_sentinel() {
        let visibility = FakeVisibility { has_casters: true };
        let mut atlas = ShadowAtlas::new();
        atlas.begin_frame(&ShadowSettings::default());

        let unshadowed = DirectionalLight::new(Vec3::NEG_Y, Vec3::ONE, 1.0);
        assert_eq!(atlas.reserve(&unshadowed, 0, &visibility), ShadowReservation::NONE);

        let mut zero_strength = shadowed_light();
        zero_strength.shadow_strength = 0.0;
        assert_eq!(
            atlas.reserve(&zero_strength, 0, &visibility),
            ShadowReservation::NONE
        );
    }

    #[test]
    fn absent_caster_bounds_negates_strength() {
        let visibility = FakeVisibility { has_casters: false };
        let mut atlas = ShadowAtlas::new();
        atlas.begin_frame(&ShadowSettings::default());

        let mut light = shadowed_light();
        light.shadow_strength = 0.75;
        light.mask_channel = Some(2);
        let reservation = atlas.reserve(&light, 0, &visibility);
        assert_eq!(reservation.strength, -0.75);
        assert_eq!(reservation.mask_channel, 2);
        assert!(!reservation.has_shadow_map());
        assert_eq!(atlas.reserved_count(), 0);
    }

    #[test]
    fn empty_atlas_binds_a_dummy() {
        let mut backend = RecordingBackend::new(64, 64);
        let mut arena = TargetArena::new();
        let mut list = CommandList::new();
        let visibility = FakeVisibility { has_casters: true };
        let mut atlas = ShadowAtlas::new();
        atlas.begin_frame(&ShadowSettings::default());

        atlas
            .render(
                &mut backend,
                &mut arena,
                &mut list,
                &visibility,
                DepthConvention::Reversed,
            )
            .unwrap();

        let id = arena.get(TargetKey::ShadowAtlas).unwrap();
        assert_eq!(backend.target_desc(id).unwrap().width, 1);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn single_light_four_cascades_uses_split_two() {
        let mut settings = ShadowSettings::default();
        settings.directional.atlas_size = crate::settings::AtlasSize::Size2048;
        let visibility = FakeVisibility { has_casters: true };
        let mut atlas = ShadowAtlas::new();
        atlas.begin_frame(&settings);
        assert!(atlas.reserve(&shadowed_light(), 0, &visibility).has_shadow_map());

        let mut backend = RecordingBackend::new(64, 64);
        let mut arena = TargetArena::new();
        let mut list = CommandList::new();
        atlas
            .render(
                &mut backend,
                &mut arena,
                &mut list,
                &visibility,
                DepthConvention::Reversed,
            )
            .unwrap();

        // tiles = 4 -> split 2, tile size 1024, offsets over a 2x2 grid
        let viewports: Vec<Rect> = list
            .commands()
            .iter()
            .filter_map(|c| match c {
                FrameCommand::SetViewport(rect) => Some(*rect),
                _ => None,
            })
            .collect();
        assert_eq!(
            viewports,
            vec![
                Rect::new(0, 0, 1024, 1024),
                Rect::new(1024, 0, 1024, 1024),
                Rect::new(0, 1024, 1024, 1024),
                Rect::new(1024, 1024, 1024, 1024),
            ]
        );

        let id = arena.get(TargetKey::ShadowAtlas).unwrap();
        assert_eq!(backend.target_desc(id).unwrap().width, 2048);
    }

    #[test]
    fn split_thresholds() {
        for (lights, expected_split) in [(1usize, 2u32), (2, 4), (4, 4)] {
            let (mut atlas, visibility) = atlas_with_reservations(lights);
            let mut backend = RecordingBackend::new(64, 64);
            let mut arena = TargetArena::new();
            let mut list = CommandList::new();
            atlas
                .render(
                    &mut backend,
                    &mut arena,
                    &mut list,
                    &visibility,
                    DepthConvention::Reversed,
                )
                .unwrap();

            let atlas_size = ShadowSettings::default().directional.atlas_size.pixels();
            let tile = list
                .commands()
                .iter()
                .find_map(|c| match c {
                    FrameCommand::SetViewport(rect) => Some(rect.width),
                    _ => None,
                })
                .unwrap();
            assert_eq!(tile, atlas_size / expected_split);
            assert!(tile * expected_split <= atlas_size);
        }

        // One light with a single cascade fits in the whole atlas
        let visibility = FakeVisibility { has_casters: true };
        let mut settings = ShadowSettings::default();
        settings.directional.cascade_count = 1;
        let mut atlas = ShadowAtlas::new();
        atlas.begin_frame(&settings);
        assert!(atlas.reserve(&shadowed_light(), 0, &visibility).has_shadow_map());

        let mut backend = RecordingBackend::new(64, 64);
        let mut arena = TargetArena::new();
        let mut list = CommandList::new();
        atlas
            .render(
                &mut backend,
                &mut arena,
                &mut list,
                &visibility,
                DepthConvention::Reversed,
            )
            .unwrap();
        let tile = list
            .commands()
            .iter()
            .find_map(|c| match c {
                FrameCommand::SetViewport(rect) => Some(rect.width),
                _ => None,
            })
            .unwrap();
        assert_eq!(tile, settings.directional.atlas_size.pixels());
    }

    #[test]
    fn culling_sphere_shrink_is_bounded() {
        let sphere = Vec4::new(1.0, 2.0, 3.0, 20.0);
        let (shrunk, data) = cascade_select_data(sphere, 512.0, 4.0);
        let shrunk_radius = shrunk.w.sqrt();
        assert!(shrunk_radius <= sphere.w);
        assert!(shrunk_radius >= 0.0);
        assert!(data.y > 0.0);

        // A pathological tiny tile cannot drive the radius negative
        let (shrunk, _) = cascade_select_data(Vec4::new(0.0, 0.0, 0.0, 1.0), 1.0, 4.0);
        assert_eq!(shrunk.w, 0.0);
    }

    #[test]
    fn atlas_matrix_maps_ndc_into_tile() {
        // Identity clip matrix, tile (1, 0) of a 2x2 grid
        let m = to_atlas_matrix(Mat4::IDENTITY, (1, 0), 0.5, DepthConvention::Forward);
        // NDC (1, 1) lands at the tile's far corner (1.0, 0.5)
        let p = m * Vec4::new(1.0, 1.0, 0.0, 1.0);
        assert!((p.x - 1.0).abs() < 1e-6);
        assert!((p.y - 0.5).abs() < 1e-6);
        // NDC (-1, -1) lands at the tile origin (0.5, 0.0)
        let p = m * Vec4::new(-1.0, -1.0, 0.0, 1.0);
        assert!((p.x - 0.5).abs() < 1e-6);
        assert!((p.y - 0.0).abs() < 1e-6);
        // Depth remaps [-1, 1] to [0, 1]
        let p = m * Vec4::new(0.0, 0.0, -1.0, 1.0);
        assert!(p.z.abs() < 1e-6);
        let p = m * Vec4::new(0.0, 0.0, 1.0, 1.0);
        assert!((p.z - 1.0).abs() < 1e-6);
    }
}
