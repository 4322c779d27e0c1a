//! Visibility query seam and directional cascade fitting
//!
//! Culling itself is an external collaborator: the renderer issues one
//! [`CullingRequest`] per camera and consumes the result through the
//! [`VisibilityResult`] trait. A reference [`CascadeFitter`] is provided for
//! implementors that do not bring their own cascade math.

use glam::{Mat4, Vec3, Vec4};

/// Axis-aligned world-space bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }
}

/// Parameters of a per-camera culling request
#[derive(Debug, Clone)]
pub struct CullingRequest {
    pub view: Mat4,
    pub projection: Mat4,
    pub near: f32,
    pub far: f32,
    /// Shadow render distance, already bounded by the camera far plane
    pub shadow_distance: f32,
    pub layer_mask: u32,
}

/// One cascade's fitted matrices and culling sphere
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CascadeSlice {
    pub view: Mat4,
    pub projection: Mat4,
    /// xyz = world center, w = radius
    pub culling_sphere: Vec4,
}

/// Result of a culling request
pub trait VisibilityResult {
    /// Bounds of the shadow casters relevant to the given light, absent when
    /// the light affects nothing shadow-relevant in view
    fn caster_bounds(&self, light_index: usize) -> Option<Bounds>;

    /// Fitted view/projection/culling-sphere for one cascade of a light
    fn cascade_slice(
        &self,
        light_index: usize,
        cascade: usize,
        cascade_count: usize,
        ratios: [f32; 3],
        tile_size: u32,
        near_plane_offset: f32,
    ) -> CascadeSlice;
}

/// The external visibility collaborator
pub trait VisibilityQuery {
    /// Run culling for a camera. `None` means the frustum was degenerate and
    /// the camera's frame must be skipped.
    fn cull(&mut self, request: &CullingRequest) -> Option<Box<dyn VisibilityResult>>;
}

/// Cumulative cascade end distances derived from the split ratios.
///
/// The last cascade always ends at the full shadow distance; unused ratio
/// slots are ignored for lower cascade counts.
pub fn cascade_split_ends(
    cascade_count: usize,
    ratios: [f32; 3],
    shadow_distance: f32,
) -> [f32; 4] {
    debug_assert!((1..=4).contains(&cascade_count));
    let mut ends = [shadow_distance; 4];
    for (i, end) in ends.iter_mut().enumerate().take(cascade_count) {
        if i + 1 < cascade_count {
            *end = ratios[i] * shadow_distance;
        }
    }
    ends
}

/// Practical split scheme: blend of uniform and logarithmic distributions.
///
/// Returns cumulative ratios suitable for
/// [`DirectionalShadows::cascade_ratios`](crate::settings::DirectionalShadows).
pub fn practical_split_ratios(cascade_count: usize, near: f32, far: f32, lambda: f32) -> [f32; 3] {
    let mut ratios = [1.0f32; 3];
    let range = far - near;
    let log_ratio = far / near.max(1e-4);
    for (i, ratio) in ratios.iter_mut().enumerate().take(cascade_count.saturating_sub(1)) {
        let t = (i + 1) as f32 / cascade_count as f32;
        let uniform = near + t * range;
        let logarithmic = near * log_ratio.powf(t);
        let split = lambda * logarithmic + (1.0 - lambda) * uniform;
        *ratio = (split / far).clamp(0.0, 1.0);
    }
    ratios
}

/// Reference directional-cascade fitter.
///
/// Slices the camera frustum by view depth, bounds each slice with a sphere,
/// snaps the sphere center to the shadow-map texel grid to keep cascades
/// stable under camera motion, and builds a light-space orthographic
/// projection over the sphere.
#[derive(Debug, Clone)]
pub struct CascadeFitter {
    eye: Vec3,
    far_corners: [Vec3; 4],
    near: f32,
    far: f32,
    shadow_distance: f32,
}

impl CascadeFitter {
    pub fn new(view: Mat4, projection: Mat4, near: f32, far: f32, shadow_distance: f32) -> Self {
        let inv_view = view.inverse();
        let eye = inv_view.w_axis.truncate();
        let inv_view_proj = (projection * view).inverse();

        // Far-plane corners; perspective frusta scale linearly with view
        // depth from the eye, so slice corners are lerps along these rays.
        let ndc_corners = [
            Vec3::new(-1.0, -1.0, 1.0),
            Vec3::new(1.0, -1.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(-1.0, 1.0, 1.0),
        ];
        let mut far_corners = [Vec3::ZERO; 4];
        for (corner, ndc) in far_corners.iter_mut().zip(ndc_corners) {
            let world = inv_view_proj * ndc.extend(1.0);
            *corner = (world / world.w).truncate();
        }

        Self {
            eye,
            far_corners,
            near,
            far,
            shadow_distance: shadow_distance.min(far),
        }
    }

    /// World-space corners of the frustum slice covering view depths
    /// `[begin, end]`
    fn slice_corners(&self, begin: f32, end: f32) -> [Vec3; 8] {
        let mut corners = [Vec3::ZERO; 8];
        let t0 = begin / self.far;
        let t1 = end / self.far;
        for i in 0..4 {
            let ray = self.far_corners[i] - self.eye;
            corners[i] = self.eye + ray * t0;
            corners[i + 4] = self.eye + ray * t1;
        }
        corners
    }

    /// Fit one cascade of a directional light
    pub fn fit(
        &self,
        light_direction: Vec3,
        cascade: usize,
        cascade_count: usize,
        ratios: [f32; 3],
        tile_size: u32,
        near_plane_offset: f32,
    ) -> CascadeSlice {
        let ends = cascade_split_ends(cascade_count, ratios, self.shadow_distance);
        let begin = if cascade == 0 { self.near } else { ends[cascade - 1] };
        let end = ends[cascade];
        let corners = self.slice_corners(begin, end);

        // Bounding sphere of the slice
        let mut center = Vec3::ZERO;
        for corner in &corners {
            center += *corner;
        }
        center /= corners.len() as f32;
        let mut radius = 0.0f32;
        for corner in &corners {
            radius = radius.max(corner.distance(center));
        }

        let light_dir = light_direction.normalize_or_zero();
        let light_dir = if light_dir.length_squared() < 1e-6 {
            -Vec3::Y
        } else {
            light_dir
        };
        let up = if light_dir.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y };

        // Snap the sphere center to the texel grid in light space so the
        // cascade does not shimmer as the camera moves.
        let snap_view = Mat4::look_to_rh(Vec3::ZERO, light_dir, up);
        let units_per_texel = 2.0 * radius / tile_size.max(1) as f32;
        let mut light_center = snap_view.transform_point3(center);
        light_center.x = (light_center.x / units_per_texel).floor() * units_per_texel;
        light_center.y = (light_center.y / units_per_texel).floor() * units_per_texel;
        center = snap_view.inverse().transform_point3(light_center);

        let pullback = radius + near_plane_offset;
        let view = Mat4::look_to_rh(center - light_dir * pullback, light_dir, up);
        let projection = Mat4::orthographic_rh(
            -radius,
            radius,
            -radius,
            radius,
            0.0,
            2.0 * radius + near_plane_offset,
        );

        CascadeSlice {
            view,
            projection,
            culling_sphere: center.extend(radius),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_fitter() -> CascadeFitter {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 3.0, 10.0), Vec3::ZERO, Vec3::Y);
        let projection = Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.1, 200.0);
        CascadeFitter::new(view, projection, 0.1, 200.0, 100.0)
    }

    #[test]
    fn split_ends_are_cumulative_and_capped() {
        let ends = cascade_split_ends(4, [0.1, 0.25, 0.5], 100.0);
        assert_eq!(ends, [10.0, 25.0, 50.0, 100.0]);

        let ends = cascade_split_ends(1, [0.1, 0.25, 0.5], 80.0);
        assert_eq!(ends[0], 80.0);
    }

    #[test]
    fn practical_splits_are_monotonic() {
        let ratios = practical_split_ratios(4, 0.1, 100.0, 0.75);
        assert!(ratios[0] < ratios[1]);
        assert!(ratios[1] < ratios[2]);
        assert!(ratios[2] <= 1.0);
        assert!(ratios[0] > 0.0);
    }

    #[test]
    fn cascade_radii_are_non_decreasing() {
        let fitter = test_fitter();
        let light = Vec3::new(-0.4, -1.0, -0.3);
        let mut previous = 0.0f32;
        for cascade in 0..4 {
            let slice = fitter.fit(light, cascade, 4, [0.1, 0.25, 0.5], 1024, 0.0);
            assert!(slice.culling_sphere.w >= previous);
            previous = slice.culling_sphere.w;
        }
    }

    #[test]
    fn culling_sphere_contains_its_slice() {
        let fitter = test_fitter();
        let slice = fitter.fit(Vec3::new(0.0, -1.0, 0.0), 1, 4, [0.1, 0.25, 0.5], 1024, 0.0);
        let corners = fitter.slice_corners(10.0, 25.0);
        let center = slice.culling_sphere.truncate();
        // Texel snapping moves the center by less than one texel in each axis
        let slack = 2.0 * slice.culling_sphere.w / 1024.0 * 2.0;
        for corner in corners {
            assert!(corner.distance(center) <= slice.culling_sphere.w + slack);
        }
    }

    #[test]
    fn straight_down_light_does_not_degenerate() {
        let fitter = test_fitter();
        let slice = fitter.fit(Vec3::new(0.0, -1.0, 0.0), 0, 4, [0.1, 0.25, 0.5], 512, 0.5);
        assert!(slice.view.is_finite());
        assert!(slice.projection.is_finite());
        assert!(slice.culling_sphere.w > 0.0);
    }
}
