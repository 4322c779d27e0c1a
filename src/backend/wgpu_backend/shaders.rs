//! Built-in WGSL kernels for the post-effect passes
//!
//! Compact reference kernels so the backend works out of the box; hosts with
//! their own post shaders install them per pass via
//! [`WgpuBackend::set_post_shader`](super::WgpuBackend::set_post_shader).

/// Entry point name of the fullscreen vertex stage
pub const VS_ENTRY: &str = "vs_main";

/// Shared module containing the fullscreen triangle and all fragment stages
pub const POSTFX_SHADER: &str = r#"
struct PostFxUniform {
    bloom_threshold: vec4<f32>,
    color_adjustments: vec4<f32>,
    color_filter: vec4<f32>,
    white_balance: vec4<f32>,
    split_shadows: vec4<f32>,
    split_highlights: vec4<f32>,
    mixer_red: vec4<f32>,
    mixer_green: vec4<f32>,
    mixer_blue: vec4<f32>,
    smh_shadows: vec4<f32>,
    smh_midtones: vec4<f32>,
    smh_highlights: vec4<f32>,
    smh_range: vec4<f32>,
    lut_parameters: vec4<f32>,
    fxaa_config: vec4<f32>,
    buffer_size: vec4<f32>,
    // x: bloom intensity, y: bloom bicubic, z: copy bicubic, w: LUT in LogC
    misc: vec4<f32>,
}

@group(0) @binding(0) var source: texture_2d<f32>;
@group(0) @binding(1) var source_sampler: sampler;
@group(0) @binding(2) var<uniform> params: PostFxUniform;
@group(0) @binding(3) var source2: texture_2d<f32>;
@group(0) @binding(4) var lut: texture_2d<f32>;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var output: VertexOutput;
    let x = f32((vertex_index << 1u) & 2u);
    let y = f32(vertex_index & 2u);
    output.position = vec4<f32>(x * 2.0 - 1.0, y * 2.0 - 1.0, 0.0, 1.0);
    output.uv = vec2<f32>(x, 1.0 - y);
    return output;
}

fn get_source(uv: vec2<f32>) -> vec4<f32> {
    return textureSample(source, source_sampler, uv);
}

fn get_source2(uv: vec2<f32>) -> vec4<f32> {
    return textureSample(source2, source_sampler, uv);
}

@fragment
fn fs_copy(input: VertexOutput) -> @location(0) vec4<f32> {
    return get_source(input.uv);
}

fn apply_bloom_threshold(color: vec3<f32>) -> vec3<f32> {
    let t = params.bloom_threshold;
    let brightness = max(color.r, max(color.g, color.b));
    var soft = brightness + t.y;
    soft = clamp(soft, 0.0, t.z);
    soft = soft * soft * t.w;
    var contribution = max(soft, brightness - t.x);
    contribution = contribution / max(brightness, 0.00001);
    return color * contribution;
}

@fragment
fn fs_bloom_prefilter(input: VertexOutput) -> @location(0) vec4<f32> {
    let color = get_source(input.uv).rgb;
    return vec4<f32>(apply_bloom_threshold(color), 1.0);
}

fn luminance(color: vec3<f32>) -> f32 {
    return dot(color, vec3<f32>(0.2126, 0.7152, 0.0722));
}

@fragment
fn fs_bloom_prefilter_fireflies(input: VertexOutput) -> @location(0) vec4<f32> {
    // Luma-weighted average over a cross pattern suppresses isolated
    // over-bright pixels before they spread through the pyramid.
    var color = vec3<f32>(0.0);
    var weight_sum = 0.0;
    let texel = 1.0 / vec2<f32>(textureDimensions(source));
    for (var i = 0; i < 5; i = i + 1) {
        var offset = vec2<f32>(0.0);
        switch i {
            case 1: { offset = vec2<f32>(-1.0, -1.0); }
            case 2: { offset = vec2<f32>(1.0, -1.0); }
            case 3: { offset = vec2<f32>(-1.0, 1.0); }
            case 4: { offset = vec2<f32>(1.0, 1.0); }
            default: {}
        }
        let sample_color = apply_bloom_threshold(get_source(input.uv + offset * texel).rgb);
        let weight = 1.0 / (luminance(sample_color) + 1.0);
        color = color + sample_color * weight;
        weight_sum = weight_sum + weight;
    }
    return vec4<f32>(color / weight_sum, 1.0);
}

@fragment
fn fs_bloom_horizontal(input: VertexOutput) -> @location(0) vec4<f32> {
    var color = vec3<f32>(0.0);
    var offsets = array<f32, 9>(-4.0, -3.0, -2.0, -1.0, 0.0, 1.0, 2.0, 3.0, 4.0);
    var weights = array<f32, 9>(
        0.01621622, 0.05405405, 0.12162162, 0.19459459, 0.22702703,
        0.19459459, 0.12162162, 0.05405405, 0.01621622
    );
    let texel_x = 1.0 / f32(textureDimensions(source).x);
    for (var i = 0; i < 9; i = i + 1) {
        let uv = input.uv + vec2<f32>(offsets[i] * texel_x, 0.0);
        color = color + get_source(uv).rgb * weights[i];
    }
    return vec4<f32>(color, 1.0);
}

@fragment
fn fs_bloom_vertical(input: VertexOutput) -> @location(0) vec4<f32> {
    var color = vec3<f32>(0.0);
    // Bilinear-offset taps halve the sample count of the 9-tap kernel
    var offsets = array<f32, 5>(-3.23076923, -1.38461538, 0.0, 1.38461538, 3.23076923);
    var weights = array<f32, 5>(0.07027027, 0.31621622, 0.22702703, 0.31621622, 0.07027027);
    let texel_y = 1.0 / f32(textureDimensions(source).y);
    for (var i = 0; i < 5; i = i + 1) {
        let uv = input.uv + vec2<f32>(0.0, offsets[i] * texel_y);
        color = color + get_source(uv).rgb * weights[i];
    }
    return vec4<f32>(color, 1.0);
}

@fragment
fn fs_bloom_add(input: VertexOutput) -> @location(0) vec4<f32> {
    let low = get_source(input.uv).rgb;
    let high = get_source2(input.uv);
    return vec4<f32>(low * params.misc.x + high.rgb, high.a);
}

@fragment
fn fs_bloom_scatter(input: VertexOutput) -> @location(0) vec4<f32> {
    let low = get_source(input.uv).rgb;
    let high = get_source2(input.uv);
    return vec4<f32>(mix(high.rgb, low, params.misc.x), high.a);
}

@fragment
fn fs_bloom_scatter_final(input: VertexOutput) -> @location(0) vec4<f32> {
    var low = get_source(input.uv).rgb;
    let high = get_source2(input.uv);
    // Put back the light lost to the prefilter threshold
    low = low + high.rgb - apply_bloom_threshold(high.rgb);
    return vec4<f32>(mix(high.rgb, low, params.misc.x), high.a);
}

// ACES-style LogC encoding used for HDR LUT bakes
fn logc_to_linear(x: vec3<f32>) -> vec3<f32> {
    return (pow(vec3<f32>(10.0), (x - 0.386036) / 0.244161) - 0.047996) / 5.555556;
}

fn lut_strip_value(uv_in: vec2<f32>) -> vec3<f32> {
    let p = params.lut_parameters;
    let uv = uv_in - p.yz;
    var color: vec3<f32>;
    color.r = fract(uv.x * p.x);
    color.b = uv.x - color.r / p.x;
    color.g = uv.y;
    return color * p.w;
}

fn grade(color_in: vec3<f32>) -> vec3<f32> {
    var color = color_in * params.color_adjustments.x;
    color = color * params.color_filter.rgb;
    let gray = luminance(color);
    color = mix(vec3<f32>(gray), color, params.color_adjustments.w);
    return max(color, vec3<f32>(0.0));
}

fn aces_tonemap(color: vec3<f32>) -> vec3<f32> {
    let a = 2.51;
    let b = 0.03;
    let c = 2.43;
    let d = 0.59;
    let e = 0.14;
    return saturate((color * (a * color + b)) / (color * (c * color + d) + e));
}

fn neutral_tonemap(color: vec3<f32>) -> vec3<f32> {
    // Hable-style curve normalized to white
    let a = 0.2;
    let b = 0.29;
    let c = 0.24;
    let d = 0.272;
    let e = 0.02;
    let f = 0.3;
    let white = 5.3;
    let curve = ((color * (a * color + c * b) + d * e) / (color * (a * color + b) + d * f)) - e / f;
    let white_scale = ((white * (a * white + c * b) + d * e) / (white * (a * white + b) + d * f)) - e / f;
    return saturate(curve / white_scale);
}

fn lut_source(uv: vec2<f32>) -> vec3<f32> {
    var color = lut_strip_value(uv);
    if params.misc.w > 0.5 {
        color = logc_to_linear(color);
    }
    return grade(color);
}

@fragment
fn fs_grading_none(input: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(lut_source(input.uv), 1.0);
}

@fragment
fn fs_grading_aces(input: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(aces_tonemap(lut_source(input.uv)), 1.0);
}

@fragment
fn fs_grading_neutral(input: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(neutral_tonemap(lut_source(input.uv)), 1.0);
}

@fragment
fn fs_grading_reinhard(input: VertexOutput) -> @location(0) vec4<f32> {
    let color = lut_source(input.uv);
    return vec4<f32>(color / (color + vec3<f32>(1.0)), 1.0);
}

fn apply_lut(color_in: vec3<f32>) -> vec3<f32> {
    // scale_offset = (1/width, 1/height, height - 1)
    let so = params.lut_parameters.xyz;
    let color = saturate(color_in);
    var z = color.b * so.z;
    let shift = floor(z);
    var uv = color.rg * so.z * so.xy + so.xy * 0.5;
    uv.x = uv.x + shift * so.y;
    let a = textureSampleLevel(lut, source_sampler, uv, 0.0).rgb;
    let b = textureSampleLevel(lut, source_sampler, uv + vec2<f32>(so.y, 0.0), 0.0).rgb;
    return mix(a, b, z - shift);
}

@fragment
fn fs_apply_grading(input: VertexOutput) -> @location(0) vec4<f32> {
    let color = get_source(input.uv);
    return vec4<f32>(apply_lut(color.rgb), color.a);
}

@fragment
fn fs_apply_grading_luma(input: VertexOutput) -> @location(0) vec4<f32> {
    let color = get_source(input.uv);
    let graded = apply_lut(color.rgb);
    return vec4<f32>(graded, luminance(graded));
}

@fragment
fn fs_fxaa(input: VertexOutput) -> @location(0) vec4<f32> {
    // Reference kernel: edge-blend against the brightest axis neighbor.
    // Hosts wanting full FXAA 3.11 install it via set_post_shader.
    let texel = params.buffer_size.xy;
    let center = get_source(input.uv);
    let north = get_source(input.uv + vec2<f32>(0.0, -texel.y)).a;
    let south = get_source(input.uv + vec2<f32>(0.0, texel.y)).a;
    let east = get_source(input.uv + vec2<f32>(texel.x, 0.0)).a;
    let west = get_source(input.uv + vec2<f32>(-texel.x, 0.0)).a;
    let high = max(max(north, south), max(east, west));
    let low = min(min(north, south), min(east, west));
    let range = high - max(low, 0.0);
    if range < max(params.fxaa_config.x, params.fxaa_config.y * high) {
        return center;
    }
    let blend = params.fxaa_config.z * 0.25;
    let neighborhood =
        get_source(input.uv + vec2<f32>(0.0, -texel.y)).rgb +
        get_source(input.uv + vec2<f32>(0.0, texel.y)).rgb +
        get_source(input.uv + vec2<f32>(texel.x, 0.0)).rgb +
        get_source(input.uv + vec2<f32>(-texel.x, 0.0)).rgb;
    return vec4<f32>(mix(center.rgb, neighborhood * 0.25, blend), center.a);
}

@fragment
fn fs_final_rescale(input: VertexOutput) -> @location(0) vec4<f32> {
    // TODO: implement the 4-tap Catmull-Rom path for misc.z (bicubic);
    // bilinear stands in for both modes until then.
    return get_source(input.uv);
}
"#;
