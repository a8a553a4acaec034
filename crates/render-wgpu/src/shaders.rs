use deferlight_render::ProgramKind;

/// Uniform blocks and vertex input shared by every program.
const COMMON: &str = r#"
struct LightData {
    position: vec4<f32>,
    color: vec4<f32>,
    // constant, linear, quadratic, radius
    attenuation: vec4<f32>,
};

struct Globals {
    world_proj: mat4x4<f32>,
    world_view: mat4x4<f32>,
    world_inverse: mat4x4<f32>,
    eye: vec4<f32>,
    light_pos: vec4<f32>,
    params: vec4<u32>,
    lights: array<LightData, 64>,
};

struct Draw {
    model: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
    diffuse: vec4<f32>,
    specular: vec4<f32>,
    volume_color: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> globals: Globals;

@group(1) @binding(0)
var<uniform> draw: Draw;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
};
"#;

/// Writes world position, normal, diffuse and specular into the G-buffer.
const GEOMETRY: &str = r#"
struct GeometryOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) world_normal: vec3<f32>,
};

struct GBuffer {
    @location(0) position: vec4<f32>,
    @location(1) normal: vec4<f32>,
    @location(2) diffuse: vec4<f32>,
    @location(3) specular: vec4<f32>,
};

@vertex
fn vs_main(vertex: VertexInput) -> GeometryOutput {
    let world = draw.model * vec4<f32>(vertex.position, 1.0);
    var out: GeometryOutput;
    out.clip_position = globals.world_proj * globals.world_view * world;
    out.world_position = world.xyz;
    out.world_normal = (draw.normal_matrix * vec4<f32>(vertex.normal, 0.0)).xyz;
    return out;
}

@fragment
fn fs_main(in: GeometryOutput) -> GBuffer {
    var out: GBuffer;
    out.position = vec4<f32>(in.world_position, 1.0);
    out.normal = vec4<f32>(normalize(in.world_normal), 0.0);
    out.diffuse = vec4<f32>(draw.diffuse.rgb, 1.0);
    out.specular = draw.specular;
    return out;
}
"#;

/// Full-screen shading from the G-buffer. Mode 1 shows normals, mode 2
/// shows unlit diffuse, anything else is the lit image.
const LIGHTING: &str = r#"
@group(2) @binding(0) var g_position: texture_2d<f32>;
@group(2) @binding(1) var g_normal: texture_2d<f32>;
@group(2) @binding(2) var g_diffuse: texture_2d<f32>;
@group(2) @binding(3) var g_specular: texture_2d<f32>;
@group(2) @binding(4) var g_sampler: sampler;

@vertex
fn vs_main(vertex: VertexInput) -> @builtin(position) vec4<f32> {
    return vec4<f32>(vertex.position.xy, 0.0, 1.0);
}

@fragment
fn fs_main(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    let uv = frag.xy / vec2<f32>(textureDimensions(g_position));
    let position = textureSample(g_position, g_sampler, uv);
    let normal_sample = textureSample(g_normal, g_sampler, uv).xyz;
    let diffuse = textureSample(g_diffuse, g_sampler, uv).rgb;
    let specular = textureSample(g_specular, g_sampler, uv);

    // Nothing was drawn here.
    if (position.w == 0.0) {
        return vec4<f32>(0.0, 0.0, 0.0, 1.0);
    }
    let n = normalize(normal_sample);
    let mode = globals.params.x;
    if (mode == 1u) {
        return vec4<f32>(n * 0.5 + 0.5, 1.0);
    }
    if (mode == 2u) {
        return vec4<f32>(diffuse, 1.0);
    }

    let p = position.xyz;
    let v = normalize(globals.eye.xyz - p);
    let key = normalize(globals.light_pos.xyz - p);
    var color = diffuse * (0.1 + 0.1 * max(dot(n, key), 0.0));

    let count = min(globals.params.y, 64u);
    for (var i = 0u; i < count; i = i + 1u) {
        let light = globals.lights[i];
        let to_light = light.position.xyz - p;
        let d = length(to_light);
        if (d < light.attenuation.w && d > 0.0) {
            let l = to_light / d;
            let h = normalize(l + v);
            let falloff = 1.0 / (light.attenuation.x + light.attenuation.y * d
                + light.attenuation.z * d * d);
            let lambert = max(dot(n, l), 0.0) * diffuse;
            let phong = pow(max(dot(n, h), 0.0), max(specular.w, 1.0)) * specular.rgb;
            color = color + (lambert + phong) * light.color.rgb * falloff;
        }
    }
    return vec4<f32>(color, 1.0);
}
"#;

/// Flat-colored light volume, blended additively.
const LIGHT_VOLUME: &str = r#"
@vertex
fn vs_main(vertex: VertexInput) -> @builtin(position) vec4<f32> {
    return globals.world_proj * globals.world_view * draw.model * vec4<f32>(vertex.position, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(draw.volume_color.rgb, 1.0);
}
"#;

/// Complete WGSL source of a program.
pub(crate) fn source(kind: ProgramKind) -> String {
    let body = match kind {
        ProgramKind::Geometry => GEOMETRY,
        ProgramKind::Lighting => LIGHTING,
        ProgramKind::LightVolume => LIGHT_VOLUME,
    };
    format!("{COMMON}{body}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_program_has_both_entry_points() {
        for kind in [
            ProgramKind::Geometry,
            ProgramKind::Lighting,
            ProgramKind::LightVolume,
        ] {
            let src = source(kind);
            assert!(src.contains("fn vs_main"), "{kind:?}");
            assert!(src.contains("fn fs_main"), "{kind:?}");
            assert!(src.contains("var<uniform> globals"), "{kind:?}");
        }
    }

    #[test]
    fn light_array_matches_capacity() {
        let src = source(ProgramKind::Lighting);
        assert!(src.contains(&format!("array<LightData, {}>", deferlight_scene::MAX_LIGHTS)));
    }
}
