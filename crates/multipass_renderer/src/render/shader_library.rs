//! GLSL shader library
//!
//! Fixed sources the renderer assembles its programs from. Material programs are
//! built as `COMMON_HEADER + pass vertex source` and `COMMON_HEADER + material
//! functions + pass fragment template`; utility programs (depth, variance, blur,
//! bloom, tone mapping, copy, highlight) are used as they are.

use crate::material::{
    DiffuseShader, EmissiveShader, MaterialDefinition, NormalMapShader, RefractionShader, ShininessShader,
};

use super::shader_cache::PassKind;

/// Texture unit of the accumulated diffuse lighting buffer
pub const DIFFUSE_LIGHT_UNIT: u32 = 4;
/// Texture unit of the accumulated specular lighting buffer
pub const SPECULAR_LIGHT_UNIT: u32 = 5;
/// Texture unit of the refraction background copy
pub const BACKGROUND_UNIT: u32 = 6;
/// Texture unit of the shadow map
pub const SHADOW_MAP_UNIT: u32 = 7;
/// Texture unit fullscreen passes read their source from
pub const SOURCE_UNIT: u32 = 0;
/// Texture unit of the bloom buffer during tone mapping
pub const BLOOM_UNIT: u32 = 1;

/// Prepended to every stage
pub const COMMON_HEADER: &str = r"#version 330 core
#define PI 3.14159265359
";

/// Vertex stage of every mesh pass
pub const MESH_VERTEX: &str = r"
layout(location = 0) in vec3 a_position;
layout(location = 1) in vec3 a_normal;
layout(location = 2) in vec2 a_tex_coord;
layout(location = 3) in vec3 a_tangent;

uniform mat4 u_model;
uniform mat4 u_view_projection;

out vec3 v_world_position;
out vec3 v_normal;
out vec2 v_tex_coord;
out vec3 v_tangent;
out vec4 v_clip_position;

void main() {
    vec4 world = u_model * vec4(a_position, 1.0);
    mat3 normal_matrix = transpose(inverse(mat3(u_model)));
    v_world_position = world.xyz;
    v_normal = normalize(normal_matrix * a_normal);
    v_tangent = normalize(normal_matrix * a_tangent);
    v_tex_coord = a_tex_coord;
    v_clip_position = u_view_projection * world;
    gl_Position = v_clip_position;
}
";

const DIFFUSE_FLAT: &str = r"
uniform vec4 u_diffuse_color;
vec4 material_diffuse(vec2 uv) { return u_diffuse_color; }
";

const DIFFUSE_TEXTURED: &str = r"
uniform vec4 u_diffuse_color;
uniform sampler2D u_diffuse_texture;
vec4 material_diffuse(vec2 uv) { return u_diffuse_color * texture(u_diffuse_texture, uv); }
";

const EMISSIVE_NONE: &str = r"
vec3 material_emissive(vec2 uv) { return vec3(0.0); }
";

const EMISSIVE_FLAT: &str = r"
uniform vec3 u_emissive_color;
vec3 material_emissive(vec2 uv) { return u_emissive_color; }
";

const EMISSIVE_TEXTURED: &str = r"
uniform vec3 u_emissive_color;
uniform sampler2D u_emissive_texture;
vec3 material_emissive(vec2 uv) { return u_emissive_color * texture(u_emissive_texture, uv).rgb; }
";

const SHININESS_CONSTANT: &str = r"
uniform float u_shininess;
uniform vec3 u_specular_color;
float material_shininess(vec2 uv) { return u_shininess; }
";

const SHININESS_TEXTURED: &str = r"
uniform float u_shininess;
uniform vec3 u_specular_color;
uniform sampler2D u_shininess_texture;
float material_shininess(vec2 uv) { return u_shininess * texture(u_shininess_texture, uv).r; }
";

const REFRACTION_NONE: &str = r"
vec2 material_refraction_offset(vec3 view_normal) { return vec2(0.0); }
";

const REFRACTION_SCREEN: &str = r"
uniform float u_refraction_strength;
vec2 material_refraction_offset(vec3 view_normal) { return view_normal.xy * u_refraction_strength; }
";

const NORMAL_VERTEX: &str = r"
vec3 material_normal(vec3 normal, vec3 tangent, vec2 uv) { return normalize(normal); }
";

const NORMAL_TEXTURED: &str = r"
uniform sampler2D u_normal_texture;
uniform bool u_normal_mapping;
vec3 material_normal(vec3 normal, vec3 tangent, vec2 uv) {
    vec3 n = normalize(normal);
    if (!u_normal_mapping) {
        return n;
    }
    vec3 t = normalize(tangent - dot(tangent, n) * n);
    mat3 tbn = mat3(t, cross(n, t), n);
    return normalize(tbn * (texture(u_normal_texture, uv).xyz * 2.0 - 1.0));
}
";

/// Inputs and helpers shared by the lighting templates
const LIGHTING_COMMON: &str = r"
in vec3 v_world_position;
in vec3 v_normal;
in vec2 v_tex_coord;
in vec3 v_tangent;

uniform vec3 u_camera_position;
uniform vec3 u_light_color;

layout(location = 1) out vec4 o_diffuse;
layout(location = 2) out vec4 o_specular;

void write_light(vec3 to_light, float intensity) {
    vec3 n = material_normal(v_normal, v_tangent, v_tex_coord);
    vec3 view = normalize(u_camera_position - v_world_position);
    float lambert = max(dot(n, to_light), 0.0);
    float specular = pow(max(dot(n, normalize(to_light + view)), 0.0), material_shininess(v_tex_coord));
    o_diffuse = vec4(u_light_color * lambert * intensity, 1.0);
    o_specular = vec4(u_light_color * u_specular_color * specular * intensity * step(0.0, lambert), 1.0);
}

float attenuate(vec3 attenuation, float distance) {
    return 1.0 / max(attenuation.x + attenuation.y * distance + attenuation.z * distance * distance, 1e-6);
}
";

/// Variance shadow lookup shared by the shadowed templates
const SHADOW_COMMON: &str = r"
uniform float u_shadow_far_plane;
uniform float u_shadow_intensity;

float chebyshev_visibility(vec2 moments, float depth) {
    if (depth <= moments.x) {
        return 1.0;
    }
    float variance = max(moments.y - moments.x * moments.x, 0.00002);
    float d = depth - moments.x;
    float p_max = variance / (variance + d * d);
    return clamp((p_max - 0.2) / 0.8, 0.0, 1.0);
}

float shadow_factor(float visibility) {
    return mix(u_shadow_intensity, 1.0, visibility);
}
";

const AMBIENT_FRAGMENT: &str = r"
void main() {
    o_diffuse = vec4(u_light_color, 1.0);
    o_specular = vec4(0.0);
}
";

const DIRECTIONAL_FRAGMENT: &str = r"
uniform vec3 u_light_direction;
void main() {
    write_light(normalize(-u_light_direction), 1.0);
}
";

const POINT_FRAGMENT: &str = r"
uniform vec3 u_light_position;
uniform vec3 u_light_attenuation;
uniform float u_light_radius;
void main() {
    vec3 to_light = u_light_position - v_world_position;
    float distance = length(to_light);
    if (distance > u_light_radius) {
        discard;
    }
    write_light(to_light / distance, attenuate(u_light_attenuation, distance));
}
";

const SPOT_FRAGMENT: &str = r"
uniform vec3 u_light_position;
uniform vec3 u_light_direction;
uniform vec3 u_light_attenuation;
uniform float u_light_radius;
uniform float u_light_cos_inner;
uniform float u_light_cos_outer;
float spot_intensity(vec3 to_light, float distance) {
    float cos_angle = dot(-to_light, normalize(u_light_direction));
    float cone = clamp((cos_angle - u_light_cos_outer) / max(u_light_cos_inner - u_light_cos_outer, 1e-4), 0.0, 1.0);
    return cone * attenuate(u_light_attenuation, distance);
}
void main() {
    vec3 to_light = u_light_position - v_world_position;
    float distance = length(to_light);
    if (distance > u_light_radius) {
        discard;
    }
    write_light(to_light / distance, spot_intensity(to_light / distance, distance));
}
";

const DIRECTIONAL_SHADOW_FRAGMENT: &str = r"
uniform vec3 u_light_direction;
uniform mat4 u_light_view_projection;
uniform mat4 u_light_view;
uniform sampler2D u_shadow_map;
void main() {
    vec4 light_clip = u_light_view_projection * vec4(v_world_position, 1.0);
    vec2 uv = light_clip.xy / light_clip.w * 0.5 + 0.5;
    float depth = -(u_light_view * vec4(v_world_position, 1.0)).z / u_shadow_far_plane;
    float visibility = chebyshev_visibility(texture(u_shadow_map, uv).rg, depth);
    write_light(normalize(-u_light_direction), shadow_factor(visibility));
}
";

const POINT_SHADOW_FRAGMENT: &str = r"
uniform vec3 u_light_position;
uniform vec3 u_light_attenuation;
uniform float u_light_radius;
uniform samplerCube u_shadow_map;
void main() {
    vec3 to_light = u_light_position - v_world_position;
    float distance = length(to_light);
    if (distance > u_light_radius) {
        discard;
    }
    float visibility = chebyshev_visibility(texture(u_shadow_map, -to_light).rg, distance / u_shadow_far_plane);
    write_light(to_light / distance, attenuate(u_light_attenuation, distance) * shadow_factor(visibility));
}
";

const SPOT_SHADOW_FRAGMENT: &str = r"
uniform vec3 u_light_position;
uniform vec3 u_light_direction;
uniform vec3 u_light_attenuation;
uniform float u_light_radius;
uniform float u_light_cos_inner;
uniform float u_light_cos_outer;
uniform mat4 u_light_view_projection;
uniform sampler2D u_shadow_map;
void main() {
    vec3 to_light = u_light_position - v_world_position;
    float distance = length(to_light);
    if (distance > u_light_radius) {
        discard;
    }
    vec3 l = to_light / distance;
    float cos_angle = dot(-l, normalize(u_light_direction));
    float cone = clamp((cos_angle - u_light_cos_outer) / max(u_light_cos_inner - u_light_cos_outer, 1e-4), 0.0, 1.0);
    vec4 light_clip = u_light_view_projection * vec4(v_world_position, 1.0);
    vec2 uv = light_clip.xy / light_clip.w * 0.5 + 0.5;
    float visibility = chebyshev_visibility(texture(u_shadow_map, uv).rg, distance / u_shadow_far_plane);
    write_light(l, cone * attenuate(u_light_attenuation, distance) * shadow_factor(visibility));
}
";

const MATERIAL_FRAGMENT: &str = r"
in vec3 v_world_position;
in vec3 v_normal;
in vec2 v_tex_coord;
in vec3 v_tangent;
in vec4 v_clip_position;

uniform sampler2D u_diffuse_light;
uniform sampler2D u_specular_light;
uniform sampler2D u_background;
uniform bool u_use_background;
uniform mat4 u_view;

layout(location = 0) out vec4 o_color;

void main() {
    vec2 screen_uv = v_clip_position.xy / v_clip_position.w * 0.5 + 0.5;
    vec4 diffuse = material_diffuse(v_tex_coord);
    vec3 light = texture(u_diffuse_light, screen_uv).rgb;
    vec3 specular = texture(u_specular_light, screen_uv).rgb;
    vec3 color = diffuse.rgb * light + specular + material_emissive(v_tex_coord);
    if (u_use_background) {
        vec3 view_normal = mat3(u_view) * material_normal(v_normal, v_tangent, v_tex_coord);
        vec3 behind = texture(u_background, screen_uv + material_refraction_offset(view_normal)).rgb;
        color = mix(behind, color, diffuse.a);
        o_color = vec4(color, 1.0);
    } else {
        o_color = vec4(color, diffuse.a);
    }
}
";

/// Depth pre-pass fragment stage (no color output)
pub const DEPTH_FRAGMENT: &str = r"
void main() {}
";

/// Selection overlay fragment stage
pub const HIGHLIGHT_FRAGMENT: &str = r"
uniform vec4 u_color;
layout(location = 0) out vec4 o_color;
void main() {
    o_color = u_color;
}
";

/// Variance shadow vertex stage
pub const VARIANCE_VERTEX: &str = r"
layout(location = 0) in vec3 a_position;
uniform mat4 u_model;
uniform mat4 u_light_view_projection;
out vec3 v_world_position;
void main() {
    vec4 world = u_model * vec4(a_position, 1.0);
    v_world_position = world.xyz;
    gl_Position = u_light_view_projection * world;
}
";

/// Variance shadow fragment stage writing `(d, d^2)`
pub const VARIANCE_FRAGMENT: &str = r"
in vec3 v_world_position;
uniform vec3 u_shadow_origin;
uniform vec3 u_light_direction;
uniform bool u_directional;
uniform float u_shadow_far_plane;
layout(location = 0) out vec4 o_moments;
void main() {
    float distance = u_directional
        ? dot(v_world_position - u_shadow_origin, normalize(u_light_direction))
        : length(v_world_position - u_shadow_origin);
    float depth = clamp(distance / u_shadow_far_plane, 0.0, 1.0);
    float dx = dFdx(depth);
    float dy = dFdy(depth);
    o_moments = vec4(depth, depth * depth + 0.25 * (dx * dx + dy * dy), 0.0, 1.0);
}
";

/// Fullscreen triangle vertex stage
pub const FULLSCREEN_VERTEX: &str = r"
layout(location = 0) in vec3 a_position;
out vec2 v_uv;
void main() {
    v_uv = a_position.xy * 0.5 + 0.5;
    gl_Position = vec4(a_position.xy, 0.0, 1.0);
}
";

/// Separable Gaussian blur over variance moments
pub const BLUR_FRAGMENT: &str = r"
in vec2 v_uv;
uniform sampler2D u_source;
uniform samplerCube u_source_cube;
uniform bool u_cube_source;
uniform int u_face;
uniform vec2 u_direction;
uniform float u_radius;
layout(location = 0) out vec4 o_color;

vec3 cube_direction(int face, vec2 uv) {
    vec2 p = uv * 2.0 - 1.0;
    if (face == 0) return vec3(1.0, -p.y, -p.x);
    if (face == 1) return vec3(-1.0, -p.y, p.x);
    if (face == 2) return vec3(p.x, 1.0, p.y);
    if (face == 3) return vec3(p.x, -1.0, -p.y);
    if (face == 4) return vec3(p.x, -p.y, 1.0);
    return vec3(-p.x, -p.y, -1.0);
}

vec4 fetch(vec2 uv) {
    return u_cube_source ? texture(u_source_cube, cube_direction(u_face, uv)) : texture(u_source, uv);
}

void main() {
    float sigma = max(u_radius, 0.5);
    int taps = int(ceil(u_radius));
    vec4 sum = vec4(0.0);
    float total = 0.0;
    for (int i = -taps; i <= taps; ++i) {
        float weight = exp(-float(i * i) / (2.0 * sigma * sigma));
        sum += fetch(v_uv + u_direction * float(i)) * weight;
        total += weight;
    }
    o_color = sum / total;
}
";

/// Bloom bright-pass over a downsampled mip of the HDR buffer
pub const BRIGHT_PASS_FRAGMENT: &str = r"
in vec2 v_uv;
uniform sampler2D u_source;
uniform float u_threshold;
uniform float u_source_lod;
layout(location = 0) out vec4 o_color;
void main() {
    vec3 color = textureLod(u_source, v_uv, u_source_lod).rgb;
    float luminance = dot(color, vec3(0.2126, 0.7152, 0.0722));
    o_color = vec4(color * step(u_threshold, luminance), 1.0);
}
";

/// Exposure tone mapping with average luminance from the last mip
pub const TONE_MAP_FRAGMENT: &str = r"
in vec2 v_uv;
uniform sampler2D u_source;
uniform sampler2D u_bloom;
uniform float u_exposure;
uniform float u_bloom_factor;
uniform float u_luminance_lod;
layout(location = 0) out vec4 o_color;
void main() {
    vec3 color = texture(u_source, v_uv).rgb + texture(u_bloom, v_uv).rgb * u_bloom_factor;
    vec3 average = textureLod(u_source, vec2(0.5), u_luminance_lod).rgb;
    float luminance = max(dot(average, vec3(0.2126, 0.7152, 0.0722)), 1e-4);
    vec3 scaled = color * (u_exposure / luminance);
    o_color = vec4(scaled / (1.0 + scaled), 1.0);
}
";

/// Direct copy, used for LDR output and refraction backgrounds
pub const COPY_FRAGMENT: &str = r"
in vec2 v_uv;
uniform sampler2D u_source;
layout(location = 0) out vec4 o_color;
void main() {
    o_color = texture(u_source, v_uv);
}
";

/// Material function sources selected by the definition's shader ids
pub fn material_functions(definition: &MaterialDefinition) -> String {
    let diffuse = match definition.diffuse {
        DiffuseShader::Flat => DIFFUSE_FLAT,
        DiffuseShader::Textured => DIFFUSE_TEXTURED,
    };
    let emissive = match definition.emissive {
        EmissiveShader::None => EMISSIVE_NONE,
        EmissiveShader::Flat => EMISSIVE_FLAT,
        EmissiveShader::Textured => EMISSIVE_TEXTURED,
    };
    let shininess = match definition.shininess {
        ShininessShader::Constant => SHININESS_CONSTANT,
        ShininessShader::Textured => SHININESS_TEXTURED,
    };
    let refraction = match definition.refraction {
        RefractionShader::None => REFRACTION_NONE,
        RefractionShader::ScreenSpace => REFRACTION_SCREEN,
    };
    let normal = match definition.normal_map {
        NormalMapShader::None => NORMAL_VERTEX,
        NormalMapShader::Textured => NORMAL_TEXTURED,
    };
    [diffuse, emissive, shininess, refraction, normal].concat()
}

/// Fragment template of a material pass
pub fn fragment_template(pass: PassKind) -> String {
    match pass {
        PassKind::Ambient => [LIGHTING_COMMON, AMBIENT_FRAGMENT].concat(),
        PassKind::Directional => [LIGHTING_COMMON, DIRECTIONAL_FRAGMENT].concat(),
        PassKind::Point => [LIGHTING_COMMON, POINT_FRAGMENT].concat(),
        PassKind::Spot => [LIGHTING_COMMON, SPOT_FRAGMENT].concat(),
        PassKind::DirectionalShadow => [LIGHTING_COMMON, SHADOW_COMMON, DIRECTIONAL_SHADOW_FRAGMENT].concat(),
        PassKind::PointShadow => [LIGHTING_COMMON, SHADOW_COMMON, POINT_SHADOW_FRAGMENT].concat(),
        PassKind::SpotShadow => [LIGHTING_COMMON, SHADOW_COMMON, SPOT_SHADOW_FRAGMENT].concat(),
        PassKind::Material => MATERIAL_FRAGMENT.to_owned(),
    }
}

/// Complete vertex and fragment sources of one material pass
pub fn material_program_sources(definition: &MaterialDefinition, pass: PassKind) -> (String, String) {
    let vertex = [COMMON_HEADER, MESH_VERTEX].concat();
    let fragment = format!("{}{}{}", COMMON_HEADER, material_functions(definition), fragment_template(pass));
    (vertex, fragment)
}

/// Complete sources of a utility program
pub fn utility_sources(vertex: &str, fragment: &str) -> (String, String) {
    ([COMMON_HEADER, vertex].concat(), [COMMON_HEADER, fragment].concat())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_selects_functions() {
        let definition = MaterialDefinition::new("glass")
            .with_diffuse(DiffuseShader::Textured)
            .with_refraction(RefractionShader::ScreenSpace);
        let functions = material_functions(&definition);
        assert!(functions.contains("u_diffuse_texture"));
        assert!(functions.contains("u_refraction_strength"));
        assert!(!functions.contains("u_emissive_texture"));
    }

    #[test]
    fn test_shadow_templates_include_variance_lookup() {
        for pass in [PassKind::DirectionalShadow, PassKind::PointShadow, PassKind::SpotShadow] {
            assert!(fragment_template(pass).contains("chebyshev_visibility"));
        }
        assert!(!fragment_template(PassKind::Point).contains("chebyshev_visibility"));
    }

    #[test]
    fn test_program_sources_start_with_header() {
        let (vertex, fragment) = material_program_sources(&MaterialDefinition::new("plain"), PassKind::Material);
        assert!(vertex.starts_with("#version 330 core"));
        assert!(fragment.starts_with("#version 330 core"));
        assert!(fragment.contains("material_diffuse"));
    }
}
