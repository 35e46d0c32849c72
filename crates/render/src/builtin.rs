//! Built-in solid-color shader, used by layers that name no shader.
//!
//! Each instance rotates the mesh about its up axis by `instance_direction`
//! (a unit 2D vector), offsets it by `instance_position` and paints it with
//! `instance_color`. The fragment stage gamma-encodes the linear color.

use crate::device::ShadingLanguage;
use monet_common::ShaderSource;

pub const SOLID_COLOR_GLSL_VERTEX: &str = r#"
precision mediump float;
uniform mat4 view;
uniform mat4 perspective;
attribute vec3 position;
attribute vec3 instance_position;
attribute vec2 instance_direction;
attribute vec3 instance_color;
varying vec3 color;

void main() {
    vec2 orth_direction = vec2(-instance_direction.y, instance_direction.x);
    vec3 rotated = vec3(position.x * instance_direction + position.y * orth_direction, position.z);
    gl_Position = perspective * view * vec4(rotated + instance_position, 1.0);
    color = instance_color;
}
"#;

pub const SOLID_COLOR_GLSL_FRAGMENT: &str = r#"
precision mediump float;
varying vec3 color;

void main() {
    gl_FragColor = vec4(pow(color, vec3(1.0 / 2.2)), 1.0);
}
"#;

pub const SOLID_COLOR_WGSL_VERTEX: &str = r#"
@group(0) @binding(0)
var<uniform> view: mat4x4<f32>;
@group(0) @binding(1)
var<uniform> perspective: mat4x4<f32>;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec3<f32>,
};

@vertex
fn vs_main(
    @location(0) position: vec3<f32>,
    @location(1) instance_position: vec3<f32>,
    @location(2) instance_direction: vec2<f32>,
    @location(3) instance_color: vec3<f32>,
) -> VertexOutput {
    let orth_direction = vec2<f32>(-instance_direction.y, instance_direction.x);
    let rotated = vec3<f32>(
        position.x * instance_direction + position.y * orth_direction,
        position.z,
    );

    var out: VertexOutput;
    out.clip_position = perspective * view * vec4<f32>(rotated + instance_position, 1.0);
    out.color = instance_color;
    return out;
}
"#;

pub const SOLID_COLOR_WGSL_FRAGMENT: &str = r#"
@fragment
fn fs_main(@location(0) color: vec3<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(pow(color, vec3<f32>(1.0 / 2.2)), 1.0);
}
"#;

pub fn solid_color(language: ShadingLanguage) -> ShaderSource {
    match language {
        ShadingLanguage::Glsl => ShaderSource::new(SOLID_COLOR_GLSL_VERTEX, SOLID_COLOR_GLSL_FRAGMENT),
        ShadingLanguage::Wgsl => ShaderSource::new(SOLID_COLOR_WGSL_VERTEX, SOLID_COLOR_WGSL_FRAGMENT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::{
        INSTANCE_COLOR_ATTRIB, INSTANCE_DIRECTION_ATTRIB, INSTANCE_POSITION_ATTRIB,
        PERSPECTIVE_UNIFORM, POSITION_ATTRIB, VIEW_UNIFORM,
    };

    #[test]
    fn both_languages_declare_binding_names() {
        for language in [ShadingLanguage::Glsl, ShadingLanguage::Wgsl] {
            let source = solid_color(language);
            for name in [
                VIEW_UNIFORM,
                PERSPECTIVE_UNIFORM,
                POSITION_ATTRIB,
                INSTANCE_POSITION_ATTRIB,
                INSTANCE_DIRECTION_ATTRIB,
                INSTANCE_COLOR_ATTRIB,
            ] {
                assert!(source.vertex.contains(name), "{language:?} lacks {name}");
            }
            assert!(source.fragment.contains("1.0 / 2.2"));
        }
    }
}
