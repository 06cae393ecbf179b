use glow::HasContext;

use crate::error::{Error, Result};

pub const SPRITE_VERTEX_SHADER: &str = r#"#version 330 core
layout (location = 0) in vec2 position;
layout (location = 1) in vec2 texCoord;

uniform mat4 projection;

out vec2 uv;

void main() {
    gl_Position = projection * vec4(position, 0.0, 1.0);
    uv = texCoord;
}
"#;

pub const SPRITE_FRAGMENT_SHADER: &str = r#"#version 330 core
in vec2 uv;

uniform sampler2D atlas;

out vec4 color;

void main() {
    color = texture(atlas, uv);
}
"#;

#[derive(Debug)]
pub struct ShaderProgram {
    pub name: String,
    pub program: glow::NativeProgram,
}

impl ShaderProgram {
    pub fn sprite(gl: &glow::Context) -> Result<Self> {
        Self::from_sources(gl, "sprite", SPRITE_VERTEX_SHADER, SPRITE_FRAGMENT_SHADER)
    }

    pub fn from_sources(
        gl: &glow::Context,
        name: &str,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Self> {
        unsafe {
            let vertex_shader = compile(gl, glow::VERTEX_SHADER, vertex_source)
                .map_err(|log| Error::GpuResource(format!("vertex shader '{}': {}", name, log)))?;

            let fragment_shader = match compile(gl, glow::FRAGMENT_SHADER, fragment_source) {
                Ok(shader) => shader,
                Err(log) => {
                    gl.delete_shader(vertex_shader);
                    return Err(Error::GpuResource(format!(
                        "fragment shader '{}': {}",
                        name, log
                    )));
                }
            };

            let program = gl.create_program().map_err(Error::GpuResource)?;
            gl.attach_shader(program, vertex_shader);
            gl.attach_shader(program, fragment_shader);
            gl.link_program(program);

            gl.delete_shader(vertex_shader);
            gl.delete_shader(fragment_shader);

            if !gl.get_program_link_status(program) {
                let log = gl.get_program_info_log(program);
                gl.delete_program(program);
                return Err(Error::GpuResource(format!(
                    "shader '{}' failed to link: {}",
                    name, log
                )));
            }

            Ok(Self {
                name: name.to_string(),
                program,
            })
        }
    }

    pub fn uniform(&self, gl: &glow::Context, name: &str) -> Result<glow::NativeUniformLocation> {
        unsafe { gl.get_uniform_location(self.program, name) }.ok_or_else(|| {
            Error::GpuResource(format!(
                "could not find the uniform called '{}' in '{}'",
                name, self.name
            ))
        })
    }

    pub fn delete(&self, gl: &glow::Context) {
        unsafe { gl.delete_program(self.program) };
    }
}

unsafe fn compile(
    gl: &glow::Context,
    kind: u32,
    source: &str,
) -> std::result::Result<glow::NativeShader, String> {
    let shader = gl.create_shader(kind)?;
    gl.shader_source(shader, source);
    gl.compile_shader(shader);

    if !gl.get_shader_compile_status(shader) {
        let log = gl.get_shader_info_log(shader);
        gl.delete_shader(shader);
        return Err(log);
    }
    Ok(shader)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_agree_on_attribute_and_uniform_names() {
        assert!(SPRITE_VERTEX_SHADER.contains("layout (location = 0) in vec2 position"));
        assert!(SPRITE_VERTEX_SHADER.contains("layout (location = 1) in vec2 texCoord"));
        assert!(SPRITE_VERTEX_SHADER.contains("uniform mat4 projection"));
        assert!(SPRITE_FRAGMENT_SHADER.contains("uniform sampler2D atlas"));
    }
}
