use std::ffi::CString;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Arg, ArgAction, Command};
use crossbeam_channel::Receiver;
use glutin::config::{Config, ConfigTemplate};
use glutin::context::{
    ContextApi, ContextAttributesBuilder, GlProfile, PossiblyCurrentContext, Version,
};
use glutin::display::{Display, DisplayApiPreference};
use glutin::prelude::*;
use glutin::surface::{Surface, SurfaceAttributesBuilder, WindowSurface};
use log::{debug, error, info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::window::{Window, WindowId};

use sprite_blob::batch::BatchedGraphics;
use sprite_blob::camera::WindowCamera;
use sprite_blob::config::{RuntimeConfig, DEFAULT_CONFIG_PATH};
use sprite_blob::graphics::{Graphics, Image};
use sprite_blob::loader::{AssetLoader, AssetSource};
use sprite_blob::opengl::GlBackend;
use sprite_blob::rect::Rectangle;
use sprite_blob::sound::{AudioBridge, AudioCommand, Sound};
use sprite_blob::{Error, Result};

const SPRITE_SPACING: i32 = 8;
const SCROLL_STEP: i32 = 4;

/// Fixed-step clock: the scene advances in whole frames of `frame_time`.
struct Timer {
    last_frame: Instant,
    accumulator: Duration,
    frame_time: Duration,
}

impl Timer {
    fn new(frame_time: Duration) -> Timer {
        Timer {
            last_frame: Instant::now(),
            accumulator: Duration::ZERO,
            frame_time,
        }
    }

    /// Number of whole frames that elapsed since the last call.
    fn update(&mut self) -> u32 {
        let now = Instant::now();
        self.accumulator += now.duration_since(self.last_frame);
        self.last_frame = now;

        let mut steps = 0;
        while self.accumulator >= self.frame_time {
            self.accumulator -= self.frame_time;
            steps += 1;
        }
        steps
    }
}

/// Sprites laid out in a row, plus the point the camera follows.
struct Scene {
    sprites: Vec<(Image, i32, i32)>,
    bounds: Rectangle,
    focus: (i32, i32),
    scroll: (i32, i32),
    sound: Option<Sound>,
}

impl Scene {
    fn load(loader: &mut AssetLoader, ids: &[String], sound: Option<&str>) -> Result<Self> {
        let mut sprites = Vec::with_capacity(ids.len());
        let mut x = 0;
        let mut height = 0;
        for id in ids {
            let image = loader.load_image(id)?;
            let (w, h) = image.size();
            sprites.push((image, x, 0));
            x += w + SPRITE_SPACING;
            height = height.max(h);
        }
        let bounds = Rectangle::new(0, 0, (x - SPRITE_SPACING).max(1), height.max(1));

        let sound = sound.map(|id| loader.load_sound(id)).transpose()?;

        Ok(Self {
            sprites,
            bounds,
            focus: (bounds.width / 2, bounds.height / 2),
            scroll: (0, 0),
            sound,
        })
    }

    fn update(&mut self) {
        self.focus.0 = (self.focus.0 + self.scroll.0 * SCROLL_STEP).clamp(0, self.bounds.width);
        self.focus.1 = (self.focus.1 + self.scroll.1 * SCROLL_STEP).clamp(0, self.bounds.height);
    }

    /// Points the camera at the focus without leaving the scene bounds.
    fn aim(&self, camera: &mut WindowCamera) {
        let (window_w, window_h) = camera.window_size();
        let view_w = window_w.min(self.bounds.width);
        let view_h = window_h.min(self.bounds.height);

        let x = (self.focus.0 - view_w / 2).clamp(0, self.bounds.width - view_w);
        let y = (self.focus.1 - view_h / 2).clamp(0, self.bounds.height - view_h);
        camera.set_world_position(Rectangle::new(x, y, view_w, view_h));
    }

    fn draw(&self, graphics: &mut dyn Graphics) {
        for (image, x, y) in &self.sprites {
            image.draw_at(graphics, *x, *y);
        }
    }
}

struct App {
    config: RuntimeConfig,
    sprite_ids: Vec<String>,
    sound_id: Option<String>,

    timer: Option<Timer>,

    window: Option<Window>,
    current_context: Option<PossiblyCurrentContext>,
    surface: Option<Surface<WindowSurface>>,

    graphics: Option<BatchedGraphics<GlBackend>>,
    loader: Option<AssetLoader>,
    scene: Option<Scene>,
    audio_commands: Option<Receiver<AudioCommand>>,

    failed: bool,
}

impl App {
    fn new(config: RuntimeConfig, sprite_ids: Vec<String>, sound_id: Option<String>) -> Self {
        Self {
            config,
            sprite_ids,
            sound_id,
            timer: None,
            window: None,
            current_context: None,
            surface: None,
            graphics: None,
            loader: None,
            scene: None,
            audio_commands: None,
            failed: false,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attributes = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(PhysicalSize::new(
                self.config.window_width,
                self.config.window_height,
            ));
        let window = event_loop
            .create_window(attributes)
            .map_err(|e| Error::GpuResource(format!("window creation failed: {}", e)))?;

        let display_handle = window
            .display_handle()
            .map_err(|e| Error::GpuResource(e.to_string()))?
            .as_raw();
        let window_handle = window
            .window_handle()
            .map_err(|e| Error::GpuResource(e.to_string()))?
            .as_raw();

        #[cfg(target_os = "windows")]
        let preference = DisplayApiPreference::Wgl(Some(window_handle));
        #[cfg(not(target_os = "windows"))]
        let preference = DisplayApiPreference::Egl;

        let display = unsafe { Display::new(display_handle, preference) }
            .map_err(|e| Error::GpuResource(format!("failed to create display: {}", e)))?;

        let config: Config = unsafe { display.find_configs(ConfigTemplate::default()) }
            .map_err(|e| Error::GpuResource(e.to_string()))?
            .next()
            .ok_or_else(|| Error::GpuResource("no suitable OpenGL config".to_string()))?;

        let physical_size = window.inner_size();
        let (width, height) = non_zero_size(physical_size);

        let surface_attributes =
            SurfaceAttributesBuilder::<WindowSurface>::new().build(window_handle, width, height);

        let context_attributes = ContextAttributesBuilder::new()
            .with_profile(GlProfile::Core)
            .with_context_api(ContextApi::OpenGl(Some(Version::new(3, 3))))
            .build(Some(window_handle));

        let surface = unsafe { display.create_window_surface(&config, &surface_attributes) }
            .map_err(|e| Error::GpuResource(e.to_string()))?;
        let non_current_context = unsafe { display.create_context(&config, &context_attributes) }
            .map_err(|e| Error::GpuResource(e.to_string()))?;
        let current_context = non_current_context
            .make_current(&surface)
            .map_err(|e| Error::GpuResource(e.to_string()))?;

        let gl = unsafe {
            Arc::new(glow::Context::from_loader_function(|s| {
                CString::new(s)
                    .map(|c_str| display.get_proc_address(&c_str))
                    .unwrap_or(std::ptr::null())
            }))
        };

        let backend = GlBackend::new(gl)?;
        backend.set_viewport(physical_size.width as i32, physical_size.height as i32);
        let camera = WindowCamera::new(physical_size.width as i32, physical_size.height as i32);
        let mut graphics = BatchedGraphics::new(backend, camera);

        let (audio, audio_commands) = AudioBridge::new();
        let mut loader = AssetLoader::open(&self.config.blob, &mut graphics, audio)?;
        let scene = Scene::load(&mut loader, &self.sprite_ids, self.sound_id.as_deref())?;
        info!(
            "Showing {} sprites from {:?}",
            scene.sprites.len(),
            self.config.blob
        );

        self.window = Some(window);
        self.surface = Some(surface);
        self.current_context = Some(current_context);
        self.graphics = Some(graphics);
        self.loader = Some(loader);
        self.scene = Some(scene);
        self.audio_commands = Some(audio_commands);
        self.timer = Some(Timer::new(self.config.frame_time()));
        Ok(())
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        let (width, height) = non_zero_size(size);
        if let (Some(surface), Some(context)) = (&self.surface, &self.current_context) {
            surface.resize(context, width, height);
        }
        if let Some(graphics) = self.graphics.as_mut() {
            graphics
                .backend()
                .set_viewport(size.width as i32, size.height as i32);
            graphics
                .camera_mut()
                .set_window_size(size.width as i32, size.height as i32);
        }
    }

    fn key(&mut self, code: KeyCode, state: ElementState) {
        let Some(scene) = self.scene.as_mut() else {
            return;
        };
        let amount = if state == ElementState::Pressed { 1 } else { 0 };
        match code {
            KeyCode::ArrowLeft => scene.scroll.0 = -amount,
            KeyCode::ArrowRight => scene.scroll.0 = amount,
            KeyCode::ArrowUp => scene.scroll.1 = -amount,
            KeyCode::ArrowDown => scene.scroll.1 = amount,
            KeyCode::Space if state == ElementState::Pressed => {
                if let Some(sound) = &scene.sound {
                    sound.play_once();
                }
            }
            _ => {}
        }
    }

    fn redraw(&mut self) -> Result<()> {
        let (Some(graphics), Some(scene), Some(timer)) =
            (self.graphics.as_mut(), self.scene.as_mut(), self.timer.as_mut())
        else {
            return Ok(());
        };

        for _ in 0..timer.update() {
            scene.update();
        }

        // no mixer is attached; commands are only reported
        if let Some(commands) = &self.audio_commands {
            for AudioCommand::PlayOnce { id, pcm } in commands.try_iter() {
                debug!("Play '{}' ({:?})", id, pcm.duration());
            }
        }

        let (r, g, b) = self.config.clear_color;
        graphics.clear_screen(r, g, b);
        scene.aim(graphics.camera_mut());
        scene.draw(graphics);
        graphics.flush()?;

        if let (Some(surface), Some(context)) = (&self.surface, &self.current_context) {
            surface
                .swap_buffers(context)
                .map_err(|e| Error::GpuResource(e.to_string()))?;
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(mut graphics) = self.graphics.take() {
            if let Some(loader) = self.loader.as_mut() {
                loader.close(&mut graphics);
            }
            graphics.release_buffers();
            graphics.backend_mut().destroy();
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: Error) {
        error!("{}", err);
        self.failed = true;
        self.shutdown();
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(err) = self.init(event_loop) {
            self.fail(event_loop, err);
            return;
        }
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("The close button was pressed; stopping");
                self.shutdown();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => self.resize(size),
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    if code == KeyCode::Escape {
                        self.shutdown();
                        event_loop.exit();
                        return;
                    }
                    self.key(code, event.state);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.redraw() {
                    self.fail(event_loop, err);
                    return;
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => (),
        }
    }
}

fn non_zero_size(size: PhysicalSize<u32>) -> (NonZeroU32, NonZeroU32) {
    (
        NonZeroU32::new(size.width).unwrap_or(NonZeroU32::MIN),
        NonZeroU32::new(size.height).unwrap_or(NonZeroU32::MIN),
    )
}

fn cli() -> Command {
    Command::new("sprite_blob")
        .about("Draws sprites from a resource container")
        .arg(
            Arg::new("sprites")
                .help("IDs of the images to draw, left to right")
                .num_args(1..)
                .required(true),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("INI file with runtime settings")
                .default_value(DEFAULT_CONFIG_PATH),
        )
        .arg(
            Arg::new("blob")
                .long("blob")
                .short('b')
                .help("Resource container, overrides [resources] blob"),
        )
        .arg(
            Arg::new("width")
                .long("width")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new("height")
                .long("height")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new("sound")
                .long("sound")
                .short('s')
                .help("Sound ID played with the space bar")
                .action(ArgAction::Set),
        )
}

fn run() -> Result<bool> {
    let matches = cli().get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let mut config = RuntimeConfig::load(config_path)?;
    if let Some(blob) = matches.get_one::<String>("blob") {
        config.blob = PathBuf::from(blob);
    }
    if let Some(width) = matches.get_one::<u32>("width") {
        config.window_width = *width;
    }
    if let Some(height) = matches.get_one::<u32>("height") {
        config.window_height = *height;
    }

    let sprite_ids: Vec<String> = matches
        .get_many::<String>("sprites")
        .map(|ids| ids.cloned().collect())
        .unwrap_or_default();
    let sound_id = matches.get_one::<String>("sound").cloned();

    let event_loop =
        EventLoop::new().map_err(|e| Error::GpuResource(format!("event loop: {}", e)))?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(config, sprite_ids, sound_id);
    event_loop
        .run_app(&mut app)
        .map_err(|e| Error::GpuResource(format!("event loop: {}", e)))?;

    if app.graphics.is_some() {
        warn!("Event loop ended without a shutdown");
        app.shutdown();
    }
    Ok(!app.failed)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            error!("{}", err);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(width: i32, height: i32) -> Scene {
        Scene {
            sprites: Vec::new(),
            bounds: Rectangle::new(0, 0, width, height),
            focus: (width / 2, height / 2),
            scroll: (0, 0),
            sound: None,
        }
    }

    #[test]
    fn camera_stays_inside_a_wide_scene() {
        let mut scene = scene(1000, 100);
        let mut camera = WindowCamera::new(200, 100);

        scene.focus = (0, 50);
        scene.aim(&mut camera);
        assert_eq!(camera.world_position(), Rectangle::new(0, 0, 200, 100));

        scene.focus = (1000, 50);
        scene.aim(&mut camera);
        assert_eq!(camera.offset(), (-800, 0));
    }

    #[test]
    fn small_scenes_are_centered() {
        let scene = scene(100, 50);
        let mut camera = WindowCamera::new(300, 150);
        scene.aim(&mut camera);
        assert_eq!(camera.offset(), (100, 50));
    }

    #[test]
    fn scrolling_is_clamped() {
        let mut scene = scene(10, 10);
        scene.scroll = (-1, 1);
        for _ in 0..10 {
            scene.update();
        }
        assert_eq!(scene.focus, (0, 10));
    }

    #[test]
    fn cli_definition_is_consistent() {
        cli().debug_assert();
    }
}
