//! Scene viewer
//!
//! Loads the configured glTF scene and spins it in front of the camera.
//! Usage: `viewer [config.toml|config.ron]`

use glfw::{Action, Key, WindowEvent};
use thiserror::Error;
use vk_engine::config::{Config, ConfigError, RendererConfig};
use vk_engine::foundation::logging;
use vk_engine::foundation::math::rotation_y;
use vk_engine::foundation::time::FrameTimer;
use vk_engine::render::vulkan::{VulkanError, VulkanRenderer, Window, WindowError};

#[derive(Error, Debug)]
enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("window error: {0}")]
    Window(#[from] WindowError),

    #[error("renderer error: {0}")]
    Renderer(#[from] VulkanError),
}

fn load_config() -> Result<RendererConfig, AppError> {
    let mut config = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading configuration from {}", path);
            RendererConfig::load_from_file(&path)?
        }
        None => RendererConfig::default(),
    };
    config.shaders = config.shaders.with_path_resolution();
    Ok(config)
}

fn run() -> Result<(), AppError> {
    let config = load_config()?;
    let mut window = Window::new(&config.window.title, config.window.width, config.window.height)?;

    let model_path = config.scene.model_path.clone();
    let spin_speed = config.scene.spin_speed;
    let mut renderer = VulkanRenderer::new(&window, config)?;
    let model = renderer.create_model(&model_path)?;

    let start = window.time();
    let mut timer = FrameTimer::new(start);

    while !window.should_close() {
        window.poll_events();
        for event in window.flush_events() {
            match event {
                WindowEvent::Key(Key::Escape, _, Action::Press, _) => window.set_should_close(true),
                WindowEvent::FramebufferSize(width, height) => {
                    log::debug!("Framebuffer resized to {}x{}", width, height);
                    renderer.notify_resized();
                }
                _ => {}
            }
        }

        let (width, height) = window.framebuffer_size();
        if width == 0 || height == 0 {
            window.wait_events();
            continue;
        }

        let now = window.time();
        let angle = ((now - start) * f64::from(spin_speed)) as f32;
        renderer.update_model(model, rotation_y(angle))?;
        renderer.draw(&window)?;

        if let Some(fps) = timer.tick(now) {
            log::debug!("{:.1} fps ({} frames)", fps, timer.frame_count());
        }
    }

    renderer.wait_idle()?;
    log::info!("Viewer closed after {} frames", timer.frame_count());
    Ok(())
}

fn main() {
    logging::init();

    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
