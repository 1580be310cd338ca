//! Desktop shell: a winit window driving an [`Editor`] over the headless backend.
//! The window is a placeholder surface. Nothing is drawn into it, so the
//! scene is only observable through the fps title and the log.
//!
//! Pointer input goes to the selection controller first. A left-button drag
//! that did not grab the gizmo orbits the camera while orbit is enabled.

mod input;
mod timing;

use scenedit::assets::texture::TEXTURE_EXTENSIONS;
use scenedit::config::EditorConfig;
use scenedit::materials::TextureSlot;
use scenedit::render::HeadlessBackend;
use scenedit::Editor;
use input::{InputAction, InputState};
use timing::FrameTiming;

use glam::Vec2;
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowAttributes, WindowId};

const WINDOW_TITLE: &str = "Scene Editor";
const ORBIT_SPEED: f32 = 0.005;
const DOLLY_PER_LINE: f32 = 0.1;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
}

pub struct App {
    config: EditorConfig,
    window: Option<Arc<Window>>,
    editor: Option<Editor>,
    input: InputState,
    cursor: Option<Vec2>,
    orbit_from: Option<Vec2>,
    timing: FrameTiming,
    target_frame_duration: Duration,
    next_frame_time: Instant,
}

impl App {
    pub fn new(config: EditorConfig) -> Self {
        let now = Instant::now();
        Self {
            config,
            window: None,
            editor: None,
            input: InputState::default(),
            cursor: None,
            orbit_from: None,
            timing: FrameTiming::new(WINDOW_TITLE.to_string(), now),
            target_frame_duration: Duration::from_millis(16),
            next_frame_time: now,
        }
    }

    fn handle_resize(&self, size: PhysicalSize<u32>, scale_factor: f64) {
        if let Some(editor) = &self.editor {
            editor
                .registry()
                .resize(size.width, size.height, scale_factor as f32);
        }
    }

    fn update_target_frame_duration(&mut self, window: &Window) {
        let mut target = Duration::from_millis(16);
        if let Some(millihz) = window
            .current_monitor()
            .and_then(|monitor| monitor.refresh_rate_millihertz())
        {
            let hz = millihz as f32 / 1000.0;
            if hz > 1.0 {
                target = Duration::from_secs_f32(1.0 / hz);
            }
        }
        self.target_frame_duration = target;
        self.next_frame_time = Instant::now() + target;
    }

    fn render(&mut self) {
        let Some(editor) = &self.editor else {
            return;
        };
        let frame_start = Instant::now();
        if let Err(err) = editor.frame() {
            log::error!("Frame failed: {}", err);
        }
        let now = Instant::now();
        self.timing
            .set_render_ms(now.saturating_duration_since(frame_start).as_secs_f32() * 1000.0);
        if let Some(title) = self.timing.update(now) {
            if let Some(window) = &self.window {
                window.set_title(&title);
            }
        }
    }

    fn handle_action(&mut self, action: InputAction, event_loop: &ActiveEventLoop) {
        if action == InputAction::Exit {
            self.shutdown(event_loop);
            return;
        }
        let Some(editor) = &self.editor else {
            return;
        };
        let panels = editor.panels();
        match action {
            InputAction::None | InputAction::Exit => {}
            InputAction::ImportModel => {
                let picked = rfd::FileDialog::new()
                    .set_title("Import model")
                    .add_filter("3D models", panels.import.accepted_extensions())
                    .pick_file();
                if let Some(path) = picked {
                    // Rejections are logged and kept on the panel.
                    let _ = panels.import.choose_file(&path);
                }
            }
            InputAction::ReplaceTexture(slot) => {
                if editor.materials().selected_material().is_none() {
                    log::warn!("Select an object before choosing a {} texture", slot);
                    return;
                }
                let title = match slot {
                    TextureSlot::Diffuse => "Choose diffuse texture",
                    TextureSlot::Normal => "Choose normal map",
                };
                if let Some(path) = rfd::FileDialog::new()
                    .set_title(title)
                    .add_filter("Images", &TEXTURE_EXTENSIONS)
                    .pick_file()
                {
                    // Rejections are logged and kept on the panel.
                    let _ = panels.material.choose_file(slot, path);
                }
            }
            InputAction::SelectEnvironment(index) => {
                if !panels.environment.select(index) {
                    log::debug!("No environment map in slot {}", index + 1);
                }
            }
            InputAction::ToggleBackground => {
                let visible = !panels.environment.background_visible();
                panels.environment.set_background_visible(visible);
            }
            InputAction::DeleteSelection => {
                editor.controls().remove_selected();
            }
            InputAction::Controls(code) => {
                editor.controls().handle_key(code);
            }
        }
    }

    fn pointer_button(&mut self, pressed: bool) {
        let (Some(editor), Some(at)) = (&self.editor, self.cursor) else {
            return;
        };
        let controls = editor.controls();
        if pressed {
            controls.pointer_down(at);
            self.orbit_from = (!controls.is_dragging_gizmo()).then_some(at);
        } else {
            controls.pointer_up(at);
            self.orbit_from = None;
        }
    }

    fn pointer_moved(&mut self, at: Vec2) {
        self.cursor = Some(at);
        let Some(editor) = &self.editor else {
            return;
        };
        editor.controls().pointer_move(at);
        if let Some(from) = self.orbit_from.replace(at) {
            if editor.registry().orbit_enabled() {
                let delta = (at - from) * ORBIT_SPEED;
                editor.registry().orbit_rotate(delta.x, delta.y);
            }
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(editor) = self.editor.take() {
            editor.dispose();
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let window_attrs = WindowAttributes::default()
            .with_title(WINDOW_TITLE)
            .with_inner_size(PhysicalSize::new(1280u32, 720u32))
            .with_resizable(true);

        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                log::error!("Failed to create window: {}", err);
                event_loop.exit();
                return;
            }
        };

        let editor = Editor::new(self.config.clone(), Box::new(HeadlessBackend::new()));
        self.editor = Some(editor);
        self.handle_resize(window.inner_size(), window.scale_factor());
        self.update_target_frame_duration(&window);
        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => self.shutdown(event_loop),
            WindowEvent::Focused(false) => {
                self.cursor = None;
                self.orbit_from = None;
            }
            WindowEvent::ModifiersChanged(modifiers) => {
                self.input.set_ctrl(modifiers.state().control_key());
            }
            WindowEvent::KeyboardInput { event, .. } => {
                let pressed = event.state == ElementState::Pressed;
                if pressed && event.repeat {
                    return;
                }
                let action = self.input.handle_key(event.physical_key, pressed);
                self.handle_action(action, event_loop);
            }
            WindowEvent::Resized(new_size) => {
                let scale_factor = self
                    .window
                    .as_ref()
                    .map(|window| window.scale_factor())
                    .unwrap_or(1.0);
                self.handle_resize(new_size, scale_factor);
                if let Some(window) = self.window.clone() {
                    self.update_target_frame_duration(&window);
                }
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                if let Some(window) = self.window.as_ref() {
                    self.handle_resize(window.inner_size(), scale_factor);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.pointer_moved(Vec2::new(position.x as f32, position.y as f32));
            }
            WindowEvent::CursorLeft { .. } => {
                self.cursor = None;
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                self.pointer_button(state == ElementState::Pressed);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 40.0,
                };
                if let Some(editor) = &self.editor {
                    if editor.registry().orbit_enabled() {
                        editor.registry().orbit_dolly(lines * DOLLY_PER_LINE);
                    }
                }
            }
            WindowEvent::RedrawRequested => self.render(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        if now >= self.next_frame_time {
            if let Some(window) = &self.window {
                window.request_redraw();
            }
            self.next_frame_time = now + self.target_frame_duration;
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_frame_time));
    }
}

pub fn run(config: EditorConfig) -> Result<(), AppError> {
    log::info!("Scene editor starting");
    log::info!("   W/E/R gizmo mode, Ctrl+O import, 1-3 environments, B background, ESC exit");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    log::info!("Goodbye");
    Ok(())
}
