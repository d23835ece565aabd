//! Full-screen window driving an [`App`].
//!
//! Based on the winit 0.30 `ApplicationHandler` + softbuffer 0.4 pattern: the
//! window and surface are created in `resumed`, the loop sleeps until the
//! next timer deadline and every redraw paints the whole frame in software.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use softbuffer::{Context, Surface};
use tracing::{debug, error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop, OwnedDisplayHandle};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Fullscreen, Window, WindowId};

use crate::app::App;
use crate::battery::BatteryReader;
use crate::power::PowerBackend;
use crate::video::FrameSource;
use crate::{Error, Result};

pub const TITLE: &str = "Battery Duration Test";

#[derive(Clone, Debug)]
pub struct WindowOptions {
    pub title: String,
    pub fullscreen: bool,
}

impl Default for WindowOptions {
    fn default() -> Self {
        Self {
            title: TITLE.to_string(),
            fullscreen: true,
        }
    }
}

struct Handler<S: FrameSource, B: BatteryReader, P: PowerBackend> {
    app: App<S, B, P>,
    options: WindowOptions,
    shutdown: Arc<AtomicBool>,
    cursor: Option<(f64, f64)>,
    // Fields drop in order: surface, then its context, then the window.
    surface: Option<Surface<OwnedDisplayHandle, Arc<Window>>>,
    context: Option<Context<OwnedDisplayHandle>>,
    window: Option<Arc<Window>>,
    error: Option<Error>,
}

impl<S: FrameSource, B: BatteryReader, P: PowerBackend> Handler<S, B, P> {
    fn create(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let mut attrs = Window::default_attributes().with_title(self.options.title.clone());
        if self.options.fullscreen {
            attrs = attrs.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .map_err(|e| Error::Os(format!("create_window failed: {e}")))?,
        );
        let context = Context::new(event_loop.owned_display_handle())
            .map_err(|e| Error::Os(format!("softbuffer context failed: {e}")))?;
        let surface = Surface::new(&context, window.clone())
            .map_err(|e| Error::Os(format!("softbuffer surface failed: {e}")))?;

        let size = window.inner_size();
        self.app.resize(size.width, size.height);
        window.request_redraw();
        self.surface = Some(surface);
        self.context = Some(context);
        self.window = Some(window);
        Ok(())
    }

    fn close(&mut self, event_loop: &ActiveEventLoop) {
        self.app.close();
        self.surface = None;
        self.context = None;
        self.window = None;
        event_loop.exit();
    }

    fn redraw(&mut self) {
        let (Some(window), Some(surface)) = (self.window.as_ref(), self.surface.as_mut()) else {
            return;
        };
        let size = window.inner_size();
        let (Some(width), Some(height)) =
            (NonZeroU32::new(size.width), NonZeroU32::new(size.height))
        else {
            return;
        };
        if let Err(e) = surface.resize(width, height) {
            warn!("Failed to resize surface: {e}");
            return;
        }
        let mut buffer = match surface.buffer_mut() {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!("Failed to map surface buffer: {e}");
                return;
            }
        };
        self.app
            .render(&mut buffer[..], size.width, size.height, Instant::now());
        if let Err(e) = buffer.present() {
            warn!("Failed to present frame: {e}");
        }
    }
}

impl<S: FrameSource, B: BatteryReader, P: PowerBackend> ApplicationHandler for Handler<S, B, P> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.create(event_loop) {
            error!("{e}");
            self.error = Some(e);
            self.close(event_loop);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.shutdown.load(Ordering::SeqCst) {
            info!("Shutdown requested");
            self.close(event_loop);
            return;
        }

        let outcome = self.app.tick(Instant::now());
        if outcome.needs_redraw() {
            if let Some(window) = self.window.as_ref() {
                window.request_redraw();
            }
        }
        match self.app.next_deadline() {
            Some(deadline) => event_loop.set_control_flow(ControlFlow::WaitUntil(deadline)),
            None => event_loop.exit(),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.close(event_loop),
            WindowEvent::Resized(size) => {
                debug!("Resized to {}x{}", size.width, size.height);
                self.app.resize(size.width, size.height);
                if let Some(window) = self.window.as_ref() {
                    window.request_redraw();
                }
            }
            WindowEvent::RedrawRequested => self.redraw(),
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = Some((position.x, position.y));
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => {
                if let Some((x, y)) = self.cursor {
                    if self.app.hits_exit(x, y) {
                        info!("Exit pressed");
                        self.close(event_loop);
                    }
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => self.close(event_loop),
            _ => {}
        }
    }
}

/// Runs the event loop until the window is closed, the exit control is
/// pressed or `shutdown` is set. The app is always closed on return.
pub fn run<S: FrameSource, B: BatteryReader, P: PowerBackend>(
    app: App<S, B, P>,
    options: WindowOptions,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let event_loop =
        EventLoop::new().map_err(|e| Error::Os(format!("event loop unavailable: {e}")))?;
    let mut handler = Handler {
        app,
        options,
        shutdown,
        cursor: None,
        surface: None,
        context: None,
        window: None,
        error: None,
    };
    let result = event_loop.run_app(&mut handler);
    handler.app.close();
    if let Some(e) = handler.error.take() {
        return Err(e);
    }
    result.map_err(|e| Error::Os(format!("event loop failed: {e}")))
}
