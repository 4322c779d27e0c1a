//! Windowed host loop
//!
//! Thin winit wrapper for applications that want the renderer on screen
//! without writing their own event loop. Library users embedding the
//! renderer elsewhere can ignore this module entirely.

use std::sync::Arc;
use winit::{
    dpi::PhysicalSize,
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget},
    window::{Window as WinitWindow, WindowBuilder},
};

/// Window creation parameters
#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Frame Renderer".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
        }
    }
}

/// A winit window plus the frame-to-frame state the render loop needs
pub struct Window {
    inner: Arc<WinitWindow>,
    size: PhysicalSize<u32>,
    pending_resize: Option<PhysicalSize<u32>>,
    close_requested: bool,
    pub vsync: bool,
}

impl Window {
    pub fn new(event_loop: &EventLoop<()>, config: &WindowConfig) -> Self {
        let inner = Arc::new(
            WindowBuilder::new()
                .with_title(&config.title)
                .with_inner_size(PhysicalSize::new(config.width, config.height))
                .build(event_loop)
                .expect("window creation failed"),
        );
        let size = inner.inner_size();

        Self {
            inner,
            size,
            pending_resize: None,
            close_requested: false,
            vsync: config.vsync,
        }
    }

    /// Handle to hand the wgpu backend at startup
    pub fn handle(&self) -> Arc<WinitWindow> {
        Arc::clone(&self.inner)
    }

    /// Current surface size in physical pixels
    pub fn size(&self) -> (u32, u32) {
        (self.size.width.max(1), self.size.height.max(1))
    }

    /// Resize that arrived since the last frame, if any
    pub fn take_resize(&mut self) -> Option<(u32, u32)> {
        self.pending_resize
            .take()
            .map(|s| (s.width.max(1), s.height.max(1)))
    }

    pub fn close_requested(&self) -> bool {
        self.close_requested
    }

    fn on_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::Resized(new_size) => {
                self.size = *new_size;
                self.pending_resize = Some(*new_size);
            }
            WindowEvent::ScaleFactorChanged { .. } => {
                let new_size = self.inner.inner_size();
                self.size = new_size;
                self.pending_resize = Some(new_size);
            }
            WindowEvent::CloseRequested => self.close_requested = true,
            _ => {}
        }
    }
}

/// Open a window and call `frame` once per redraw until the window closes
pub fn run<F>(config: WindowConfig, mut frame: F)
where
    F: FnMut(&mut Window) + 'static,
{
    let event_loop = EventLoop::new().expect("event loop creation failed");
    let mut window = Window::new(&event_loop, &config);

    event_loop
        .run(move |event, target: &EventLoopWindowTarget<()>| {
            target.set_control_flow(ControlFlow::Poll);

            match event {
                Event::WindowEvent { event, .. } => {
                    window.on_event(&event);
                    match event {
                        WindowEvent::CloseRequested => target.exit(),
                        WindowEvent::RedrawRequested => frame(&mut window),
                        _ => {}
                    }
                }
                Event::AboutToWait => window.inner.request_redraw(),
                _ => {}
            }
        })
        .expect("event loop terminated abnormally");
}
