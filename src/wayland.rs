// Wayland integration module
// Window, keyboard input and the per-frame render loop using smithay-client-toolkit

use crate::app::{AppState, Command, Event};
use crate::image_loader::ImageAsset;
use crate::repeat::KeyRepeat;
use crate::shm_renderer::{self, ShmRenderer};
use crate::wgpu_renderer::WgpuRenderer;
use anyhow::{anyhow, Context, Result};
use log::{debug, error, info, warn};
use smithay_client_toolkit::{
    compositor::{CompositorHandler, CompositorState},
    delegate_compositor, delegate_keyboard, delegate_output, delegate_registry, delegate_seat,
    delegate_shm, delegate_xdg_shell, delegate_xdg_window,
    output::{OutputHandler, OutputState},
    registry::{ProvidesRegistryState, RegistryState},
    registry_handlers,
    seat::{
        keyboard::{KeyEvent, KeyboardHandler, Keysym, Modifiers, RepeatInfo},
        Capability, SeatHandler, SeatState,
    },
    shell::{
        xdg::{
            window::{Window, WindowConfigure, WindowDecorations, WindowHandler},
            XdgShell,
        },
        WaylandSurface,
    },
    shm::{Shm, ShmHandler},
};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use wayland_client::{
    backend::WaylandError,
    globals::registry_queue_init,
    protocol::{wl_keyboard, wl_output, wl_seat, wl_surface},
    Connection, EventQueue, Proxy, QueueHandle,
};

/// Active drawing backend; owns the display texture
enum Renderer {
    Gpu(WgpuRenderer),
    Cpu(ShmRenderer),
}

/// Main Wayland application state
struct WaylandApp {
    // Registry state
    registry_state: RegistryState,
    // Seat state for input handling
    seat_state: SeatState,
    // Output state for display info
    output_state: OutputState,
    // Shared memory for the CPU renderer
    shm: Shm,
    // Compositor state
    compositor_state: CompositorState,
    // xdg shell for toplevel windows
    xdg_shell: XdgShell,

    // Wayland display pointer (for GPU rendering)
    display_ptr: *mut std::ffi::c_void,

    // Viewer state machine
    app: AppState,
    // Held-key repeat schedule
    repeat: KeyRepeat,
    // Decoded image, handed to the renderer on first configure
    pending_image: Option<ImageAsset>,

    // Renderer is declared before the window so it is dropped first
    renderer: Option<Renderer>,
    window: Option<Window>,
    width: u32,
    height: u32,
    configured: bool,

    // CPU path: waiting for the compositor to consume the last buffer
    frame_pending: bool,

    // Fatal error raised inside an event handler
    failure: Option<anyhow::Error>,
}

impl WaylandApp {
    /// Create a new Wayland application
    fn new(
        registry_state: RegistryState,
        seat_state: SeatState,
        output_state: OutputState,
        shm: Shm,
        compositor_state: CompositorState,
        xdg_shell: XdgShell,
        display_ptr: *mut std::ffi::c_void,
        image: ImageAsset,
    ) -> Self {
        let (width, height) = image.size();
        Self {
            registry_state,
            seat_state,
            output_state,
            shm,
            compositor_state,
            xdg_shell,
            display_ptr,
            app: AppState::new((width, height)),
            repeat: KeyRepeat::default(),
            pending_image: Some(image),
            renderer: None,
            window: None,
            width,
            height,
            configured: false,
            frame_pending: false,
            failure: None,
        }
    }

    fn fail(&mut self, err: anyhow::Error) {
        error!("{:#}", err);
        if self.failure.is_none() {
            self.failure = Some(err);
        }
    }

    /// Create the renderer and upload the image, GPU first with CPU fallback
    fn init_renderer(&mut self) {
        let Some(image) = self.pending_image.take() else {
            return;
        };
        let Some(window) = self.window.as_ref() else {
            warn!("Cannot init renderer: no window");
            self.pending_image = Some(image);
            return;
        };

        // With wayland-backend client_system, ObjectId.as_ptr() is the raw wl_surface
        let surface_ptr = window.wl_surface().id().as_ptr() as *mut std::ffi::c_void;
        let display_ptr = self.display_ptr;

        if display_ptr.is_null() {
            warn!("Display pointer is null, falling back to CPU rendering");
        } else {
            info!("Initializing GPU renderer...");
            debug!("  Surface ptr: {:?}", surface_ptr);
            debug!("  Display ptr: {:?}", display_ptr);

            match WgpuRenderer::new(display_ptr, surface_ptr, self.width, self.height) {
                Ok(mut renderer) => {
                    if let Err(e) = renderer.upload_texture(image) {
                        self.fail(e.context("Failed to upload texture to GPU"));
                        return;
                    }
                    self.renderer = Some(Renderer::Gpu(renderer));
                    info!("GPU renderer initialized successfully");
                    return;
                }
                Err(e) => {
                    warn!("Failed to initialize GPU renderer: {:?}", e);
                    warn!("Falling back to CPU rendering");
                }
            }
        }

        match ShmRenderer::new(image, &self.shm) {
            Ok(renderer) => self.renderer = Some(Renderer::Cpu(renderer)),
            Err(e) => self.fail(e.context("Failed to initialize CPU renderer")),
        }
    }

    /// Draw one frame: clear, blit the image at its destination rectangle, present
    fn draw(&mut self, qh: &QueueHandle<Self>) {
        if !self.configured {
            return;
        }
        let Some(window) = self.window.as_ref() else {
            return;
        };

        // The rectangle is laid out in the size the renderer actually presents
        let result = match self.renderer.as_mut() {
            Some(Renderer::Gpu(renderer)) => {
                renderer.resize(self.width, self.height);
                let rect = self.app.frame_rect(renderer.size());
                renderer.render(rect).map(|_| ())
            }
            Some(Renderer::Cpu(renderer)) => {
                if self.frame_pending {
                    return;
                }
                let (width, height) = shm_renderer::buffer_size(self.width, self.height);
                let rect = self.app.frame_rect((width, height));
                let surface = window.wl_surface();
                surface.frame(qh, surface.clone());
                let result = renderer.render(surface, width, height, rect);
                self.frame_pending = result.is_ok();
                result
            }
            None => return,
        };

        if let Err(e) = result {
            self.fail(e.context("Rendering failed"));
        }
    }

    /// Re-issue the held key's command for every repeat that has come due
    fn fire_repeats(&mut self, now: Instant) {
        while let Some(command) = self.repeat.due(now) {
            self.app.handle(Event::Command(command));
        }
    }
}

// Implement required traits for smithay-client-toolkit

impl CompositorHandler for WaylandApp {
    fn scale_factor_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_factor: i32,
    ) {
        debug!("Scale factor changed");
    }

    fn transform_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_transform: wl_output::Transform,
    ) {
        debug!("Transform changed");
    }

    fn frame(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _time: u32,
    ) {
        self.frame_pending = false;
    }

    fn surface_enter(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }

    fn surface_leave(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }
}

impl OutputHandler for WaylandApp {
    fn output_state(&mut self) -> &mut OutputState {
        &mut self.output_state
    }

    fn new_output(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
        debug!("New output detected");
    }

    fn update_output(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
        debug!("Output updated");
    }

    fn output_destroyed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
        debug!("Output destroyed");
    }
}

impl WindowHandler for WaylandApp {
    fn request_close(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _window: &Window) {
        self.app.handle(Event::CloseRequested);
    }

    fn configure(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _window: &Window,
        configure: WindowConfigure,
        _serial: u32,
    ) {
        debug!("Window configured: {:?}", configure.new_size);

        // No suggestion from the compositor keeps the current (initially native) size
        if let Some(width) = configure.new_size.0 {
            self.width = width.get();
        }
        if let Some(height) = configure.new_size.1 {
            self.height = height.get();
        }

        self.configured = true;

        if self.renderer.is_none() {
            self.init_renderer();
        }
    }
}

impl SeatHandler for WaylandApp {
    fn seat_state(&mut self) -> &mut SeatState {
        &mut self.seat_state
    }

    fn new_seat(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _seat: wl_seat::WlSeat) {
        debug!("New seat");
    }

    fn new_capability(
        &mut self,
        _conn: &Connection,
        qh: &QueueHandle<Self>,
        seat: wl_seat::WlSeat,
        capability: Capability,
    ) {
        debug!("New capability: {:?}", capability);

        if capability == Capability::Keyboard {
            if let Err(e) = self.seat_state.get_keyboard(qh, &seat, None) {
                error!("Failed to get keyboard: {}", e);
            }
        }
    }

    fn remove_capability(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _seat: wl_seat::WlSeat,
        _capability: Capability,
    ) {
        debug!("Capability removed");
    }

    fn remove_seat(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _seat: wl_seat::WlSeat) {
        debug!("Seat removed");
    }
}

impl KeyboardHandler for WaylandApp {
    fn enter(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _surface: &wl_surface::WlSurface,
        _serial: u32,
        _raw: &[u32],
        _keysyms: &[Keysym],
    ) {
        debug!("Keyboard entered surface");
    }

    fn leave(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _surface: &wl_surface::WlSurface,
        _serial: u32,
    ) {
        debug!("Keyboard left surface");
        self.repeat.clear();
    }

    fn press_key(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _serial: u32,
        event: KeyEvent,
    ) {
        debug!("Key pressed: {:?}", event.keysym);

        if let Some(command) = Command::from_keysym(event.keysym) {
            self.app.handle(Event::Command(command));
            if command != Command::Exit {
                self.repeat.press(event.raw_code, command, Instant::now());
            }
        }
    }

    fn release_key(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _serial: u32,
        event: KeyEvent,
    ) {
        self.repeat.release(event.raw_code);
    }

    fn update_modifiers(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _serial: u32,
        _modifiers: Modifiers,
        _layout: u32,
    ) {
    }

    fn update_repeat_info(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        info: RepeatInfo,
    ) {
        debug!("Repeat info: {:?}", info);
        match info {
            RepeatInfo::Repeat { rate, delay } => self.repeat.set_rate(rate.get(), delay),
            RepeatInfo::Disable => self.repeat.disable(),
        }
    }
}

impl ShmHandler for WaylandApp {
    fn shm_state(&mut self) -> &mut Shm {
        &mut self.shm
    }
}

impl ProvidesRegistryState for WaylandApp {
    fn registry(&mut self) -> &mut RegistryState {
        &mut self.registry_state
    }

    registry_handlers![OutputState, SeatState];
}

// Delegate macros
delegate_compositor!(WaylandApp);
delegate_output!(WaylandApp);
delegate_xdg_shell!(WaylandApp);
delegate_xdg_window!(WaylandApp);
delegate_seat!(WaylandApp);
delegate_keyboard!(WaylandApp);
delegate_shm!(WaylandApp);
delegate_registry!(WaylandApp);

/// Run the viewer until the window is closed or the exit key is pressed
pub fn run(image: ImageAsset, image_path: &Path) -> Result<()> {
    // SIGINT/SIGTERM end the loop like a window close
    let quit_requested = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&quit_requested);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("Failed to install signal handler")?;

    info!("Connecting to Wayland display");

    // Connect to Wayland display
    let conn = Connection::connect_to_env().context("Failed to connect to Wayland display")?;

    // Initialize registry and event queue
    let (globals, mut event_queue) =
        registry_queue_init(&conn).context("Failed to initialize registry")?;
    let qh = event_queue.handle();

    // Initialize required globals
    let compositor_state =
        CompositorState::bind(&globals, &qh).context("Failed to bind compositor")?;
    let xdg_shell = XdgShell::bind(&globals, &qh).context("Failed to bind xdg shell")?;
    let shm = Shm::bind(&globals, &qh).context("Failed to bind shm")?;

    // Get the display pointer for GPU rendering
    let display_ptr = conn.backend().display_ptr() as *mut std::ffi::c_void;

    // Create application state
    let mut app = WaylandApp::new(
        RegistryState::new(&globals),
        SeatState::new(&globals, &qh),
        OutputState::new(&globals, &qh),
        shm,
        compositor_state,
        xdg_shell,
        display_ptr,
        image,
    );

    // Create the window at the image's native size
    let surface = app.compositor_state.create_surface(&qh);
    let window = app
        .xdg_shell
        .create_window(surface, WindowDecorations::RequestServer, &qh);
    window.set_title(image_path.display().to_string());
    window.set_app_id("rview");

    // Commit the surface to trigger configure
    window.commit();

    app.window = Some(window);

    info!("Window requested at {}x{}", app.width, app.height);
    info!("Controls: +/= zoom in, - zoom out, arrows pan, r reset, Esc/q quit");

    // Main loop: poll input, update view, render, repeat
    loop {
        poll_events(&mut event_queue, &mut app)?;

        if quit_requested.swap(false, Ordering::SeqCst) {
            app.app.handle(Event::QuitSignal);
        }
        app.fire_repeats(Instant::now());

        if let Some(err) = app.failure.take() {
            return Err(err);
        }
        if !app.app.is_running() {
            break;
        }

        app.draw(&qh);
    }

    info!("Exiting application");
    Ok(())
}

/// Flush requests and dispatch whatever events have arrived, without blocking
fn poll_events(event_queue: &mut EventQueue<WaylandApp>, app: &mut WaylandApp) -> Result<()> {
    event_queue
        .flush()
        .context("Failed to flush Wayland connection")?;

    if let Some(guard) = event_queue.prepare_read() {
        match guard.read() {
            Ok(_) => {}
            Err(WaylandError::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(anyhow!(e).context("Failed to read Wayland events")),
        }
    }

    event_queue
        .dispatch_pending(app)
        .context("Failed to dispatch Wayland events")?;

    Ok(())
}
