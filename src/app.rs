// Application state module
// Viewer state machine driven by keyboard commands and window events

use crate::view::{DestRect, ViewState};
use log::{debug, info};
use smithay_client_toolkit::seat::keyboard::Keysym;

/// Lifecycle of the viewer loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Terminated,
}

/// Discrete keyboard commands understood by the viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ZoomIn,
    ZoomOut,
    PanLeft,
    PanRight,
    PanUp,
    PanDown,
    Reset,
    Exit,
}

impl Command {
    /// Map a pressed key to a viewer command
    pub fn from_keysym(keysym: Keysym) -> Option<Self> {
        let command = match keysym {
            Keysym::plus | Keysym::equal | Keysym::KP_Add => Self::ZoomIn,
            Keysym::minus | Keysym::KP_Subtract => Self::ZoomOut,
            Keysym::Left => Self::PanLeft,
            Keysym::Right => Self::PanRight,
            Keysym::Up => Self::PanUp,
            Keysym::Down => Self::PanDown,
            Keysym::r | Keysym::R => Self::Reset,
            Keysym::Escape | Keysym::q => Self::Exit,
            _ => return None,
        };
        Some(command)
    }
}

/// Input events fed to the state machine, in arrival order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The compositor asked the window to close
    CloseRequested,
    /// SIGINT or SIGTERM reached the process
    QuitSignal,
    Command(Command),
}

/// Main application state
#[derive(Debug)]
pub struct AppState {
    state: LoopState,
    view: ViewState,
    /// Native image dimensions
    image_size: (u32, u32),
}

impl AppState {
    /// Create a running viewer for an image of the given size
    pub fn new(image_size: (u32, u32)) -> Self {
        Self {
            state: LoopState::Running,
            view: ViewState::identity(),
            image_size,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    /// Apply one event. Events after termination are ignored.
    pub fn handle(&mut self, event: Event) {
        if self.state == LoopState::Terminated {
            return;
        }

        let command = match event {
            Event::CloseRequested => {
                info!("Window close requested");
                self.state = LoopState::Terminated;
                return;
            }
            Event::QuitSignal => {
                info!("Quit signal received");
                self.state = LoopState::Terminated;
                return;
            }
            Event::Command(command) => command,
        };

        match command {
            Command::Exit => {
                info!("Exit key pressed");
                self.state = LoopState::Terminated;
                return;
            }
            Command::ZoomIn => self.view.zoom_in(),
            Command::ZoomOut => self.view.zoom_out(),
            // Arrow keys move the image, not the camera
            Command::PanLeft => self.view.pan(1, 0),
            Command::PanRight => self.view.pan(-1, 0),
            Command::PanUp => self.view.pan(0, 1),
            Command::PanDown => self.view.pan(0, -1),
            Command::Reset => self.view.reset(),
        }
        debug!("{:?} -> {:?}", command, self.view);
    }

    /// Destination rectangle for the current frame
    pub fn frame_rect(&self, window_size: (u32, u32)) -> DestRect {
        self.view.dest_rect(self.image_size, window_size)
    }
}
