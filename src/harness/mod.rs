//! Event/window harness - the thin loop that drives repeated calls
//!
//! Architecture:
//! - `MessagePump` - window and message primitives, implemented by a
//!   headless `ScriptedPump` and, on Windows, `win32::Win32Pump`
//! - `run_loop` - poll, translate, dispatch; call the frame when idle
//! - `script.rs` - per-frame method calls as data
//! - `compiler.rs` - shader compiler collaborator
//! - `Context` - configuration plus every object the session owns

pub mod compiler;
pub mod script;
#[cfg(windows)]
pub mod win32;

pub use compiler::{CompileOutput, D3DCompiler, ShaderCompiler};
pub use script::{FrameScript, ScriptArg};

use crate::com::{ComPtr, Interface, ReleaseStack, Slot};
use crate::config::{Config, WindowConfig};
use crate::error::DispatchError;
use crate::logging::{log_teardown, perf};
use std::collections::VecDeque;
use thiserror::Error;
use tracing::{debug, info};

pub const WM_DESTROY: u32 = 0x0002;
pub const WM_PAINT: u32 = 0x000F;
pub const WM_CLOSE: u32 = 0x0010;
pub const WM_QUIT: u32 = 0x0012;

/// Harness errors
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("window creation failed: {0}")]
    WindowCreation(String),

    #[error("compiling {entry} ({profile}) failed: {message}")]
    Compile {
        entry: String,
        profile: String,
        message: String,
    },

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Opaque window identity; zero for thread messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WindowHandle(pub usize);

/// What a message means to the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Leave the loop with an exit code
    Quit(i32),
    Destroy,
    Close,
    Paint,
    Other(u32),
}

impl MessageKind {
    pub fn from_raw(id: u32, wparam: usize) -> Self {
        match id {
            WM_QUIT => Self::Quit(wparam as i32),
            WM_DESTROY => Self::Destroy,
            WM_CLOSE => Self::Close,
            WM_PAINT => Self::Paint,
            other => Self::Other(other),
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            Self::Quit(_) => WM_QUIT,
            Self::Destroy => WM_DESTROY,
            Self::Close => WM_CLOSE,
            Self::Paint => WM_PAINT,
            Self::Other(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub window: WindowHandle,
    pub kind: MessageKind,
    pub wparam: usize,
    pub lparam: isize,
}

impl Message {
    pub fn new(window: WindowHandle, kind: MessageKind) -> Self {
        let wparam = match kind {
            MessageKind::Quit(code) => code as usize,
            _ => 0,
        };
        Self {
            window,
            kind,
            wparam,
            lparam: 0,
        }
    }
}

/// Window parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowDesc {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl From<&WindowConfig> for WindowDesc {
    fn from(config: &WindowConfig) -> Self {
        Self {
            title: config.title.clone(),
            width: config.width,
            height: config.height,
        }
    }
}

/// Window and message primitives of the host platform
pub trait MessagePump {
    fn create_window(&mut self, desc: &WindowDesc) -> Result<WindowHandle, HarnessError>;

    /// Next queued message, without blocking
    fn poll_message(&mut self) -> Option<Message>;

    fn translate_message(&mut self, message: &Message);

    fn dispatch_message(&mut self, message: &Message);

    fn post_quit_message(&mut self, code: i32);
}

/// Pump messages until quit, calling `frame` whenever the queue is empty.
///
/// Returns the quit code. A frame error stops the loop.
pub fn run_loop<P, F>(pump: &mut P, mut frame: F) -> Result<i32, HarnessError>
where
    P: MessagePump + ?Sized,
    F: FnMut() -> Result<(), HarnessError>,
{
    loop {
        match pump.poll_message() {
            Some(Message {
                kind: MessageKind::Quit(code),
                ..
            }) => {
                debug!(target: "harness", code, "quit received");
                return Ok(code);
            }
            Some(message) => {
                pump.translate_message(&message);
                pump.dispatch_message(&message);
            }
            None => frame()?,
        }
    }
}

/// One step of a scripted message queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpStep {
    Message(MessageKind),
    /// This many empty polls in a row
    Idle(usize),
}

/// Deterministic, headless pump.
///
/// Plays its steps in order and posts `Quit(0)` once they run out. Dispatching
/// `Close` destroys the window and `Destroy` posts a quit, as a default window
/// procedure would.
#[derive(Debug, Default)]
pub struct ScriptedPump {
    steps: VecDeque<PumpStep>,
    quit: Option<i32>,
    windows: Vec<WindowDesc>,
    translated: Vec<MessageKind>,
    dispatched: Vec<MessageKind>,
}

impl ScriptedPump {
    pub fn new(steps: impl IntoIterator<Item = PumpStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            ..Self::default()
        }
    }

    /// `frames` idle polls, then a close
    pub fn frames(frames: usize) -> Self {
        Self::new([PumpStep::Idle(frames), PumpStep::Message(MessageKind::Close)])
    }

    pub fn windows(&self) -> &[WindowDesc] {
        &self.windows
    }

    pub fn translated(&self) -> &[MessageKind] {
        &self.translated
    }

    /// Dispatched messages, including the destroy a close produces
    pub fn dispatched(&self) -> &[MessageKind] {
        &self.dispatched
    }

    fn current_window(&self) -> WindowHandle {
        WindowHandle(self.windows.len())
    }
}

impl MessagePump for ScriptedPump {
    fn create_window(&mut self, desc: &WindowDesc) -> Result<WindowHandle, HarnessError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(HarnessError::WindowCreation(format!(
                "{}x{} is not a valid client size",
                desc.width, desc.height
            )));
        }
        self.windows.push(desc.clone());
        Ok(self.current_window())
    }

    fn poll_message(&mut self) -> Option<Message> {
        let window = self.current_window();
        if let Some(code) = self.quit.take() {
            return Some(Message::new(WindowHandle(0), MessageKind::Quit(code)));
        }
        loop {
            match self.steps.pop_front() {
                Some(PumpStep::Message(kind)) => return Some(Message::new(window, kind)),
                Some(PumpStep::Idle(0)) => continue,
                Some(PumpStep::Idle(n)) => {
                    if n > 1 {
                        self.steps.push_front(PumpStep::Idle(n - 1));
                    }
                    return None;
                }
                None => return Some(Message::new(WindowHandle(0), MessageKind::Quit(0))),
            }
        }
    }

    fn translate_message(&mut self, message: &Message) {
        self.translated.push(message.kind);
    }

    fn dispatch_message(&mut self, message: &Message) {
        self.dispatched.push(message.kind);
        match message.kind {
            MessageKind::Close => {
                self.dispatched.push(MessageKind::Destroy);
                self.post_quit_message(0);
            }
            MessageKind::Destroy => self.post_quit_message(0),
            _ => {}
        }
    }

    fn post_quit_message(&mut self, code: i32) {
        self.quit.get_or_insert(code);
    }
}

/// Session state: configuration and every object the session created.
///
/// Objects are released in reverse creation order when the context drops.
#[derive(Debug, Default)]
pub struct Context {
    config: Config,
    objects: ReleaseStack,
}

impl Context {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            objects: ReleaseStack::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn objects(&self) -> &ReleaseStack {
        &self.objects
    }

    #[inline]
    pub fn objects_mut(&mut self) -> &mut ReleaseStack {
        &mut self.objects
    }

    /// Hand an object to the session for ordered teardown
    pub fn adopt<I: Interface>(&mut self, ptr: ComPtr<I>) -> Slot<I> {
        self.objects.push(ptr)
    }

    pub fn get<I: Interface>(&self, slot: Slot<I>) -> Option<&ComPtr<I>> {
        self.objects.get(slot)
    }

    pub fn window_desc(&self) -> WindowDesc {
        WindowDesc::from(&self.config.window)
    }

    /// Create the window and run `script` once per idle frame until quit
    pub fn run<P>(&mut self, pump: &mut P, script: &FrameScript) -> Result<i32, HarnessError>
    where
        P: MessagePump + ?Sized,
    {
        let _perf = perf::track("harness.run");
        let desc = self.window_desc();
        let window = pump.create_window(&desc)?;
        info!(
            target: "harness",
            ?window,
            title = %desc.title,
            width = desc.width,
            height = desc.height,
            calls = script.len(),
            "window created"
        );

        let objects = &self.objects;
        let mut frames: u64 = 0;
        let code = run_loop(pump, || {
            frames += 1;
            script.execute(objects)
        })?;
        info!(target: "harness", frames, code, "message loop finished");
        Ok(code)
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        log_teardown(self.objects.len());
        self.objects.clear();
    }
}
