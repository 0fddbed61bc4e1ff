//! Win32 message pump

use super::{HarnessError, Message, MessageKind, MessagePump, WindowDesc, WindowHandle};
use std::ptr::{null, null_mut};
use tracing::{debug, warn};
use winapi::shared::minwindef::{HINSTANCE, LPARAM, LRESULT, UINT, WPARAM};
use winapi::shared::windef::{HWND, POINT, RECT};
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::libloaderapi::GetModuleHandleW;
use winapi::um::winuser::{
    AdjustWindowRect, CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, IsWindow,
    LoadCursorW, PeekMessageW, PostQuitMessage, RegisterClassExW, TranslateMessage,
    UnregisterClassW, ValidateRect, CS_HREDRAW, CS_VREDRAW, CW_USEDEFAULT, IDC_ARROW, MSG,
    PM_REMOVE, WM_DESTROY, WM_PAINT, WNDCLASSEXW, WS_OVERLAPPEDWINDOW, WS_VISIBLE,
};

const CLASS_NAME: &str = "vtcall.window";

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

unsafe extern "system" fn window_proc(
    hwnd: HWND,
    msg: UINT,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match msg {
        WM_PAINT => {
            ValidateRect(hwnd, null());
            0
        }
        WM_DESTROY => {
            PostQuitMessage(0);
            0
        }
        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}

/// Message pump over the calling thread's Win32 queue
#[derive(Debug)]
pub struct Win32Pump {
    instance: HINSTANCE,
    class: Vec<u16>,
    windows: Vec<HWND>,
}

impl Win32Pump {
    /// Register the window class
    pub fn new() -> Result<Self, HarnessError> {
        let class = wide(CLASS_NAME);
        // SAFETY: plain Win32 calls with valid, NUL-terminated strings
        unsafe {
            let instance = GetModuleHandleW(null());
            let wc = WNDCLASSEXW {
                cbSize: std::mem::size_of::<WNDCLASSEXW>() as UINT,
                style: CS_HREDRAW | CS_VREDRAW,
                lpfnWndProc: Some(window_proc),
                cbClsExtra: 0,
                cbWndExtra: 0,
                hInstance: instance,
                hIcon: null_mut(),
                hCursor: LoadCursorW(null_mut(), IDC_ARROW),
                hbrBackground: null_mut(),
                lpszMenuName: null(),
                lpszClassName: class.as_ptr(),
                hIconSm: null_mut(),
            };
            if RegisterClassExW(&wc) == 0 {
                return Err(HarnessError::WindowCreation(format!(
                    "RegisterClassExW failed with error {}",
                    GetLastError()
                )));
            }
            Ok(Self {
                instance,
                class,
                windows: Vec::new(),
            })
        }
    }

    fn raw(message: &Message) -> MSG {
        MSG {
            hwnd: message.window.0 as HWND,
            message: message.kind.raw(),
            wParam: message.wparam,
            lParam: message.lparam,
            time: 0,
            pt: POINT { x: 0, y: 0 },
        }
    }
}

impl MessagePump for Win32Pump {
    fn create_window(&mut self, desc: &WindowDesc) -> Result<WindowHandle, HarnessError> {
        let title = wide(&desc.title);
        let mut rect = RECT {
            left: 0,
            top: 0,
            right: desc.width as i32,
            bottom: desc.height as i32,
        };
        // SAFETY: the class was registered in `new`; strings outlive the call
        let hwnd = unsafe {
            AdjustWindowRect(&mut rect, WS_OVERLAPPEDWINDOW, 0);
            CreateWindowExW(
                0,
                self.class.as_ptr(),
                title.as_ptr(),
                WS_OVERLAPPEDWINDOW | WS_VISIBLE,
                CW_USEDEFAULT,
                CW_USEDEFAULT,
                rect.right - rect.left,
                rect.bottom - rect.top,
                null_mut(),
                null_mut(),
                self.instance,
                null_mut(),
            )
        };
        if hwnd.is_null() {
            // SAFETY: reads the calling thread's last error
            let code = unsafe { GetLastError() };
            return Err(HarnessError::WindowCreation(format!(
                "CreateWindowExW failed with error {}",
                code
            )));
        }
        debug!(target: "harness", hwnd = ?hwnd, "window created");
        self.windows.push(hwnd);
        Ok(WindowHandle(hwnd as usize))
    }

    fn poll_message(&mut self) -> Option<Message> {
        // SAFETY: MSG is plain data
        let mut msg: MSG = unsafe { std::mem::zeroed() };
        // SAFETY: `msg` is a valid out-param
        if unsafe { PeekMessageW(&mut msg, null_mut(), 0, 0, PM_REMOVE) } == 0 {
            return None;
        }
        Some(Message {
            window: WindowHandle(msg.hwnd as usize),
            kind: MessageKind::from_raw(msg.message, msg.wParam),
            wparam: msg.wParam,
            lparam: msg.lParam,
        })
    }

    fn translate_message(&mut self, message: &Message) {
        let msg = Self::raw(message);
        // SAFETY: `msg` came from our own queue
        unsafe { TranslateMessage(&msg) };
    }

    fn dispatch_message(&mut self, message: &Message) {
        let msg = Self::raw(message);
        // SAFETY: as above
        unsafe { DispatchMessageW(&msg) };
    }

    fn post_quit_message(&mut self, code: i32) {
        // SAFETY: posts to the calling thread's queue
        unsafe { PostQuitMessage(code) };
    }
}

impl Drop for Win32Pump {
    fn drop(&mut self) {
        // SAFETY: handles were created by this pump on this thread
        unsafe {
            for hwnd in self.windows.drain(..) {
                if IsWindow(hwnd) != 0 {
                    DestroyWindow(hwnd);
                }
            }
            if UnregisterClassW(self.class.as_ptr(), self.instance) == 0 {
                warn!(target: "harness", error = GetLastError(), "failed to unregister window class");
            }
        }
    }
}
