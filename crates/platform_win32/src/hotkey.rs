//! Global hotkey backend over `RegisterHotKey`.
//!
//! `WM_HOTKEY` is posted to the thread that registered the key, so
//! registration and the message loop share one dedicated thread. Bind and
//! unbind requests are queued to it and it is woken with a thread message.

use std::sync::mpsc;
use tracing::{debug, info, warn};
use unminimize_core::{HotkeyBackend, HotkeyError, KeyCombo, TrackerEvent};
use windows::Win32::Foundation::{LPARAM, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    RegisterHotKey, UnregisterHotKey, HOT_KEY_MODIFIERS, MOD_NOREPEAT,
};
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, GetMessageW, PeekMessageW, PostThreadMessageW, MSG, PM_NOREMOVE, WM_APP,
    WM_HOTKEY, WM_QUIT, WM_USER,
};

const HOTKEY_ID: i32 = 1;

/// Wakes the pump thread to drain its request queue.
const WM_HOTKEY_REQUEST: u32 = WM_APP + 1;

enum Request {
    Bind(KeyCombo, mpsc::Sender<Result<(), HotkeyError>>),
    Unbind(KeyCombo),
}

struct PumpThread {
    thread_id: u32,
    requests: mpsc::Sender<Request>,
    thread: std::thread::JoinHandle<()>,
}

impl PumpThread {
    fn wake(&self) -> bool {
        unsafe { PostThreadMessageW(self.thread_id, WM_HOTKEY_REQUEST, WPARAM(0), LPARAM(0)) }.is_ok()
    }
}

/// [`HotkeyBackend`] that forwards presses as [`TrackerEvent::HotkeyPressed`].
pub struct Win32HotkeyBackend {
    events: mpsc::Sender<TrackerEvent>,
    pump: Option<PumpThread>,
}

impl Win32HotkeyBackend {
    /// Create a backend delivering presses on `events`.
    pub fn new(events: mpsc::Sender<TrackerEvent>) -> Self {
        Self { events, pump: None }
    }
}

impl HotkeyBackend for Win32HotkeyBackend {
    fn install_handler(&mut self) -> Result<(), HotkeyError> {
        if self.pump.is_some() {
            return Ok(());
        }

        let (request_tx, request_rx) = mpsc::channel();
        let (init_tx, init_rx) = mpsc::channel();
        let events = self.events.clone();

        let thread = std::thread::Builder::new()
            .name("hotkey-pump".to_string())
            .spawn(move || run_pump(request_rx, events, init_tx))
            .map_err(|e| HotkeyError::HandlerFailed(e.to_string()))?;

        let thread_id = init_rx
            .recv()
            .map_err(|_| HotkeyError::HandlerFailed("hotkey thread exited during setup".to_string()))?;

        self.pump = Some(PumpThread {
            thread_id,
            requests: request_tx,
            thread,
        });
        debug!("Hotkey thread started");
        Ok(())
    }

    fn remove_handler(&mut self) {
        if let Some(pump) = self.pump.take() {
            unsafe {
                let _ = PostThreadMessageW(pump.thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
            }
            let _ = pump.thread.join();
            debug!("Hotkey thread stopped");
        }
    }

    fn bind(&mut self, combo: KeyCombo) -> Result<(), HotkeyError> {
        let pump = self
            .pump
            .as_ref()
            .ok_or_else(|| HotkeyError::HandlerFailed("hotkey handler not installed".to_string()))?;

        let (reply_tx, reply_rx) = mpsc::channel();
        let gone = || HotkeyError::HandlerFailed("hotkey thread is gone".to_string());
        pump.requests.send(Request::Bind(combo, reply_tx)).map_err(|_| gone())?;
        if !pump.wake() {
            return Err(gone());
        }
        reply_rx.recv().map_err(|_| gone())?
    }

    fn unbind(&mut self, combo: KeyCombo) {
        if let Some(pump) = &self.pump {
            if pump.requests.send(Request::Unbind(combo)).is_ok() {
                pump.wake();
            }
        }
    }
}

impl Drop for Win32HotkeyBackend {
    fn drop(&mut self) {
        self.remove_handler();
    }
}

fn run_pump(
    requests: mpsc::Receiver<Request>,
    events: mpsc::Sender<TrackerEvent>,
    init_tx: mpsc::Sender<u32>,
) {
    let mut msg = MSG::default();
    unsafe {
        let _ = PeekMessageW(&mut msg, None, WM_USER, WM_USER, PM_NOREMOVE);
    }
    let _ = init_tx.send(unsafe { GetCurrentThreadId() });

    let mut bound: Option<KeyCombo> = None;
    loop {
        let result = unsafe { GetMessageW(&mut msg, None, 0, 0) };
        if result.0 == 0 || result.0 == -1 {
            break;
        }
        match msg.message {
            WM_HOTKEY_REQUEST => {
                while let Ok(request) = requests.try_recv() {
                    match request {
                        Request::Bind(combo, reply) => {
                            let _ = reply.send(bind_on_thread(&mut bound, combo));
                        }
                        Request::Unbind(combo) => {
                            if bound == Some(combo) {
                                unbind_on_thread(&mut bound);
                            }
                        }
                    }
                }
            }
            WM_HOTKEY if msg.wparam.0 as i32 == HOTKEY_ID => {
                debug!("Hotkey pressed");
                if events.send(TrackerEvent::HotkeyPressed).is_err() {
                    break;
                }
            }
            _ => unsafe {
                let _ = DispatchMessageW(&msg);
            },
        }
    }

    unbind_on_thread(&mut bound);
}

fn bind_on_thread(bound: &mut Option<KeyCombo>, combo: KeyCombo) -> Result<(), HotkeyError> {
    unbind_on_thread(bound);

    let modifiers = HOT_KEY_MODIFIERS(combo.modifiers.bits()) | MOD_NOREPEAT;
    unsafe { RegisterHotKey(None, HOTKEY_ID, modifiers, combo.key_code) }.map_err(|e| {
        warn!("RegisterHotKey({}) failed: {}", combo, e);
        HotkeyError::RegistrationFailed {
            combo,
            reason: e.to_string(),
        }
    })?;

    *bound = Some(combo);
    info!("Hotkey {} bound", combo);
    Ok(())
}

fn unbind_on_thread(bound: &mut Option<KeyCombo>) {
    if let Some(combo) = bound.take() {
        if let Err(e) = unsafe { UnregisterHotKey(None, HOTKEY_ID) } {
            warn!("UnregisterHotKey({}) failed: {}", combo, e);
        }
    }
}
