//! WinEvent hooks.
//!
//! # Architecture
//!
//! `SetWinEventHook` delivers out-of-context callbacks on the thread that
//! installed the hook, and only while that thread pumps messages. The hooks
//! therefore live on a dedicated thread running a message loop. The callback
//! maps raw notifications into [`TrackerEvent`]s with the shared
//! [`WatchFilter`] and sends them over a std channel; the daemon forwards that
//! channel onto its control task.
//!
//! The same thread runs a timer that notices terminated processes, since
//! Windows has no global process-exit notification for unrelated processes.

use crate::source::{is_eligible_window, is_process_alive, window_id, window_pid};
use crate::{HookKind, WatchFilter, Win32Error};
use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::{mpsc, Arc};
use tracing::{debug, error, warn};
use unminimize_core::{ProcessId, TrackerEvent};
use windows::Win32::Foundation::{HWND, LPARAM, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Accessibility::{SetWinEventHook, UnhookWinEvent, HWINEVENTHOOK};
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, GetMessageW, KillTimer, PeekMessageW, PostThreadMessageW, SetTimer,
    EVENT_OBJECT_CREATE, EVENT_OBJECT_SHOW, EVENT_SYSTEM_FOREGROUND, EVENT_SYSTEM_MINIMIZEEND,
    EVENT_SYSTEM_MINIMIZESTART, MSG, PM_NOREMOVE, WINEVENT_OUTOFCONTEXT, WINEVENT_SKIPOWNPROCESS,
    WM_QUIT, WM_TIMER, WM_USER,
};

/// How often watched processes are checked for exit.
pub const LIVENESS_INTERVAL_MS: u32 = 2000;

const OBJID_WINDOW: i32 = 0;
const CHILDID_SELF: i32 = 0;

struct HookContext {
    sender: mpsc::Sender<TrackerEvent>,
    filter: Arc<WatchFilter>,
}

thread_local! {
    static HOOK_CONTEXT: RefCell<Option<HookContext>> = const { RefCell::new(None) };
}

/// Handle for the hook thread. Dropping it unhooks and joins the thread.
pub struct EventHookHandle {
    thread_id: u32,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl Drop for EventHookHandle {
    fn drop(&mut self) {
        unsafe {
            let _ = PostThreadMessageW(self.thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        debug!("WinEvent hook thread stopped");
    }
}

/// Install WinEvent hooks for foreground, minimize and window-creation events.
///
/// Returns a handle that must be kept alive to receive events, and the
/// receiving end of the event channel.
pub fn install_event_hooks(
    filter: Arc<WatchFilter>,
) -> Result<(EventHookHandle, mpsc::Receiver<TrackerEvent>), Win32Error> {
    let (event_tx, event_rx) = mpsc::channel();
    let (init_tx, init_rx) = mpsc::channel::<Result<u32, Win32Error>>();

    let thread = std::thread::Builder::new()
        .name("winevent-hook".to_string())
        .spawn(move || run_hook_thread(filter, event_tx, init_tx))
        .map_err(|e| Win32Error::HookInstallFailed(e.to_string()))?;

    let thread_id = init_rx
        .recv()
        .map_err(|_| Win32Error::HookInstallFailed("Hook thread init failed".to_string()))??;

    Ok((
        EventHookHandle {
            thread_id,
            thread: Some(thread),
        },
        event_rx,
    ))
}

fn run_hook_thread(
    filter: Arc<WatchFilter>,
    sender: mpsc::Sender<TrackerEvent>,
    init_tx: mpsc::Sender<Result<u32, Win32Error>>,
) {
    let mut msg = MSG::default();
    // Create the message queue before the thread id is published
    unsafe {
        let _ = PeekMessageW(&mut msg, None, WM_USER, WM_USER, PM_NOREMOVE);
    }

    HOOK_CONTEXT.with(|ctx| {
        *ctx.borrow_mut() = Some(HookContext {
            sender,
            filter: filter.clone(),
        })
    });

    let ranges = [
        (EVENT_SYSTEM_FOREGROUND, EVENT_SYSTEM_FOREGROUND),
        (EVENT_SYSTEM_MINIMIZESTART, EVENT_SYSTEM_MINIMIZEEND),
        (EVENT_OBJECT_CREATE, EVENT_OBJECT_CREATE),
        (EVENT_OBJECT_SHOW, EVENT_OBJECT_SHOW),
    ];
    let mut hooks: Vec<HWINEVENTHOOK> = Vec::with_capacity(ranges.len());
    for (min, max) in ranges {
        let hook = unsafe {
            SetWinEventHook(
                min,
                max,
                None,
                Some(win_event_proc),
                0,
                0,
                WINEVENT_OUTOFCONTEXT | WINEVENT_SKIPOWNPROCESS,
            )
        };
        if hook.is_invalid() {
            unhook_all(&hooks);
            let _ = init_tx.send(Err(Win32Error::HookInstallFailed(format!(
                "SetWinEventHook(0x{:X}..0x{:X}) failed",
                min, max
            ))));
            return;
        }
        hooks.push(hook);
    }

    let timer = unsafe { SetTimer(None, 0, LIVENESS_INTERVAL_MS, None) };
    if timer == 0 {
        warn!("Liveness timer unavailable; exited processes are only noticed on rescan");
    }

    let _ = init_tx.send(Ok(unsafe { GetCurrentThreadId() }));
    debug!("WinEvent hooks installed ({} ranges)", hooks.len());

    let mut reported: HashSet<ProcessId> = HashSet::new();
    loop {
        let result = unsafe { GetMessageW(&mut msg, None, 0, 0) };
        if result.0 == 0 || result.0 == -1 {
            break;
        }
        if msg.message == WM_TIMER && timer != 0 && msg.wparam.0 == timer {
            check_liveness(&filter, &mut reported);
            continue;
        }
        unsafe {
            let _ = DispatchMessageW(&msg);
        }
    }

    if timer != 0 {
        let _ = unsafe { KillTimer(None, timer) };
    }
    unhook_all(&hooks);
    HOOK_CONTEXT.with(|ctx| ctx.borrow_mut().take());
}

fn unhook_all(hooks: &[HWINEVENTHOOK]) {
    for &hook in hooks {
        let _ = unsafe { UnhookWinEvent(hook) };
    }
}

/// Report watched processes that have exited, once per exit.
fn check_liveness(filter: &WatchFilter, reported: &mut HashSet<ProcessId>) {
    let watched = filter.watched_pids();
    reported.retain(|pid| watched.contains(pid));

    for pid in watched {
        if reported.contains(&pid) || is_process_alive(pid) {
            continue;
        }
        debug!("Process {} exited", pid);
        reported.insert(pid);
        send(TrackerEvent::ProcessTerminated(pid));
    }
}

fn send(event: TrackerEvent) {
    HOOK_CONTEXT.with(|ctx| {
        if let Some(ctx) = ctx.borrow().as_ref() {
            let _ = ctx.sender.send(event);
        }
    });
}

unsafe extern "system" fn win_event_proc(
    _hook: HWINEVENTHOOK,
    event: u32,
    hwnd: HWND,
    id_object: i32,
    id_child: i32,
    _event_thread: u32,
    _event_time: u32,
) {
    if hwnd.is_invalid() || id_object != OBJID_WINDOW || id_child != CHILDID_SELF {
        return;
    }

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handle_win_event(event, hwnd)));
    if let Err(e) = result {
        error!("Panic in WinEvent callback: {:?}", e);
    }
}

fn handle_win_event(event: u32, hwnd: HWND) {
    let kind = match event {
        EVENT_SYSTEM_FOREGROUND => HookKind::Foreground,
        EVENT_SYSTEM_MINIMIZESTART => HookKind::MinimizeStart,
        EVENT_SYSTEM_MINIMIZEEND => HookKind::MinimizeEnd,
        EVENT_OBJECT_CREATE | EVENT_OBJECT_SHOW => HookKind::Shown,
        _ => return,
    };

    let pid = window_pid(hwnd);
    if pid == 0 {
        return;
    }

    let classified = HOOK_CONTEXT.with(|ctx| {
        ctx.borrow()
            .as_ref()
            .and_then(|ctx| ctx.filter.classify(kind, pid, window_id(hwnd), is_eligible_window(hwnd)))
    });

    if let Some(event) = classified {
        debug!("WinEvent {:?} -> {:?}", kind, event);
        send(event);
    }
}
