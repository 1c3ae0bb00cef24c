//! Unminimize IPC Protocol
//!
//! Shared types for daemon-CLI communication over Windows named pipes.
//! One JSON line per request, one JSON line per response.

use serde::{Deserialize, Serialize};

/// Named pipe path for IPC communication.
pub const PIPE_NAME: &str = r"\\.\pipe\unminimize";

/// Maximum size of a single IPC message in bytes.
pub const MAX_IPC_MESSAGE_SIZE: usize = 64 * 1024;

/// Seconds the daemon waits for a client to send its request.
pub const IPC_READ_TIMEOUT_SECS: u64 = 5;

/// Which minimized windows are candidates for restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IpcScope {
    /// Most recently minimized window of any application.
    #[default]
    AnyApplication,
    /// Most recently minimized window of the frontmost application.
    ActiveApplication,
}

/// Commands that can be sent from the CLI to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcCommand {
    /// Restore the most recently minimized window.
    RestoreLatest {
        /// Scope override; the configured scope is used when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope: Option<IpcScope>,
    },
    /// Report which window a restore would bring back, without restoring it.
    QueryLatest {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope: Option<IpcScope>,
    },
    /// List every tracked minimized window, newest first.
    ListMinimized,
    /// Query daemon status.
    Status,

    /// Temporarily release the global hotkey.
    SuspendHotkey,
    /// Re-register the global hotkey after a suspend.
    ResumeHotkey,
    /// Replace the global hotkey, e.g. `Ctrl+Alt+M`.
    SetHotkey { shortcut: String },
    /// Change the default restore scope.
    SetScope { scope: IpcScope },

    /// Re-observe all running applications.
    Rescan,
    /// Reload configuration from file.
    Reload,
    /// Stop the daemon.
    Stop,
}

/// A tracked minimized window as reported to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinimizedWindowInfo {
    /// Raw window handle.
    pub window_id: u64,
    /// Owning process.
    pub pid: u32,
    /// Stable application identifier.
    pub app_id: String,
    /// Application display name.
    pub app_name: String,
    /// Window title, if the OS supplied one.
    #[serde(default)]
    pub title: Option<String>,
    /// Seconds since the window was seen minimizing.
    pub minimized_secs_ago: u64,
}

/// Responses from the daemon to the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IpcResponse {
    /// Command executed successfully.
    Ok,
    /// Command failed with an error.
    Error {
        /// Error message describing what went wrong.
        message: String,
    },
    /// Restore candidate query response.
    Window {
        /// The candidate, or `None` when nothing would be restored.
        window: Option<MinimizedWindowInfo>,
    },
    /// Minimized window list response.
    WindowList { windows: Vec<MinimizedWindowInfo> },
    /// Daemon status response.
    Status {
        /// Whether the tracker is observing applications.
        tracking: bool,
        /// Number of observed processes.
        observed_processes: usize,
        /// Number of tracked minimized windows.
        minimized_windows: usize,
        /// Configured restore scope.
        scope: IpcScope,
        /// Registered hotkey, if any.
        hotkey: Option<String>,
        /// Whether the hotkey is suspended.
        hotkey_suspended: bool,
    },
    /// A window was restored.
    Restored { window: MinimizedWindowInfo },
}

impl IpcResponse {
    /// Create an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_window() -> MinimizedWindowInfo {
        MinimizedWindowInfo {
            window_id: 0x1A2B,
            pid: 4242,
            app_id: r"c:\program files\notepad++\notepad++.exe".to_string(),
            app_name: "notepad++".to_string(),
            title: Some("notes.txt".to_string()),
            minimized_secs_ago: 12,
        }
    }

    #[test]
    fn test_command_serialization() {
        let cmd = IpcCommand::ListMinimized;
        let json = serde_json::to_string(&cmd).unwrap();
        assert_eq!(json, r#"{"type":"list_minimized"}"#);

        let cmd2: IpcCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(cmd, cmd2);
    }

    #[test]
    fn test_restore_scope_is_optional() {
        let cmd: IpcCommand = serde_json::from_str(r#"{"type":"restore_latest"}"#).unwrap();
        assert_eq!(cmd, IpcCommand::RestoreLatest { scope: None });

        let cmd: IpcCommand =
            serde_json::from_str(r#"{"type":"restore_latest","scope":"active_application"}"#).unwrap();
        assert_eq!(
            cmd,
            IpcCommand::RestoreLatest {
                scope: Some(IpcScope::ActiveApplication)
            }
        );

        let json = serde_json::to_string(&IpcCommand::QueryLatest { scope: None }).unwrap();
        assert!(!json.contains("scope"));
    }

    #[test]
    fn test_set_hotkey_serialization() {
        let cmd = IpcCommand::SetHotkey {
            shortcut: "Ctrl+Shift+R".to_string(),
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("set_hotkey"));
        assert!(json.contains("Ctrl+Shift+R"));
    }

    #[test]
    fn test_status_response_serialization() {
        let resp = IpcResponse::Status {
            tracking: true,
            observed_processes: 7,
            minimized_windows: 2,
            scope: IpcScope::AnyApplication,
            hotkey: Some("Ctrl+Alt+M".to_string()),
            hotkey_suspended: false,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""status":"status""#));
        assert!(json.contains(r#""scope":"any_application""#));
        assert!(json.contains(r#""observed_processes":7"#));

        let resp2: IpcResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(resp, resp2);
    }

    #[test]
    fn test_window_responses_roundtrip() {
        let responses = vec![
            IpcResponse::Ok,
            IpcResponse::error("Test error"),
            IpcResponse::Window { window: None },
            IpcResponse::Window {
                window: Some(sample_window()),
            },
            IpcResponse::WindowList {
                windows: vec![sample_window()],
            },
            IpcResponse::Restored {
                window: sample_window(),
            },
        ];

        for resp in responses {
            let json = serde_json::to_string(&resp).expect("Failed to serialize response");
            let roundtrip: IpcResponse =
                serde_json::from_str(&json).expect("Failed to deserialize response");
            assert_eq!(resp, roundtrip, "Roundtrip failed for {:?}", resp);
        }
    }

    #[test]
    fn test_window_title_may_be_missing() {
        let json = r#"{"window_id":1,"pid":2,"app_id":"a","app_name":"A","minimized_secs_ago":0}"#;
        let info: MinimizedWindowInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.title, None);
    }

    #[test]
    fn test_line_delimited_protocol() {
        // Simulate the actual IPC protocol: JSON + newline
        let cmd = IpcCommand::SetScope {
            scope: IpcScope::ActiveApplication,
        };
        let wire_format = serde_json::to_string(&cmd).unwrap() + "\n";

        let parsed: IpcCommand = serde_json::from_str(wire_format.trim()).unwrap();
        assert_eq!(cmd, parsed);
    }

    #[test]
    fn test_invalid_json_handling() {
        let result: Result<IpcCommand, _> = serde_json::from_str("not valid json");
        assert!(result.is_err());

        let result: Result<IpcCommand, _> = serde_json::from_str("{\"type\": \"focus_left\"}");
        assert!(result.is_err());

        let result: Result<IpcCommand, _> =
            serde_json::from_str(r#"{"type":"set_scope","scope":"everything"}"#);
        assert!(result.is_err());

        let result: Result<IpcResponse, _> = serde_json::from_str("{\"status\": \"invalid\"}");
        assert!(result.is_err());
    }

    #[test]
    fn test_pipe_name_format() {
        assert!(PIPE_NAME.starts_with(r"\\.\pipe\"));
        assert_eq!(PIPE_NAME, r"\\.\pipe\unminimize");
    }
}
