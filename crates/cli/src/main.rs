//! Unminimize CLI
//!
//! Command-line interface for controlling the Unminimize daemon.
//!
//! Commands are sent to the daemon via IPC (named pipe).

#![cfg_attr(not(windows), allow(dead_code))]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use unminimize_ipc::{
    IpcCommand, IpcResponse, IpcScope, MinimizedWindowInfo, IPC_READ_TIMEOUT_SECS, MAX_IPC_MESSAGE_SIZE,
};

#[derive(Parser)]
#[command(name = "unminimize-cli")]
#[command(author, version, about = "Control the Unminimize daemon")]
struct Cli {
    /// Print the raw JSON response
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Restore the most recently minimized window
    Restore {
        /// Override the configured scope
        #[arg(short, long, value_enum)]
        scope: Option<ScopeArg>,
    },
    /// Show which window a restore would bring back
    Latest {
        /// Override the configured scope
        #[arg(short, long, value_enum)]
        scope: Option<ScopeArg>,
    },
    /// List tracked minimized windows, newest first
    List,
    /// Show daemon status
    Status,
    /// Manage the global hotkey
    Hotkey {
        #[command(subcommand)]
        action: HotkeyAction,
    },
    /// Set the default restore scope
    Scope {
        #[arg(value_enum)]
        scope: ScopeArg,
    },
    /// Re-observe all running applications
    Rescan,
    /// Reload configuration
    Reload,
    /// Stop the daemon
    Stop,
    /// Print the configuration file path
    ConfigPath,
}

#[derive(Subcommand)]
enum HotkeyAction {
    /// Release the hotkey until resumed
    Suspend,
    /// Register the hotkey again
    Resume,
    /// Replace the hotkey, e.g. "Ctrl+Alt+M"
    Set {
        /// Key combination with at least one modifier
        shortcut: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ScopeArg {
    /// Any application
    Any,
    /// Only the frontmost application
    Active,
}

impl From<ScopeArg> for IpcScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::Any => IpcScope::AnyApplication,
            ScopeArg::Active => IpcScope::ActiveApplication,
        }
    }
}

/// Map a subcommand to the IPC command it sends, if any.
fn to_ipc_command(command: &Commands) -> Option<IpcCommand> {
    Some(match command {
        Commands::Restore { scope } => IpcCommand::RestoreLatest {
            scope: scope.map(Into::into),
        },
        Commands::Latest { scope } => IpcCommand::QueryLatest {
            scope: scope.map(Into::into),
        },
        Commands::List => IpcCommand::ListMinimized,
        Commands::Status => IpcCommand::Status,
        Commands::Hotkey { action } => match action {
            HotkeyAction::Suspend => IpcCommand::SuspendHotkey,
            HotkeyAction::Resume => IpcCommand::ResumeHotkey,
            HotkeyAction::Set { shortcut } => IpcCommand::SetHotkey {
                shortcut: shortcut.clone(),
            },
        },
        Commands::Scope { scope } => IpcCommand::SetScope { scope: (*scope).into() },
        Commands::Rescan => IpcCommand::Rescan,
        Commands::Reload => IpcCommand::Reload,
        Commands::Stop => IpcCommand::Stop,
        Commands::ConfigPath => return None,
    })
}

fn describe_window(info: &MinimizedWindowInfo) -> String {
    format!(
        "0x{:X}  {:<20} {}  ({}s ago)",
        info.window_id,
        info.app_name,
        info.title.as_deref().unwrap_or("<untitled>"),
        info.minimized_secs_ago
    )
}

/// Human-readable rendering of a successful response.
fn format_response(response: &IpcResponse) -> String {
    match response {
        IpcResponse::Ok => "OK".to_string(),
        IpcResponse::Error { message } => format!("Error: {}", message),
        IpcResponse::Window { window: Some(info) } => describe_window(info),
        IpcResponse::Window { window: None } => "No minimized window to restore".to_string(),
        IpcResponse::WindowList { windows } if windows.is_empty() => "No minimized windows".to_string(),
        IpcResponse::WindowList { windows } => windows
            .iter()
            .map(describe_window)
            .collect::<Vec<_>>()
            .join("\n"),
        IpcResponse::Status {
            tracking,
            observed_processes,
            minimized_windows,
            scope,
            hotkey,
            hotkey_suspended,
        } => {
            let scope = match scope {
                IpcScope::AnyApplication => "any application",
                IpcScope::ActiveApplication => "active application",
            };
            let hotkey = match (hotkey, hotkey_suspended) {
                (Some(combo), true) => format!("{} (suspended)", combo),
                (Some(combo), false) => combo.clone(),
                (None, _) => "none".to_string(),
            };
            format!(
                "Tracking:  {}\nObserved:  {} applications\nMinimized: {} windows\nScope:     {}\nHotkey:    {}",
                if *tracking { "on" } else { "off" },
                observed_processes,
                minimized_windows,
                scope,
                hotkey
            )
        }
        IpcResponse::Restored { window } => format!("Restored {}", describe_window(window)),
    }
}

/// Send one command over an established connection and read the reply.
async fn exchange<T>(stream: T, cmd: &IpcCommand) -> Result<IpcResponse>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);

    let request = serde_json::to_string(cmd).context("Failed to serialize command")? + "\n";
    writer.write_all(request.as_bytes()).await.context("Failed to send command")?;
    writer.flush().await?;

    let mut reader = BufReader::new(reader.take(MAX_IPC_MESSAGE_SIZE as u64));
    let mut line = String::new();
    let read = tokio::time::timeout(Duration::from_secs(IPC_READ_TIMEOUT_SECS), reader.read_line(&mut line))
        .await
        .context("Timed out waiting for the daemon")?
        .context("Failed to read response")?;
    if read == 0 {
        bail!("Daemon closed the connection without replying");
    }

    serde_json::from_str(line.trim()).context("Invalid response from daemon")
}

/// Connect to the daemon pipe and send one command.
#[cfg(windows)]
async fn send_command(cmd: &IpcCommand) -> Result<IpcResponse> {
    use tokio::net::windows::named_pipe::ClientOptions;
    use unminimize_ipc::PIPE_NAME;

    // All pipe instances busy
    const ERROR_PIPE_BUSY: i32 = 231;

    let mut attempts = 0;
    let client = loop {
        match ClientOptions::new().open(PIPE_NAME) {
            Ok(client) => break client,
            Err(e) if e.raw_os_error() == Some(ERROR_PIPE_BUSY) && attempts < 10 => {
                attempts += 1;
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Cannot connect to {}. Is the daemon running?", PIPE_NAME))
            }
        }
    };

    exchange(client, cmd).await
}

#[cfg(not(windows))]
async fn send_command(_cmd: &IpcCommand) -> Result<IpcResponse> {
    bail!("The Unminimize daemon only runs on Windows")
}

fn config_path() -> Option<std::path::PathBuf> {
    directories::ProjectDirs::from("com", "unminimize", "unminimize").map(|dirs| dirs.config_dir().join("config.toml"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let Some(cmd) = to_ipc_command(&cli.command) else {
        match config_path() {
            Some(path) => println!("{}", path.display()),
            None => bail!("No configuration directory available"),
        }
        return Ok(());
    };

    let response = send_command(&cmd).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else if !matches!(response, IpcResponse::Error { .. }) {
        println!("{}", format_response(&response));
    }

    if let IpcResponse::Error { message } = response {
        bail!(message);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    fn parse(args: &[&str]) -> Commands {
        let mut argv = vec!["unminimize-cli"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().command
    }

    fn info(title: Option<&str>) -> MinimizedWindowInfo {
        MinimizedWindowInfo {
            window_id: 0x2A,
            pid: 7,
            app_id: r"c:\apps\editor.exe".to_string(),
            app_name: "editor".to_string(),
            title: title.map(str::to_string),
            minimized_secs_ago: 3,
        }
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_restore_maps_scope() {
        assert_eq!(
            to_ipc_command(&parse(&["restore"])),
            Some(IpcCommand::RestoreLatest { scope: None })
        );
        assert_eq!(
            to_ipc_command(&parse(&["restore", "--scope", "active"])),
            Some(IpcCommand::RestoreLatest {
                scope: Some(IpcScope::ActiveApplication)
            })
        );
    }

    #[test]
    fn test_hotkey_subcommands() {
        assert_eq!(
            to_ipc_command(&parse(&["hotkey", "set", "Ctrl+Shift+U"])),
            Some(IpcCommand::SetHotkey {
                shortcut: "Ctrl+Shift+U".to_string()
            })
        );
        assert_eq!(
            to_ipc_command(&parse(&["hotkey", "suspend"])),
            Some(IpcCommand::SuspendHotkey)
        );
    }

    #[test]
    fn test_scope_and_config_path() {
        assert_eq!(
            to_ipc_command(&parse(&["scope", "any"])),
            Some(IpcCommand::SetScope {
                scope: IpcScope::AnyApplication
            })
        );
        assert_eq!(to_ipc_command(&parse(&["config-path"])), None);
    }

    #[test]
    fn test_format_window_list() {
        let text = format_response(&IpcResponse::WindowList {
            windows: vec![info(Some("notes.txt")), info(None)],
        });
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0x2A"));
        assert!(lines[0].contains("notes.txt"));
        assert!(lines[1].contains("<untitled>"));

        assert_eq!(
            format_response(&IpcResponse::WindowList { windows: vec![] }),
            "No minimized windows"
        );
    }

    #[test]
    fn test_format_status_suspended() {
        let text = format_response(&IpcResponse::Status {
            tracking: true,
            observed_processes: 5,
            minimized_windows: 2,
            scope: IpcScope::ActiveApplication,
            hotkey: Some("Ctrl+Alt+M".to_string()),
            hotkey_suspended: true,
        });
        assert!(text.contains("Ctrl+Alt+M (suspended)"));
        assert!(text.contains("active application"));
    }

    #[tokio::test]
    async fn test_exchange_roundtrip() {
        let (client, server) = duplex(4096);
        let daemon = tokio::spawn(async move {
            let (reader, mut writer) = tokio::io::split(server);
            let mut line = String::new();
            BufReader::new(reader).read_line(&mut line).await.unwrap();
            let cmd: IpcCommand = serde_json::from_str(line.trim()).unwrap();
            assert_eq!(cmd, IpcCommand::Status);
            writer.write_all(b"{\"status\":\"ok\"}\n").await.unwrap();
        });

        let response = exchange(client, &IpcCommand::Status).await.unwrap();

        assert_eq!(response, IpcResponse::Ok);
        daemon.await.unwrap();
    }

    #[tokio::test]
    async fn test_exchange_without_reply_fails() {
        let (client, server) = duplex(4096);
        drop(server);
        assert!(exchange(client, &IpcCommand::Rescan).await.is_err());
    }
}
