//! Named-pipe IPC server.
//!
//! One JSON command per connection, one JSON response back. Commands are
//! handed to the event loop and answered through a oneshot channel.

use crate::DaemonEvent;
use anyhow::Result;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use unminimize_ipc::{IpcCommand, IpcResponse, IPC_READ_TIMEOUT_SECS, MAX_IPC_MESSAGE_SIZE};

/// IPC read timeout - clients must send within this period.
pub const IPC_READ_TIMEOUT: Duration = Duration::from_secs(IPC_READ_TIMEOUT_SECS);

/// Run the IPC server, accepting connections and dispatching commands.
#[cfg(windows)]
pub async fn run_ipc_server(event_tx: mpsc::Sender<DaemonEvent>) {
    use tokio::net::windows::named_pipe::{PipeMode, ServerOptions};
    use tracing::error;
    use unminimize_ipc::PIPE_NAME;

    let mut is_first_instance = true;

    loop {
        let server = match ServerOptions::new()
            .first_pipe_instance(is_first_instance)
            .pipe_mode(PipeMode::Byte)
            .create(PIPE_NAME)
        {
            Ok(s) => {
                is_first_instance = false;
                s
            }
            Err(e) => {
                error!("Failed to create named pipe server: {}", e);
                if is_first_instance {
                    error!("Is another unminimize daemon already running?");
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        debug!("Waiting for client connection on {}", PIPE_NAME);

        if let Err(e) = server.connect().await {
            error!("Failed to accept client connection: {}", e);
            continue;
        }

        debug!("Client connected");

        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(server, event_tx, IPC_READ_TIMEOUT).await {
                warn!("Client handler error: {}", e);
            }
        });
    }
}

/// Check if another daemon instance is already running by probing the named pipe.
#[cfg(windows)]
pub async fn check_already_running() -> bool {
    tokio::net::windows::named_pipe::ClientOptions::new()
        .open(unminimize_ipc::PIPE_NAME)
        .is_ok()
}

/// Handle a single client connection.
///
/// A client that sends nothing within `read_timeout` is dropped silently.
pub async fn handle_client<T>(
    stream: T,
    event_tx: mpsc::Sender<DaemonEvent>,
    read_timeout: Duration,
) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader.take(MAX_IPC_MESSAGE_SIZE as u64));
    let mut line = String::new();

    let bytes_read = match tokio::time::timeout(read_timeout, reader.read_line(&mut line)).await {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Ok(()),
    };
    if bytes_read == 0 {
        return Ok(());
    }

    let line = line.trim();
    debug!("Received command: {}", line);

    let cmd: IpcCommand = match serde_json::from_str(line) {
        Ok(cmd) => cmd,
        Err(e) => {
            write_response(&mut writer, &IpcResponse::error(format!("Invalid command: {}", e))).await?;
            return Ok(());
        }
    };

    let is_stop = matches!(cmd, IpcCommand::Stop);
    let (resp_tx, resp_rx) = oneshot::channel();

    if event_tx
        .send(DaemonEvent::Ipc {
            cmd,
            responder: resp_tx,
        })
        .await
        .is_err()
    {
        write_response(&mut writer, &IpcResponse::error("Daemon is shutting down")).await?;
        return Ok(());
    }

    let response = resp_rx
        .await
        .unwrap_or_else(|_| IpcResponse::error("Failed to get response from daemon"));
    write_response(&mut writer, &response).await?;

    if is_stop {
        let _ = event_tx.send(DaemonEvent::Shutdown).await;
    }

    Ok(())
}

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &IpcResponse) -> Result<()> {
    let json = match serde_json::to_string(response) {
        Ok(json) => json + "\n",
        Err(e) => {
            warn!("Failed to serialize IPC response: {}", e);
            "{\"status\":\"error\",\"message\":\"Internal serialization error\"}\n".to_string()
        }
    };
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
