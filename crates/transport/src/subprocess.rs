//! Subprocess transport: spawn an MCP server child and speak
//! newline-delimited JSON-RPC over its stdio pipes.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use gangway_core::SubprocessConfig;
use gangway_protocol::Message;

use crate::{Transport, TransportError};

/// How long to watch a freshly spawned child for an early exit, and how
/// often to probe it.
const STARTUP_PROBE_WINDOW: Duration = Duration::from_millis(250);
const STARTUP_PROBE_INTERVAL: Duration = Duration::from_millis(25);

struct ProcessIo {
    child: Child,
    reader: BufReader<ChildStdout>,
    writer: ChildStdin,
    /// Set the moment any wait call reports the child exited. Once true,
    /// no signal is ever sent for this child again: the OS may have
    /// recycled its PID for an unrelated process.
    reaped: bool,
}

/// Client-side transport over a spawned server process.
///
/// One `Mutex` guards both pipe halves, so send/receive on one instance
/// are mutually exclusive — the wire protocol is line-oriented and
/// unmultiplexed.
pub struct SubprocessTransport {
    config: SubprocessConfig,
    io: Mutex<Option<ProcessIo>>,
    connected: AtomicBool,
}

impl SubprocessTransport {
    pub fn new(config: SubprocessConfig) -> Self {
        Self {
            config,
            io: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    async fn spawn_child(&self) -> Result<ProcessIo, TransportError> {
        let mut command = Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(cwd) = &self.config.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &self.config.env {
            command.env(key, value);
        }

        let mut child = command
            .spawn()
            .map_err(|e| TransportError::ConnectFailed(format!("spawn {}: {e}", self.config.command)))?;

        let writer = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::ConnectFailed("failed to capture child stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::ConnectFailed("failed to capture child stdout".to_string()))?;

        // Watch for an early exit instead of sleeping a fixed duration: a
        // child that dies within the window is reported immediately.
        let mut elapsed = Duration::ZERO;
        while elapsed < STARTUP_PROBE_WINDOW {
            match child.try_wait() {
                Ok(Some(status)) => {
                    // try_wait reaped the child; nothing to kill.
                    return Err(TransportError::ConnectFailed(format!(
                        "{} exited during startup: {status}",
                        self.config.command
                    )));
                }
                Ok(None) => {}
                Err(e) => {
                    return Err(TransportError::ConnectFailed(format!(
                        "failed to poll child: {e}"
                    )));
                }
            }
            tokio::time::sleep(STARTUP_PROBE_INTERVAL).await;
            elapsed += STARTUP_PROBE_INTERVAL;
        }

        Ok(ProcessIo {
            child,
            reader: BufReader::new(stdout),
            writer,
            reaped: false,
        })
    }

    async fn write_line(io: &mut ProcessIo, message: &Message) -> Result<(), TransportError> {
        let json = message.to_json()?;
        io.writer.write_all(json.as_bytes()).await?;
        io.writer.write_all(b"\n").await?;
        io.writer.flush().await?;
        Ok(())
    }

    /// Read one complete line. `read_line` keeps accumulating across
    /// partial writes until the terminator arrives; the timeout bounds the
    /// whole wait.
    async fn read_message(
        io: &mut ProcessIo,
        timeout: Duration,
    ) -> Result<Message, TransportError> {
        let read = async {
            loop {
                let mut line = String::new();
                let bytes_read = io.reader.read_line(&mut line).await?;
                if bytes_read == 0 {
                    return Err(TransportError::Closed);
                }
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                return Ok(Message::parse(trimmed)?);
            }
        };
        tokio::time::timeout(timeout, read)
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
    }

    fn locked_io<'a>(
        &self,
        guard: &'a mut Option<ProcessIo>,
    ) -> Result<&'a mut ProcessIo, TransportError> {
        guard.as_mut().ok_or(TransportError::NotConnected)
    }
}

#[async_trait]
impl Transport for SubprocessTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let mut guard = self.io.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        let io = self.spawn_child().await?;
        tracing::info!(command = %self.config.command, "MCP server process started");
        *guard = Some(io);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let mut guard = self.io.lock().await;
        self.connected.store(false, Ordering::SeqCst);
        let Some(io) = guard.take() else {
            return Ok(());
        };
        let ProcessIo {
            mut child,
            reader,
            writer,
            reaped,
        } = io;
        // Closing stdin first lets a well-behaved server exit on EOF.
        drop(writer);
        drop(reader);
        if !reaped {
            // The child has not been reaped, so the PID is still ours to
            // signal.
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        tracing::info!(command = %self.config.command, "MCP server process stopped");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, message: &Message) -> Result<(), TransportError> {
        let mut guard = self.io.lock().await;
        let io = self.locked_io(&mut guard)?;
        Self::write_line(io, message).await
    }

    async fn receive(&self) -> Result<Message, TransportError> {
        let timeout = self.config.timeout();
        let mut guard = self.io.lock().await;
        let io = self.locked_io(&mut guard)?;
        let result = Self::read_message(io, timeout).await;
        if matches!(result, Err(TransportError::Closed)) {
            // EOF: the child is gone. Record the reap so the kill path
            // never signals a recycled PID.
            if let Ok(Some(_)) = io.child.try_wait() {
                io.reaped = true;
            }
            self.connected.store(false, Ordering::SeqCst);
        }
        result
    }

    async fn send_and_receive(&self, message: &Message) -> Result<Message, TransportError> {
        let timeout = self.config.timeout();
        // One guard across the whole exchange: no interleaving on the pipe.
        let mut guard = self.io.lock().await;
        let io = self.locked_io(&mut guard)?;
        Self::write_line(io, message).await?;
        let result = Self::read_message(io, timeout).await;
        if matches!(result, Err(TransportError::Closed)) {
            if let Ok(Some(_)) = io.child.try_wait() {
                io.reaped = true;
            }
            self.connected.store(false, Ordering::SeqCst);
        }
        result
    }

    fn connection_info(&self) -> String {
        format!("stdio://{}", self.config.command)
    }
}
