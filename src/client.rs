//! Command facade over an authenticated connection

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::{
    command::{EslCommand, EventFormat},
    connection::{shutdown_socket, EslConnectOptions, EslConnection},
    constants::{HEADER_CONTENT_DISPOSITION, SOCKET_BUF_SIZE},
    error::{EslError, EslResult},
    headers::EslHeaders,
    protocol::{ContentType, EslMessage, EslParser},
};

/// Connection status for ESL client
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionStatus {
    /// ESL session is active.
    Connected,
    /// ESL session ended.
    Disconnected(DisconnectReason),
}

/// Reason for disconnection
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DisconnectReason {
    /// Server sent a text/disconnect-notice with Content-Disposition: disconnect
    ServerNotice,
    /// TCP I/O or framing error (io::Error is not Clone, so we store the message)
    IoError(String),
    /// Clean EOF on the TCP connection
    ConnectionClosed,
    /// Client called close()
    ClientRequested,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::ServerNotice => write!(f, "server sent disconnect notice"),
            DisconnectReason::IoError(msg) => write!(f, "I/O error: {}", msg),
            DisconnectReason::ConnectionClosed => write!(f, "connection closed"),
            DisconnectReason::ClientRequested => write!(f, "client requested disconnect"),
        }
    }
}

/// Reply slot for the in-flight command.
#[derive(Default)]
struct PendingReply {
    tx: Option<oneshot::Sender<EslMessage>>,
    /// Replies still owed to commands that timed out; discarded on arrival.
    orphaned: usize,
}

/// Shared state between EslClient and the reader task
struct SharedState {
    pending_reply: Mutex<PendingReply>,
    /// Command response timeout in milliseconds
    command_timeout_ms: AtomicU64,
    /// Set by close() so the reader reports a requested disconnect
    closing: AtomicBool,
}

impl SharedState {
    fn new(command_timeout: Duration) -> Self {
        Self {
            pending_reply: Mutex::new(PendingReply::default()),
            command_timeout_ms: AtomicU64::new(command_timeout.as_millis() as u64),
            closing: AtomicBool::new(false),
        }
    }
}

/// ESL client handle (Clone + Send)
///
/// Commands are serialized through the writer mutex. The reader task
/// routes replies to the pending oneshot channel. Event frames that arrive
/// between replies are logged and dropped.
#[derive(Clone)]
pub struct EslClient {
    host: Arc<str>,
    writer: Arc<Mutex<BufWriter<OwnedWriteHalf>>>,
    shared: Arc<SharedState>,
    status_rx: watch::Receiver<ConnectionStatus>,
}

impl std::fmt::Debug for EslClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EslClient")
            .field("host", &self.host)
            .field("connected", &self.is_connected())
            .finish()
    }
}

async fn reader_loop(
    reader: BufReader<OwnedReadHalf>,
    parser: EslParser,
    shared: Arc<SharedState>,
    status_tx: watch::Sender<ConnectionStatus>,
) {
    let result = std::panic::AssertUnwindSafe(reader_loop_inner(
        reader,
        parser,
        shared.clone(),
        status_tx.clone(),
    ));
    if futures_util::FutureExt::catch_unwind(result)
        .await
        .is_err()
    {
        tracing::error!("reader task panicked");
        report_disconnect(
            &shared,
            &status_tx,
            DisconnectReason::IoError("reader task panicked".to_string()),
        )
        .await;
    }
}

/// Publish the final status and fail any command still waiting for a reply.
async fn report_disconnect(
    shared: &SharedState,
    status_tx: &watch::Sender<ConnectionStatus>,
    reason: DisconnectReason,
) {
    shared
        .pending_reply
        .lock()
        .await
        .tx
        .take();
    let _ = status_tx.send(ConnectionStatus::Disconnected(reason));
}

/// Route one frame. Returns the disconnect reason when the reader must stop.
async fn route_message(shared: &SharedState, message: EslMessage) -> Option<DisconnectReason> {
    match message.content_type() {
        ContentType::CommandReply | ContentType::ApiResponse | ContentType::RudeRejection => {
            let mut pending = shared
                .pending_reply
                .lock()
                .await;
            if pending.orphaned > 0 {
                pending.orphaned -= 1;
                debug!(
                    "[RECV] Discarding late {} for a timed-out command",
                    message.content_type()
                );
            } else if let Some(tx) = pending
                .tx
                .take()
            {
                let _ = tx.send(message);
            } else {
                warn!(
                    "[RECV] Received {} but no command is pending",
                    message.content_type()
                );
            }
        }
        ContentType::DisconnectNotice => {
            if message.header(HEADER_CONTENT_DISPOSITION).as_deref() == Some("linger") {
                debug!("[RECV] Disconnect notice with linger disposition, ignoring");
            } else {
                info!("[RECV] Received disconnect notice from server");
                return Some(DisconnectReason::ServerNotice);
            }
        }
        ContentType::EventPlain
        | ContentType::EventJson
        | ContentType::EventXml
        | ContentType::LogData => {
            debug!("[RECV] Dropping unsolicited {} frame", message.content_type());
        }
        ContentType::AuthRequest | ContentType::TextPlain | ContentType::Unknown(_) => {
            debug!("[RECV] Ignoring unexpected {:?} frame", message.content_type());
        }
    }
    None
}

async fn reader_loop_inner(
    mut reader: BufReader<OwnedReadHalf>,
    mut parser: EslParser,
    shared: Arc<SharedState>,
    status_tx: watch::Sender<ConnectionStatus>,
) {
    let mut read_buffer = vec![0u8; SOCKET_BUF_SIZE];

    loop {
        // Drain everything already buffered before touching the socket
        match parser.parse_message() {
            Ok(Some(message)) => {
                if let Some(reason) = route_message(&shared, message).await {
                    report_disconnect(&shared, &status_tx, reason).await;
                    return;
                }
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("[RECV] Parser error: {}", e);
                report_disconnect(&shared, &status_tx, DisconnectReason::IoError(e.to_string()))
                    .await;
                return;
            }
        }

        match reader
            .read(&mut read_buffer)
            .await
        {
            Ok(0) => {
                if let Ok(Some(message)) = parser.finish() {
                    let _ = route_message(&shared, message).await;
                }
                let reason = if shared
                    .closing
                    .load(Ordering::Acquire)
                {
                    DisconnectReason::ClientRequested
                } else {
                    info!("[RECV] Connection closed (EOF)");
                    DisconnectReason::ConnectionClosed
                };
                report_disconnect(&shared, &status_tx, reason).await;
                return;
            }
            Ok(n) => {
                trace!("[RECV] Read {} bytes", n);
                if let Err(e) = parser.add_data(&read_buffer[..n]) {
                    warn!("[RECV] Buffer error: {}", e);
                    report_disconnect(
                        &shared,
                        &status_tx,
                        DisconnectReason::IoError(e.to_string()),
                    )
                    .await;
                    return;
                }
            }
            Err(e) => {
                let reason = if shared
                    .closing
                    .load(Ordering::Acquire)
                {
                    DisconnectReason::ClientRequested
                } else {
                    warn!("[RECV] Read error: {}", e);
                    DisconnectReason::IoError(e.to_string())
                };
                report_disconnect(&shared, &status_tx, reason).await;
                return;
            }
        }
    }
}

impl EslConnection {
    /// Hand the socket to a background reader and return a shareable client.
    ///
    /// Requires a successful [`login`](Self::login); otherwise
    /// [`EslError::NotConnected`].
    pub fn into_client(self) -> EslResult<EslClient> {
        if !self.authenticated() {
            return Err(EslError::NotConnected);
        }
        let host: Arc<str> = Arc::from(self.host());
        let (reader, writer, parser, options) = self.into_parts();

        let shared = Arc::new(SharedState::new(options.command_timeout));
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connected);

        tokio::spawn(reader_loop(reader, parser, shared.clone(), status_tx));

        Ok(EslClient {
            host,
            writer: Arc::new(Mutex::new(writer)),
            shared,
            status_rx,
        })
    }
}

impl EslClient {
    /// Dial, log in, and start the reader task.
    ///
    /// ```rust,no_run
    /// # async fn example() -> Result<(), esl_socket::EslError> {
    /// use std::time::Duration;
    ///
    /// let client = esl_socket::EslClient::connect("localhost", "ClueCon", 3, Duration::from_secs(10)).await?;
    /// let reply = client.api("status", "").await?;
    /// println!("{}", reply.body_str().unwrap_or_default());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(
        host: &str,
        password: &str,
        max_retries: u32,
        timeout: Duration,
    ) -> EslResult<Self> {
        EslConnection::connect(host, password, max_retries, timeout)
            .await?
            .into_client()
    }

    /// [`connect`](Self::connect) with the full option set.
    pub async fn connect_with_options(
        host: &str,
        password: &str,
        options: EslConnectOptions,
    ) -> EslResult<Self> {
        EslConnection::connect_with_options(host, password, options)
            .await?
            .into_client()
    }

    /// `host:port` this client is connected to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Send a command and wait for the reply.
    ///
    /// The writer lock is held through the entire send-and-receive cycle to
    /// prevent concurrent commands from overwriting the pending reply slot
    /// (ESL is a sequential request/response protocol).
    pub async fn send_command(&self, command: EslCommand) -> EslResult<EslMessage> {
        if !self.is_connected() {
            return Err(EslError::NotConnected);
        }

        let wire = command.to_wire_format()?;
        debug!("[SEND] {}", command.log_line());

        // Lock writer: serializes concurrent commands and holds through reply.
        let mut writer = self
            .writer
            .lock()
            .await;

        let (tx, rx) = oneshot::channel();
        self.shared
            .pending_reply
            .lock()
            .await
            .tx = Some(tx);
        // The reader may have exited before the slot was armed
        if !self.is_connected() {
            self.shared
                .pending_reply
                .lock()
                .await
                .tx
                .take();
            return Err(EslError::NotConnected);
        }

        writer
            .write_all(wire.as_bytes())
            .await?;
        writer
            .flush()
            .await?;

        let timeout_ms = self
            .shared
            .command_timeout_ms
            .load(Ordering::Relaxed);
        let message = match timeout(Duration::from_millis(timeout_ms), rx).await {
            Ok(Ok(message)) => message,
            Ok(Err(_)) => return Err(EslError::ConnectionClosed),
            Err(_) => {
                // The server still answers in order, so its late reply must
                // not be handed to the next command.
                let mut pending = self
                    .shared
                    .pending_reply
                    .lock()
                    .await;
                if pending
                    .tx
                    .take()
                    .is_some()
                {
                    pending.orphaned += 1;
                }
                warn!("[SEND] {} timed out after {}ms", command.log_line(), timeout_ms);
                return Err(EslError::Timeout { timeout_ms });
            }
        };
        drop(writer);

        debug!("[RECV] Reply: error={}", message.has_error());
        Ok(message)
    }

    /// Send a free-form single-line command and wait for its reply.
    ///
    /// Fails with [`EslError::MalformedCommand`] if `cmd` contains the line
    /// terminator anywhere.
    pub async fn send_recv(&self, cmd: &str) -> EslResult<EslMessage> {
        self.send_command(EslCommand::Raw {
            line: cmd.to_string(),
        })
        .await
    }

    /// Execute API command. Blocks until FreeSWITCH completes the command.
    ///
    /// `args` may be empty. The reply is an `api/response` frame whose body
    /// holds the command output; check [`EslMessage::has_error`] for `-ERR`.
    ///
    /// ```rust,no_run
    /// # async fn example(client: &esl_socket::EslClient) -> Result<(), esl_socket::EslError> {
    /// let reply = client.api("show", "channels").await?.into_result()?;
    /// println!("{}", reply.body_str().unwrap_or_default());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn api(&self, command: &str, args: &str) -> EslResult<EslMessage> {
        self.send_command(EslCommand::Api {
            command: command.to_string(),
            args: args.to_string(),
        })
        .await
    }

    /// Execute a command in the background.
    ///
    /// The reply only acknowledges the job; its id is available through
    /// [`EslMessage::job_uuid`].
    pub async fn bgapi(&self, command: &str, args: &str) -> EslResult<EslMessage> {
        self.send_command(EslCommand::BgApi {
            command: command.to_string(),
            args: args.to_string(),
        })
        .await
    }

    /// Install an event filter and subscribe to plain events.
    pub async fn filter(&self, header: &str, value: &str) -> EslResult<EslMessage> {
        self.filter_with_output(EventFormat::Plain, header, value)
            .await
    }

    /// Install an event filter, then subscribe to all events in `format`.
    ///
    /// If the filter is rejected its reply is returned and no subscription is
    /// sent. Otherwise the subscription reply is returned.
    pub async fn filter_with_output(
        &self,
        format: EventFormat,
        header: &str,
        value: &str,
    ) -> EslResult<EslMessage> {
        let reply = self
            .send_command(EslCommand::Filter {
                header: header.to_string(),
                value: value.to_string(),
            })
            .await?;
        if reply.has_error() {
            warn!(
                "[SEND] Filter {} {} rejected: {}",
                header,
                value,
                reply
                    .error_detail()
                    .unwrap_or_default()
            );
            return Ok(reply);
        }
        self.send_command(EslCommand::Events {
            format,
            events: "ALL".to_string(),
        })
        .await
    }

    /// Remove a filter. Without `value`, every filter on `header` is removed.
    pub async fn filter_delete(&self, header: &str, value: Option<&str>) -> EslResult<EslMessage> {
        self.send_command(EslCommand::FilterDelete {
            header: header.to_string(),
            value: value.map(str::to_string),
        })
        .await
    }

    /// Remove every filter.
    pub async fn filter_delete_all(&self) -> EslResult<EslMessage> {
        self.filter_delete("all", None)
            .await
    }

    /// Fire an event named `name` with the given headers and optional body.
    ///
    /// ```rust,no_run
    /// # async fn example(client: &esl_socket::EslClient) -> Result<(), esl_socket::EslError> {
    /// use esl_socket::EslHeaders;
    ///
    /// let headers = EslHeaders::new();
    /// headers.set("Event-Subclass", "myapp::ping");
    /// client.send_event("CUSTOM", &headers, Some("hello")).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn send_event(
        &self,
        name: &str,
        headers: &EslHeaders,
        body: Option<&str>,
    ) -> EslResult<EslMessage> {
        self.send_command(EslCommand::SendEvent {
            name: name.to_string(),
            headers: headers.clone(),
            body: body.map(str::to_string),
        })
        .await
    }

    /// Set command response timeout (default: 5 seconds).
    ///
    /// `api` blocks on the server until the command finishes, so long-running
    /// API calls may need a larger value.
    pub fn set_command_timeout(&self, duration: Duration) {
        self.shared
            .command_timeout_ms
            .store(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Whether the connection is alive (not yet disconnected).
    pub fn is_connected(&self) -> bool {
        matches!(
            *self
                .status_rx
                .borrow(),
            ConnectionStatus::Connected
        )
    }

    /// Current connection status snapshot.
    pub fn status(&self) -> ConnectionStatus {
        self.status_rx
            .borrow()
            .clone()
    }

    /// Wait until the reader task reports a disconnect and return the reason.
    pub async fn wait_disconnected(&self) -> DisconnectReason {
        let mut status_rx = self
            .status_rx
            .clone();
        loop {
            if let ConnectionStatus::Disconnected(reason) = status_rx
                .borrow_and_update()
                .clone()
            {
                return reason;
            }
            if status_rx
                .changed()
                .await
                .is_err()
            {
                return DisconnectReason::ConnectionClosed;
            }
        }
    }

    /// Flush pending writes, disable keep-alive, and shut the socket down.
    ///
    /// Only the first call does anything; the reader task then reports
    /// [`DisconnectReason::ClientRequested`].
    pub async fn close(&self) -> EslResult<()> {
        if self
            .shared
            .closing
            .swap(true, Ordering::AcqRel)
        {
            return Ok(());
        }
        info!("[CLOSE] Client requested disconnect from {}", self.host);
        let mut writer = self
            .writer
            .lock()
            .await;
        writer
            .flush()
            .await?;
        shutdown_socket(
            writer
                .get_ref()
                .as_ref(),
        )?;
        Ok(())
    }
}
