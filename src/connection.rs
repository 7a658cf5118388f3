//! Connection management for ESL

use socket2::{SockRef, TcpKeepalive};
use std::io;
use std::net::{Shutdown, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpStream};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, timeout_at, Instant};
use tracing::{debug, info, trace, warn};

use crate::{
    auth::AuthState,
    backoff::Backoff,
    command::EslCommand,
    constants::{
        DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_ESL_PORT, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_MS,
        MAX_RECV_SIZE, SOCKET_BUF_SIZE,
    },
    error::{EslError, EslResult},
    protocol::{EslMessage, EslParser},
};

/// Options for ESL connection configuration.
///
/// Use [`Default::default()`] for standard settings.
#[derive(Debug, Clone)]
pub struct EslConnectOptions {
    /// Dial retries after the first attempt. Default: 3.
    pub max_retries: u32,
    /// Overall dial deadline, TCP keep-alive interval, and bound on each
    /// handshake read. Default: 10 seconds.
    pub timeout: Duration,
    /// Time to wait for a command reply once connected. Default: 5 seconds.
    pub command_timeout: Duration,
}

impl Default for EslConnectOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
        }
    }
}

/// Append `:port` to `host` unless it already carries one.
///
/// A host with more than one colon is rejected rather than guessed at.
///
/// ```
/// use esl_socket::set_port;
///
/// assert_eq!(set_port("foo", 1).unwrap(), "foo:1");
/// assert_eq!(set_port("foo:1", 1).unwrap(), "foo:1");
/// assert!(set_port("foo:1:2", 3).is_err());
/// ```
pub fn set_port(host: &str, port: u16) -> EslResult<String> {
    let fragments: Vec<&str> = host
        .split(':')
        .collect();
    match fragments.as_slice() {
        [_] => Ok(format!("{}:{}", host, port)),
        [name, ""] => Ok(format!("{}:{}", name, port)),
        [_, _] => Ok(host.to_string()),
        _ => Err(EslError::MalformedHost {
            host: host.to_string(),
        }),
    }
}

fn enable_keepalive(stream: &TcpStream, interval: Duration) -> io::Result<()> {
    let keepalive = TcpKeepalive::new()
        .with_time(interval)
        .with_interval(interval);
    SockRef::from(stream).set_tcp_keepalive(&keepalive)
}

/// Disable keep-alive, then shut down the read and write halves.
///
/// The first failing step aborts the sequence and is returned.
pub(crate) fn shutdown_socket(stream: &TcpStream) -> io::Result<()> {
    let sock = SockRef::from(stream);
    sock.set_keepalive(false)?;
    sock.shutdown(Shutdown::Read)?;
    sock.shutdown(Shutdown::Write)?;
    Ok(())
}

/// One dial attempt, bounded by the overall deadline.
async fn tcp_connect_until(remote: SocketAddr, deadline: Instant) -> io::Result<TcpStream> {
    match timeout_at(deadline, TcpStream::connect(remote)).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            "dial deadline exceeded",
        )),
    }
}

/// A single TCP session with an Event Socket server.
///
/// Created by [`dial`](Self::dial), authenticated with
/// [`login`](Self::login), and either used directly through the raw
/// [`send`](Self::send) / [`receive`](Self::receive) primitives or turned into
/// an [`EslClient`](crate::EslClient) with [`into_client`](Self::into_client).
pub struct EslConnection {
    host: String,
    password: String,
    options: EslConnectOptions,
    pub(crate) auth_state: AuthState,
    reader: BufReader<OwnedReadHalf>,
    writer: Mutex<BufWriter<OwnedWriteHalf>>,
    parser: EslParser,
}

impl std::fmt::Debug for EslConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EslConnection")
            .field("host", &self.host)
            .field("password", &"[REDACTED]")
            .field("options", &self.options)
            .field("auth_state", &self.auth_state)
            .finish()
    }
}

impl EslConnection {
    /// Open a TCP connection, retrying with exponential backoff.
    ///
    /// `host` may omit the port, in which case 8021 is used. Up to
    /// `max_retries` retries follow the first attempt, all within `timeout`.
    pub async fn dial(
        host: &str,
        password: &str,
        max_retries: u32,
        timeout: Duration,
    ) -> EslResult<Self> {
        let options = EslConnectOptions {
            max_retries,
            timeout,
            ..EslConnectOptions::default()
        };
        Self::dial_with_options(host, password, options).await
    }

    /// [`dial`](Self::dial) with the full option set.
    pub async fn dial_with_options(
        host: &str,
        password: &str,
        options: EslConnectOptions,
    ) -> EslResult<Self> {
        let host = set_port(host, DEFAULT_ESL_PORT)?;
        let deadline = Instant::now() + options.timeout;
        info!("[CONNECT] Connecting to {}", host);

        let remote = lookup_host(host.as_str())
            .await
            .and_then(|mut addrs| {
                addrs
                    .next()
                    .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address resolved"))
            })
            .map_err(|source| {
                warn!("[CONNECT] Unable to resolve {}: {}", host, source);
                EslError::ConnectionFailed {
                    host: host.clone(),
                    attempts: 0,
                    source,
                }
            })?;

        let mut backoff = Backoff::new(options.max_retries, deadline);
        let mut attempts = 0;
        let stream = loop {
            attempts += 1;
            match tcp_connect_until(remote, deadline).await {
                Ok(stream) => break stream,
                Err(e) => match backoff.next_delay() {
                    Some(delay) => {
                        warn!(
                            "[CONNECT] Attempt {} to {} failed: {}, retrying in {}ms",
                            attempts,
                            remote,
                            e,
                            delay.as_millis()
                        );
                        sleep(delay).await;
                    }
                    None => {
                        warn!("[CONNECT] Giving up on {} after {} attempt(s)", host, attempts);
                        return Err(EslError::ConnectionFailed {
                            host,
                            attempts,
                            source: e,
                        });
                    }
                },
            }
        };
        debug!("[CONNECT] TCP connection established to {}", remote);

        enable_keepalive(&stream, options.timeout)?;

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            host,
            password: password.to_string(),
            options,
            auth_state: AuthState::Unauthenticated,
            reader: BufReader::with_capacity(SOCKET_BUF_SIZE, read_half),
            writer: Mutex::new(BufWriter::new(write_half)),
            parser: EslParser::new(),
        })
    }

    /// Dial and log in.
    ///
    /// The socket is closed before returning an error, including the case
    /// where the server neither accepted nor rejected the password
    /// ([`EslError::LoginIncomplete`]).
    pub async fn connect(
        host: &str,
        password: &str,
        max_retries: u32,
        timeout: Duration,
    ) -> EslResult<Self> {
        let options = EslConnectOptions {
            max_retries,
            timeout,
            ..EslConnectOptions::default()
        };
        Self::connect_with_options(host, password, options).await
    }

    /// [`connect`](Self::connect) with the full option set.
    pub async fn connect_with_options(
        host: &str,
        password: &str,
        options: EslConnectOptions,
    ) -> EslResult<Self> {
        let mut conn = Self::dial_with_options(host, password, options).await?;
        let outcome = conn.login().await;
        match outcome {
            Ok(true) => Ok(conn),
            Ok(false) => {
                let reply_text = conn
                    .auth_state
                    .reason()
                    .unwrap_or_default()
                    .to_string();
                conn.close_quietly().await;
                Err(EslError::LoginIncomplete { reply_text })
            }
            Err(e) => {
                conn.close_quietly().await;
                Err(e)
            }
        }
    }

    /// Normalized `host:port` this connection was dialed with.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Options the connection was dialed with.
    pub fn options(&self) -> &EslConnectOptions {
        &self.options
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }

    /// Send a single-line command followed by a blank line.
    ///
    /// Fails with [`EslError::MalformedCommand`] if `cmd` ends with or contains
    /// the line terminator. Concurrent sends on the same connection never
    /// interleave.
    pub async fn send(&self, cmd: &str) -> EslResult<()> {
        self.send_command(&EslCommand::Raw {
            line: cmd.to_string(),
        })
        .await
    }

    pub(crate) async fn send_command(&self, command: &EslCommand) -> EslResult<()> {
        let wire = command.to_wire_format()?;
        debug!("[SEND] {}", command.log_line());
        self.write_wire(&wire)
            .await
    }

    async fn write_wire(&self, wire: &str) -> EslResult<()> {
        let mut writer = self
            .writer
            .lock()
            .await;
        writer
            .write_all(wire.as_bytes())
            .await?;
        writer
            .flush()
            .await?;
        trace!("[SEND] Wrote {} bytes", wire.len());
        Ok(())
    }

    /// One buffered read of at most `max_bytes`.
    ///
    /// Returns the byte count and the buffer, which may be longer than the
    /// count. A count of 0 means the peer closed the stream. Bytes already
    /// consumed by [`read_message`](Self::read_message) are not returned again.
    pub async fn receive(&mut self, max_bytes: usize) -> EslResult<(usize, Vec<u8>)> {
        let mut buf = vec![0u8; max_bytes];
        let n = self
            .reader
            .read(&mut buf)
            .await?;
        trace!("[RECV] Read {} bytes from socket", n);
        Ok((n, buf))
    }

    /// Send `cmd` and return the bytes of one read, up to a fixed ceiling.
    ///
    /// A single read may hold less than a whole frame; use
    /// [`read_message`](Self::read_message) when the full frame is needed.
    pub async fn send_recv(&mut self, cmd: &str) -> EslResult<Vec<u8>> {
        self.send(cmd)
            .await?;
        let (n, mut buf) = self
            .receive(MAX_RECV_SIZE)
            .await?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Read until one complete frame has arrived.
    ///
    /// Bounded by the connection timeout. If the peer closes mid-frame the
    /// partial frame is returned; if nothing was buffered,
    /// [`EslError::ConnectionClosed`].
    pub async fn read_message(&mut self) -> EslResult<EslMessage> {
        let limit = self
            .options
            .timeout;
        match timeout(limit, self.read_message_inner()).await {
            Ok(result) => result,
            Err(_) => Err(EslError::Timeout {
                timeout_ms: limit.as_millis() as u64,
            }),
        }
    }

    async fn read_message_inner(&mut self) -> EslResult<EslMessage> {
        loop {
            if let Some(message) = self
                .parser
                .parse_message()?
            {
                trace!("[RECV] Parsed {} frame", message.content_type());
                return Ok(message);
            }

            let (n, buf) = self
                .receive(SOCKET_BUF_SIZE)
                .await?;
            if n == 0 {
                return match self
                    .parser
                    .finish()?
                {
                    Some(message) => Ok(message),
                    None => Err(EslError::ConnectionClosed),
                };
            }
            self.parser
                .add_data(&buf[..n])?;
        }
    }

    /// Flush pending writes, disable keep-alive, and shut the socket down.
    ///
    /// The first failing step is returned; the socket is released either way.
    pub async fn close(self) -> EslResult<()> {
        info!("[CLOSE] Closing connection to {}", self.host);
        let mut writer = self
            .writer
            .into_inner();
        writer
            .flush()
            .await?;

        let stream = self
            .reader
            .into_inner()
            .reunite(writer.into_inner())
            .map_err(|_| EslError::protocol_error("socket halves do not belong together"))?;
        shutdown_socket(&stream)?;
        Ok(())
    }

    async fn close_quietly(self) {
        if let Err(e) = self
            .close()
            .await
        {
            debug!("[CLOSE] Error while closing: {}", e);
        }
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        BufReader<OwnedReadHalf>,
        BufWriter<OwnedWriteHalf>,
        EslParser,
        EslConnectOptions,
    ) {
        (
            self.reader,
            self.writer
                .into_inner(),
            self.parser,
            self.options,
        )
    }
}
