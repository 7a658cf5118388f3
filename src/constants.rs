//! Protocol constants and configuration values

/// Default FreeSWITCH ESL port for inbound connections
pub const DEFAULT_ESL_PORT: u16 = 8021;

/// Socket buffer size for a single read from the TCP stream (64KB)
pub const SOCKET_BUF_SIZE: usize = 65536;

/// Ceiling for a one-shot command/reply read. Bounds memory, not the protocol.
pub const MAX_RECV_SIZE: usize = 1024 * 1024;

/// Maximum single message size (8MB) - validates Content-Length header
/// No legitimate ESL message should exceed this (largest is sofia status ~1-2MB)
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

/// Maximum total buffer size (16MB) - safety limit to prevent runaway memory
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Protocol message terminators
pub const HEADER_TERMINATOR: &str = "\n\n";
pub const LINE_TERMINATOR: &str = "\n";

/// Content-Type header values
pub const CONTENT_TYPE_AUTH_REQUEST: &str = "auth/request";
pub const CONTENT_TYPE_COMMAND_REPLY: &str = "command/reply";
pub const CONTENT_TYPE_API_RESPONSE: &str = "api/response";
pub const CONTENT_TYPE_DISCONNECT_NOTICE: &str = "text/disconnect-notice";
pub const CONTENT_TYPE_RUDE_REJECTION: &str = "text/rude-rejection";
pub const CONTENT_TYPE_TEXT_EVENT_PLAIN: &str = "text/event-plain";
pub const CONTENT_TYPE_TEXT_EVENT_JSON: &str = "text/event-json";
pub const CONTENT_TYPE_TEXT_EVENT_XML: &str = "text/event-xml";
pub const CONTENT_TYPE_TEXT_PLAIN: &str = "text/plain";
pub const CONTENT_TYPE_LOG_DATA: &str = "log/data";

/// Protocol framing header: payload classification.
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
/// Protocol framing header: body length.
pub const HEADER_CONTENT_LENGTH: &str = "Content-Length";
/// Protocol framing header: command reply status.
pub const HEADER_REPLY_TEXT: &str = "Reply-Text";
/// Disconnect notice disposition (`linger` or `disconnect`).
pub const HEADER_CONTENT_DISPOSITION: &str = "Content-Disposition";
/// Correlation id returned by `bgapi`.
pub const HEADER_JOB_UUID: &str = "Job-UUID";

/// Reply-Text of a successful login
pub const AUTH_ACCEPTED: &str = "+OK accepted";

/// Prefix the server puts on failed replies
pub const ERR_PREFIX: &str = "-ERR";

/// Dial deadline, keep-alive interval and handshake read bound (10 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Default number of dial retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default command response timeout (5 seconds)
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 5000;
