//! Async client for the FreeSWITCH Event Socket (ESL) protocol
//!
//! Dial a server, answer its password challenge, and exchange
//! newline-delimited command frames over a single TCP connection.
//!
//! # Architecture
//!
//! Two layers, sharing the same framing code:
//! - [`EslConnection`]: one socket with raw [`send`](EslConnection::send) /
//!   [`receive`](EslConnection::receive) primitives and the
//!   [`login`](EslConnection::login) handshake.
//! - [`EslClient`] (Clone + Send): a background reader task owns the read
//!   half and hands each reply to the command waiting for it; commands from
//!   any task are serialized behind the writer lock.
//!
//! # Examples
//!
//! ## Commands
//!
//! ```rust,no_run
//! use esl_socket::{EslClient, EslError};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), EslError> {
//!     let client = EslClient::connect("localhost", "ClueCon", 3, Duration::from_secs(10)).await?;
//!
//!     let reply = client.api("status", "").await?;
//!     println!("Status: {}", reply.body_str().unwrap_or_default());
//!
//!     let job = client.bgapi("originate", "user/1000 &park").await?;
//!     println!("Job: {}", job.job_uuid().unwrap_or_default());
//!
//!     client.close().await
//! }
//! ```
//!
//! ## Raw connection
//!
//! ```rust,no_run
//! use esl_socket::{EslConnection, EslError};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), EslError> {
//!     let mut conn = EslConnection::dial("10.0.0.5", "ClueCon", 3, Duration::from_secs(10)).await?;
//!     if !conn.login().await? {
//!         return conn.close().await;
//!     }
//!
//!     conn.send("api uptime").await?;
//!     let reply = conn.read_message().await?;
//!     println!("{}", reply);
//!
//!     conn.close().await
//! }
//! ```
//!
//! ## Parsing captured frames
//!
//! ```rust
//! use esl_socket::{ContentType, EslMessage};
//!
//! let message = EslMessage::parse(b"Content-Type: command/reply\nReply-Text: +OK\n\n").unwrap();
//! assert_eq!(message.content_type(), &ContentType::CommandReply);
//! assert!(!message.has_error());
//! ```

pub mod auth;
pub mod backoff;
pub mod client;
pub mod command;
pub mod connection;
pub mod constants;
pub mod error;
pub mod headers;
pub mod protocol;

pub use auth::AuthState;
pub use backoff::Backoff;
pub use client::{ConnectionStatus, DisconnectReason, EslClient};
pub use command::{CommandBuilder, EslCommand, EventFormat, ParseEventFormatError};
pub use connection::{set_port, EslConnectOptions, EslConnection};
pub use constants::DEFAULT_ESL_PORT;
pub use error::{EslError, EslResult};
pub use headers::{EslHeaders, HeaderValue};
pub use protocol::{ContentType, EslMessage, EslParser};
