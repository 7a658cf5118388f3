//! Command formatting and validation

use crate::{
    constants::{HEADER_CONTENT_LENGTH, HEADER_TERMINATOR, LINE_TERMINATOR},
    error::{EslError, EslResult},
    headers::EslHeaders,
};
use std::fmt;

/// Error returned when parsing an invalid event format string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEventFormatError(pub String);

impl fmt::Display for ParseEventFormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event format: {}", self.0)
    }
}

impl std::error::Error for ParseEventFormatError {}

/// Wire encoding of events delivered after a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum EventFormat {
    /// `plain`, the server default
    #[default]
    Plain,
    /// `json`
    Json,
    /// `xml`
    Xml,
}

impl EventFormat {
    /// Name used on the `event` command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventFormat::Plain => "plain",
            EventFormat::Json => "json",
            EventFormat::Xml => "xml",
        }
    }
}

impl fmt::Display for EventFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventFormat {
    type Err = ParseEventFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [EventFormat::Plain, EventFormat::Json, EventFormat::Xml]
            .into_iter()
            .find(|format| s.eq_ignore_ascii_case(format.as_str()))
            .ok_or_else(|| ParseEventFormatError(s.to_string()))
    }
}

/// Reject a command line that already ends with the line terminator.
///
/// The sender appends the terminators itself; a trailing one would end the
/// command early and leave the rest to be read as a second command.
pub(crate) fn validate_command_line(cmd: &str) -> EslResult<()> {
    if cmd.ends_with(LINE_TERMINATOR) {
        return Err(EslError::malformed_command(format!(
            "command must not end with the line terminator: {:?}",
            cmd
        )));
    }
    Ok(())
}

/// Validate that a user-provided string contains no newline characters.
///
/// ESL commands are line-delimited; embedded newlines would allow injection
/// of arbitrary protocol commands.
fn validate_no_newlines(s: &str, context: &str) -> EslResult<()> {
    if s.contains('\n') || s.contains('\r') {
        return Err(EslError::malformed_command(format!(
            "{} must not contain newlines",
            context
        )));
    }
    Ok(())
}

/// Frame a single-line command: the line plus a blank line.
pub(crate) fn frame_command(cmd: &str) -> EslResult<String> {
    validate_command_line(cmd)?;
    let mut wire = String::with_capacity(cmd.len() + HEADER_TERMINATOR.len());
    wire.push_str(cmd);
    wire.push_str(HEADER_TERMINATOR);
    Ok(wire)
}

/// Builder for multi-line commands carrying headers and an optional body.
///
/// ```
/// use esl_socket::CommandBuilder;
///
/// let cmd = CommandBuilder::new("sendevent CUSTOM")
///     .header("Event-Subclass", "my::event").unwrap()
///     .body("payload data")
///     .build();
/// assert!(cmd.starts_with("sendevent CUSTOM\n"));
/// assert!(cmd.contains("Event-Subclass: my::event\n"));
/// assert!(cmd.contains("Content-Length: 12\n"));
/// assert!(cmd.ends_with("\n\npayload data"));
/// ```
#[derive(Debug)]
pub struct CommandBuilder {
    command: String,
    headers: Vec<(String, String)>,
    body: Option<String>,
}

impl CommandBuilder {
    /// Start building a command with the given command line.
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Add header to command.
    ///
    /// Returns an error if the name or value contains newline characters.
    pub fn header(mut self, name: &str, value: &str) -> EslResult<Self> {
        validate_no_newlines(name, "header name")?;
        validate_no_newlines(value, "header value")?;
        self.headers
            .push((name.to_string(), value.to_string()));
        Ok(self)
    }

    /// Add every header of `headers`, in name order.
    pub fn headers(mut self, headers: &EslHeaders) -> EslResult<Self> {
        for (name, value) in headers.to_vec() {
            self = self.header(&name, &value)?;
        }
        Ok(self)
    }

    /// Set command body.
    ///
    /// The body is length-delimited so it may contain newlines.
    pub fn body(mut self, body: &str) -> Self {
        self.body = Some(body.to_string());
        self
    }

    /// Render the command line, one `Name: value` line per header, a blank
    /// line, then the body.
    ///
    /// `Content-Length` is added for a body unless a header already declares it.
    pub fn build(self) -> String {
        let content_length = self
            .body
            .as_ref()
            .filter(|_| {
                !self
                    .headers
                    .iter()
                    .any(|(name, _)| name.eq_ignore_ascii_case(HEADER_CONTENT_LENGTH))
            })
            .map(|body| (HEADER_CONTENT_LENGTH.to_string(), body.len().to_string()));

        let mut lines = vec![self.command];
        lines.extend(
            self.headers
                .iter()
                .chain(content_length.iter())
                .map(|(name, value)| format!("{}: {}", name, value)),
        );

        let mut wire = lines.join(LINE_TERMINATOR);
        wire.push_str(HEADER_TERMINATOR);
        if let Some(body) = &self.body {
            wire.push_str(body);
        }
        wire
    }
}

/// A command the client knows how to put on the wire.
#[derive(Clone)]
pub enum EslCommand {
    /// Authenticate with password
    Auth { password: String },
    /// Execute API command
    Api { command: String, args: String },
    /// Execute background API command
    BgApi { command: String, args: String },
    /// Subscribe to events
    Events { format: EventFormat, events: String },
    /// Set event filter
    Filter { header: String, value: String },
    /// Remove event filters
    FilterDelete {
        header: String,
        value: Option<String>,
    },
    /// Fire an event into the server's event bus
    SendEvent {
        name: String,
        headers: EslHeaders,
        body: Option<String>,
    },
    /// Free-form single-line command
    Raw { line: String },
}

/// Shows the loggable command line, so secrets never reach debug output.
impl fmt::Debug for EslCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EslCommand")
            .field(&self.log_line())
            .finish()
    }
}

impl EslCommand {
    /// Join a verb and its arguments, skipping empty arguments.
    fn format_simple_command(cmd: &str, args: &[&str]) -> String {
        std::iter::once(cmd)
            .chain(
                args.iter()
                    .copied()
                    .filter(|arg| !arg.is_empty()),
            )
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Command line as it appears in logs, with secrets masked.
    pub fn log_line(&self) -> String {
        match self {
            EslCommand::Auth { .. } => "auth [REDACTED]".to_string(),
            EslCommand::SendEvent { name, .. } => format!("sendevent {}", name),
            EslCommand::Raw { line } if line.starts_with("auth ") => "auth [REDACTED]".to_string(),
            _ => self
                .command_line()
                .unwrap_or_else(|e| e.to_string()),
        }
    }

    /// Validated single command line, without terminators.
    fn command_line(&self) -> EslResult<String> {
        match self {
            EslCommand::Auth { password } => {
                validate_no_newlines(password, "password")?;
                Ok(Self::format_simple_command("auth", &[password]))
            }
            EslCommand::Api { command, args } => {
                validate_no_newlines(command, "api command")?;
                validate_no_newlines(args, "api arguments")?;
                Ok(Self::format_simple_command("api", &[command, args]))
            }
            EslCommand::BgApi { command, args } => {
                validate_no_newlines(command, "bgapi command")?;
                validate_no_newlines(args, "bgapi arguments")?;
                Ok(Self::format_simple_command("bgapi", &[command, args]))
            }
            EslCommand::Events { format, events } => {
                validate_no_newlines(events, "event list")?;
                Ok(Self::format_simple_command(
                    "event",
                    &[format.as_str(), events],
                ))
            }
            EslCommand::Filter { header, value } => {
                validate_no_newlines(header, "filter header")?;
                validate_no_newlines(value, "filter value")?;
                Ok(Self::format_simple_command("filter", &[header, value]))
            }
            EslCommand::FilterDelete { header, value } => {
                validate_no_newlines(header, "filter delete header")?;
                let value = value
                    .as_deref()
                    .unwrap_or("");
                validate_no_newlines(value, "filter delete value")?;
                Ok(Self::format_simple_command(
                    "filter",
                    &["delete", header, value],
                ))
            }
            EslCommand::SendEvent { name, .. } => {
                validate_no_newlines(name, "event name")?;
                Ok(Self::format_simple_command("sendevent", &[name]))
            }
            EslCommand::Raw { line } => {
                validate_command_line(line)?;
                validate_no_newlines(line, "command")?;
                Ok(line.clone())
            }
        }
    }

    /// Validate all user-supplied fields, then convert to wire format.
    pub fn to_wire_format(&self) -> EslResult<String> {
        match self {
            EslCommand::SendEvent { headers, body, .. } => {
                let mut builder = CommandBuilder::new(&self.command_line()?).headers(headers)?;
                if let Some(body) = body {
                    builder = builder.body(body);
                }
                Ok(builder.build())
            }
            _ => frame_command(&self.command_line()?),
        }
    }
}
