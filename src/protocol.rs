//! ESL protocol parsing and message handling

use crate::{
    constants::{
        CONTENT_TYPE_API_RESPONSE, CONTENT_TYPE_AUTH_REQUEST, CONTENT_TYPE_COMMAND_REPLY,
        CONTENT_TYPE_DISCONNECT_NOTICE, CONTENT_TYPE_LOG_DATA, CONTENT_TYPE_RUDE_REJECTION,
        CONTENT_TYPE_TEXT_EVENT_JSON, CONTENT_TYPE_TEXT_EVENT_PLAIN, CONTENT_TYPE_TEXT_EVENT_XML,
        CONTENT_TYPE_TEXT_PLAIN, ERR_PREFIX, HEADER_CONTENT_LENGTH, HEADER_CONTENT_TYPE,
        HEADER_JOB_UUID, HEADER_REPLY_TEXT, MAX_BUFFER_SIZE, MAX_MESSAGE_SIZE,
    },
    error::{EslError, EslResult},
    headers::EslHeaders,
};
use percent_encoding::percent_decode_str;
use std::fmt;

/// Classification of a frame, from its `Content-Type` header.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// Authentication challenge sent by the server on connect
    AuthRequest,
    /// Reply to a plain command
    CommandReply,
    /// Reply to `api`
    ApiResponse,
    /// Server is about to close the socket
    DisconnectNotice,
    /// Connection refused by ACL
    RudeRejection,
    /// Event, plain encoding
    EventPlain,
    /// Event, JSON encoding
    EventJson,
    /// Event, XML encoding
    EventXml,
    /// Plain text payload
    TextPlain,
    /// Forwarded log line
    LogData,
    /// Anything else, including a missing header (empty string)
    Unknown(String),
}

impl ContentType {
    /// Parse message type from Content-Type header
    pub fn from_content_type(content_type: &str) -> Self {
        match content_type {
            CONTENT_TYPE_AUTH_REQUEST => ContentType::AuthRequest,
            CONTENT_TYPE_COMMAND_REPLY => ContentType::CommandReply,
            CONTENT_TYPE_API_RESPONSE => ContentType::ApiResponse,
            CONTENT_TYPE_DISCONNECT_NOTICE => ContentType::DisconnectNotice,
            CONTENT_TYPE_RUDE_REJECTION => ContentType::RudeRejection,
            CONTENT_TYPE_TEXT_EVENT_PLAIN => ContentType::EventPlain,
            CONTENT_TYPE_TEXT_EVENT_JSON => ContentType::EventJson,
            CONTENT_TYPE_TEXT_EVENT_XML => ContentType::EventXml,
            CONTENT_TYPE_TEXT_PLAIN => ContentType::TextPlain,
            CONTENT_TYPE_LOG_DATA => ContentType::LogData,
            other => ContentType::Unknown(other.to_string()),
        }
    }

    /// Wire string of this content type.
    pub fn as_str(&self) -> &str {
        match self {
            ContentType::AuthRequest => CONTENT_TYPE_AUTH_REQUEST,
            ContentType::CommandReply => CONTENT_TYPE_COMMAND_REPLY,
            ContentType::ApiResponse => CONTENT_TYPE_API_RESPONSE,
            ContentType::DisconnectNotice => CONTENT_TYPE_DISCONNECT_NOTICE,
            ContentType::RudeRejection => CONTENT_TYPE_RUDE_REJECTION,
            ContentType::EventPlain => CONTENT_TYPE_TEXT_EVENT_PLAIN,
            ContentType::EventJson => CONTENT_TYPE_TEXT_EVENT_JSON,
            ContentType::EventXml => CONTENT_TYPE_TEXT_EVENT_XML,
            ContentType::TextPlain => CONTENT_TYPE_TEXT_PLAIN,
            ContentType::LogData => CONTENT_TYPE_LOG_DATA,
            ContentType::Unknown(s) => s.as_str(),
        }
    }

    /// `true` for the three event encodings.
    pub fn is_event(&self) -> bool {
        matches!(
            self,
            ContentType::EventPlain | ContentType::EventJson | ContentType::EventXml
        )
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One frame received from the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct EslMessage {
    content_type: ContentType,
    headers: EslHeaders,
    body: Option<Vec<u8>>,
    parsed: bool,
}

impl EslMessage {
    fn new(headers: EslHeaders, body: Option<Vec<u8>>) -> Self {
        let content_type = ContentType::from_content_type(&headers.get_string(HEADER_CONTENT_TYPE));
        Self {
            content_type,
            headers,
            body,
            parsed: true,
        }
    }

    /// Parse one frame from a complete buffer.
    ///
    /// The end of `buf` is treated as end of input: an unterminated header
    /// block or a short body yields whatever was received.
    pub fn parse(buf: &[u8]) -> EslResult<Self> {
        match parse_frame(buf, true)? {
            Some((message, _)) => Ok(message),
            None => Ok(Self::new(EslHeaders::new(), None)),
        }
    }

    /// Frame classification.
    pub fn content_type(&self) -> &ContentType {
        &self.content_type
    }

    /// Frame headers.
    pub fn headers(&self) -> &EslHeaders {
        &self.headers
    }

    /// Look up a header as text.
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .map(|v| v.to_text())
    }

    /// Raw body bytes, present only when `Content-Length` was sent.
    pub fn body(&self) -> Option<&[u8]> {
        self.body
            .as_deref()
    }

    /// Body as text, lossily decoded.
    pub fn body_str(&self) -> Option<String> {
        self.body
            .as_deref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Whether parsing ran to completion.
    pub fn is_parsed(&self) -> bool {
        self.parsed
    }

    /// `Reply-Text` header (e.g. `+OK accepted`, `-ERR invalid command`).
    pub fn reply_text(&self) -> Option<String> {
        self.header(HEADER_REPLY_TEXT)
    }

    /// Declared `Content-Length`, if any.
    pub fn content_length(&self) -> Option<usize> {
        self.headers
            .get(HEADER_CONTENT_LENGTH)
            .and_then(|v| usize::try_from(v.to_int()).ok())
    }

    /// Correlation id of a `bgapi` reply.
    ///
    /// Read from the `Job-UUID` header, falling back to the
    /// `+OK Job-UUID: <id>` form of `Reply-Text`.
    pub fn job_uuid(&self) -> Option<String> {
        if let Some(uuid) = self.header(HEADER_JOB_UUID) {
            return Some(uuid);
        }
        self.reply_text()?
            .strip_prefix("+OK Job-UUID:")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// `true` if the body starts with `-ERR`, or, with no body, `Reply-Text` does.
    pub fn has_error(&self) -> bool {
        match &self.body {
            Some(body) => body.starts_with(ERR_PREFIX.as_bytes()),
            None => self
                .headers
                .get_string(HEADER_REPLY_TEXT)
                .starts_with(ERR_PREFIX),
        }
    }

    /// Error text after the `-ERR ` prefix, or `None` if the reply succeeded.
    pub fn error_detail(&self) -> Option<String> {
        if !self.has_error() {
            return None;
        }
        let source = match &self.body {
            Some(body) => String::from_utf8_lossy(body).into_owned(),
            None => self
                .headers
                .get_string(HEADER_REPLY_TEXT),
        };
        let detail = source
            .strip_prefix(ERR_PREFIX)
            .unwrap_or(&source);
        let detail = detail
            .strip_prefix(' ')
            .unwrap_or(detail);
        Some(
            detail
                .trim_end_matches(['\r', '\n'])
                .to_string(),
        )
    }

    /// `Err(CommandFailed)` if the reply carries `-ERR`, the message otherwise.
    pub fn into_result(self) -> EslResult<Self> {
        match self.error_detail() {
            Some(reply_text) => Err(EslError::CommandFailed { reply_text }),
            None => Ok(self),
        }
    }
}

impl fmt::Display for EslMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Headers: {}", self.headers)?;
        if let Some(body) = &self.body {
            write!(f, " ; Body: {}", String::from_utf8_lossy(body))?;
        }
        Ok(())
    }
}

/// Split the next line (terminator included) off `buf`.
///
/// At end of input an unterminated remainder counts as a line.
fn next_line(buf: &[u8], at_eof: bool) -> Option<&[u8]> {
    match buf
        .iter()
        .position(|b| *b == b'\n')
    {
        Some(pos) => Some(&buf[..=pos]),
        None if at_eof && !buf.is_empty() => Some(buf),
        None => None,
    }
}

fn trim_eol(line: &[u8]) -> &[u8] {
    let line = line
        .strip_suffix(b"\n")
        .unwrap_or(line);
    line.strip_suffix(b"\r")
        .unwrap_or(line)
}

fn decode_value(raw: &str) -> String {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// Parse a header block starting at `buf`.
///
/// Returns the headers, the number of bytes consumed and whether the block was
/// closed by a blank line. `None` means more data is needed.
fn parse_header_block(buf: &[u8], at_eof: bool) -> EslResult<Option<(EslHeaders, usize, bool)>> {
    let headers = EslHeaders::new();
    let mut pos = 0;
    let mut last_key: Option<String> = None;

    loop {
        let line = match next_line(&buf[pos..], at_eof) {
            Some(line) => line,
            None if at_eof => return Ok(Some((headers, pos, false))),
            None => return Ok(None),
        };
        pos += line.len();

        let content = trim_eol(line);
        if content.is_empty() {
            return Ok(Some((headers, pos, true)));
        }

        let text = std::str::from_utf8(content)
            .map_err(|_| EslError::protocol_error("Invalid UTF-8 in headers"))?;

        // Continuation line, folded into the previous value
        if text.starts_with([' ', '\t']) {
            if let Some(key) = &last_key {
                let mut value = headers.get_string(key);
                value.push(' ');
                value.push_str(&decode_value(text.trim()));
                headers.set(key.clone(), value);
                continue;
            }
        }

        let colon_pos = text
            .find(':')
            .ok_or_else(|| EslError::InvalidHeader {
                header: text.to_string(),
            })?;
        let key = text[..colon_pos].trim();
        if key.is_empty() {
            return Err(EslError::InvalidHeader {
                header: text.to_string(),
            });
        }
        let value = decode_value(text[colon_pos + 1..].trim());
        headers.append(key, value);
        last_key = Some(key.to_string());
    }
}

/// Assemble a body of `declared` bytes from newline-delimited chunks.
///
/// Lines are concatenated until the declared length is reached; one trailing
/// terminator overshooting by exactly one byte is trimmed, then the result is
/// capped at `declared`. `None` means more data is needed.
fn assemble_body(buf: &[u8], declared: usize, at_eof: bool) -> Option<Vec<u8>> {
    let mut body = Vec::with_capacity(declared.min(buf.len()));
    let mut rest = buf;

    while body.len() < declared {
        match next_line(rest, true) {
            Some(line) => {
                body.extend_from_slice(line);
                rest = &rest[line.len()..];
            }
            None => break,
        }
    }

    if body.len() == declared + 1 && body.ends_with(b"\n") {
        body.pop();
    }
    if body.len() < declared && !at_eof {
        return None;
    }
    body.truncate(declared);
    Some(body)
}

fn declared_length(headers: &EslHeaders) -> EslResult<Option<usize>> {
    let raw = match headers.get(HEADER_CONTENT_LENGTH) {
        Some(value) => value.to_text(),
        None => return Ok(None),
    };
    let length: usize = raw
        .trim()
        .parse()
        .map_err(|_| EslError::InvalidHeader {
            header: format!("{}: {}", HEADER_CONTENT_LENGTH, raw),
        })?;

    if length == 0 {
        return Err(EslError::ContentLengthZero);
    }
    if length > MAX_MESSAGE_SIZE {
        return Err(EslError::protocol_error(format!(
            "Message too large: Content-Length {} exceeds limit {}",
            length, MAX_MESSAGE_SIZE
        )));
    }
    Ok(Some(length))
}

/// Parse one frame from the front of `buf`.
///
/// Returns the message and the bytes it consumed, or `None` when the frame is
/// incomplete (never `None` with `at_eof` unless `buf` holds no frame at all).
pub(crate) fn parse_frame(buf: &[u8], at_eof: bool) -> EslResult<Option<(EslMessage, usize)>> {
    let (headers, header_len, closed) = match parse_header_block(buf, at_eof)? {
        Some(block) => block,
        None => return Ok(None),
    };

    let length = match declared_length(&headers)? {
        Some(length) if closed => length,
        _ => return Ok(Some((EslMessage::new(headers, None), header_len))),
    };

    match assemble_body(&buf[header_len..], length, at_eof) {
        Some(body) => {
            let consumed = header_len + body.len();
            Ok(Some((EslMessage::new(headers, Some(body)), consumed)))
        }
        None => Ok(None),
    }
}

/// Incremental ESL frame parser
///
/// Bytes are appended with [`add_data`](Self::add_data) as they arrive;
/// [`parse_message`](Self::parse_message) yields complete frames.
#[derive(Debug, Default)]
pub struct EslParser {
    buffer: Vec<u8>,
}

impl EslParser {
    /// Create new parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Add data to the parser buffer
    pub fn add_data(&mut self, data: &[u8]) -> EslResult<()> {
        if self.buffer.len() + data.len() > MAX_BUFFER_SIZE {
            return Err(EslError::protocol_error(format!(
                "Buffer exceeds {} bytes without a complete frame",
                MAX_BUFFER_SIZE
            )));
        }
        self.buffer
            .extend_from_slice(data);
        Ok(())
    }

    /// Bytes held but not yet consumed by a frame.
    pub fn buffered(&self) -> usize {
        self.buffer
            .len()
    }

    fn skip_blank_lines(&mut self) {
        let mut skip = 0;
        while let Some(line) = next_line(&self.buffer[skip..], false) {
            if !trim_eol(line).is_empty() {
                break;
            }
            skip += line.len();
        }
        if skip > 0 {
            self.buffer
                .drain(..skip);
        }
    }

    /// Try to parse a complete message from the buffer
    ///
    /// On error the offending frame is dropped from the buffer.
    pub fn parse_message(&mut self) -> EslResult<Option<EslMessage>> {
        self.skip_blank_lines();
        if self
            .buffer
            .is_empty()
        {
            return Ok(None);
        }
        self.take_frame(false)
    }

    /// Finalize whatever is buffered once the peer has closed the stream.
    pub fn finish(&mut self) -> EslResult<Option<EslMessage>> {
        self.skip_blank_lines();
        if self
            .buffer
            .is_empty()
        {
            return Ok(None);
        }
        self.take_frame(true)
    }

    fn take_frame(&mut self, at_eof: bool) -> EslResult<Option<EslMessage>> {
        match parse_frame(&self.buffer, at_eof) {
            Ok(Some((message, consumed))) => {
                self.buffer
                    .drain(..consumed);
                Ok(Some(message))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.buffer
                    .clear();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_auth_request() {
        let message = EslMessage::parse(b"Content-Type: auth/request\n\n").unwrap();

        assert_eq!(message.content_type(), &ContentType::AuthRequest);
        assert!(message
            .body()
            .is_none());
        assert!(message.is_parsed());
    }

    #[test]
    fn test_headers_only_without_terminator() {
        let message =
            EslMessage::parse(b"Event-Name: SOCKET_DATA\r\nContent-Type: auth/request\r\n").unwrap();

        assert!(message.is_parsed());
        assert!(message
            .body()
            .is_none());
        assert_eq!(
            message
                .headers()
                .get_string("Event-Name"),
            "SOCKET_DATA"
        );
        assert_eq!(message.content_type(), &ContentType::AuthRequest);
    }

    #[test]
    fn test_empty_input_is_valid() {
        let message = EslMessage::parse(b"").unwrap();
        assert!(message.is_parsed());
        assert!(message
            .headers()
            .is_empty());
        assert_eq!(message.content_type(), &ContentType::Unknown(String::new()));
    }

    #[test]
    fn test_content_length_zero() {
        let err = EslMessage::parse(b"Content-Length: 0\n").unwrap_err();
        assert!(matches!(err, EslError::ContentLengthZero));
    }

    #[test]
    fn test_content_length_truncates_body() {
        let message = EslMessage::parse(b"Content-Length: 1\n\nhello world").unwrap();
        assert_eq!(message.body(), Some(&b"h"[..]));
    }

    #[test]
    fn test_body_spanning_lines() {
        let body = "line one\nline two\nlast";
        let data = format!(
            "Content-Type: api/response\nContent-Length: {}\n\n{}",
            body.len(),
            body
        );
        let message = EslMessage::parse(data.as_bytes()).unwrap();
        assert_eq!(message.body_str(), Some(body.to_string()));
    }

    #[test]
    fn test_trailing_terminator_trimmed() {
        let message = EslMessage::parse(b"Content-Length: 11\n\nhello world\n").unwrap();
        assert_eq!(message.body(), Some(&b"hello world"[..]));
    }

    #[test]
    fn test_short_body_at_eof() {
        let message = EslMessage::parse(b"Content-Length: 50\n\nonly this").unwrap();
        assert_eq!(message.body_str(), Some("only this".to_string()));
    }

    #[test]
    fn test_body_stops_at_declared_length() {
        let message = EslMessage::parse(b"Content-Length: 27\n\n-ERR af Command not found!\n\n").unwrap();
        assert_eq!(message.body_str(), Some("-ERR af Command not found!\n".to_string()));
    }

    #[test]
    fn test_repeated_headers_fold() {
        let message = EslMessage::parse(b"X-Test: one\nX-Test: two\n\n").unwrap();
        assert_eq!(
            message
                .headers()
                .get_string("X-Test"),
            "one;two"
        );
    }

    #[test]
    fn test_continuation_line() {
        let message = EslMessage::parse(b"X-Long: first\n second\n\n").unwrap();
        assert_eq!(message.header("X-Long"), Some("first second".to_string()));
    }

    #[test]
    fn test_malformed_header_line() {
        let err = EslMessage::parse(b"not a header\n\n").unwrap_err();
        assert!(matches!(err, EslError::InvalidHeader { .. }));
    }

    #[test]
    fn test_non_numeric_content_length_rejected() {
        let err = EslMessage::parse(b"Content-Type: api/response\nContent-Length: abc\n\n").unwrap_err();
        assert!(matches!(err, EslError::InvalidHeader { .. }));
    }

    #[test]
    fn test_oversized_content_length_rejected() {
        let data = format!(
            "Content-Type: api/response\nContent-Length: {}\n\n",
            MAX_MESSAGE_SIZE + 1
        );
        let err = EslMessage::parse(data.as_bytes()).unwrap_err();
        assert!(matches!(err, EslError::ProtocolError { .. }));
    }

    #[test]
    fn test_has_error() {
        let cases: [(&[u8], bool); 4] = [
            (b"Content-Length: 18\n\n-ERR Testing error message\n", true),
            (
                b"Content-Type: command/reply\nReply-Text: -ERR Testing error message\n",
                true,
            ),
            (
                b"Content-Type: command/reply\nReply-Text: +OK log level 9999\n",
                false,
            ),
            (
                b"Content-Type: api/response\nContent-Length: 12\n\nlog 9999",
                false,
            ),
        ];

        for (idx, (input, expected)) in cases
            .iter()
            .enumerate()
        {
            let message = EslMessage::parse(input).unwrap();
            assert_eq!(message.has_error(), *expected, "case {}", idx);
        }
    }

    #[test]
    fn test_error_detail() {
        let message = EslMessage::parse(
            b"Content-Type: api/response\nContent-Length: 27\n\n-ERR Testing error message\n",
        )
        .unwrap();
        assert_eq!(
            message.error_detail(),
            Some("Testing error message".to_string())
        );

        let message = EslMessage::parse(
            b"Content-Type: command/reply\nReply-Text: -ERR Testing error message\n",
        )
        .unwrap();
        assert_eq!(
            message.error_detail(),
            Some("Testing error message".to_string())
        );

        let message =
            EslMessage::parse(b"Content-Type: command/reply\nReply-Text: +OK log level 9999\n")
                .unwrap();
        assert_eq!(message.error_detail(), None);

        let message =
            EslMessage::parse(b"Content-Type: api/response\nContent-Length: 12\n\nlog 9999").unwrap();
        assert_eq!(message.error_detail(), None);
    }

    #[test]
    fn test_error_body_takes_precedence_over_reply_text() {
        // A body that succeeded wins over an error Reply-Text
        let message = EslMessage::parse(
            b"Content-Type: api/response\nReply-Text: -ERR ignored\nContent-Length: 3\n\n+OK",
        )
        .unwrap();
        assert!(!message.has_error());
    }

    #[test]
    fn test_into_result() {
        let message =
            EslMessage::parse(b"Content-Type: command/reply\nReply-Text: -ERR invalid command\n\n")
                .unwrap();
        let err = message
            .into_result()
            .unwrap_err();
        assert!(
            matches!(err, EslError::CommandFailed { ref reply_text } if reply_text == "invalid command")
        );
    }

    #[test]
    fn test_job_uuid() {
        let message = EslMessage::parse(
            b"Content-Type: command/reply\nReply-Text: +OK Job-UUID: 7f4de4bc-17d7\n\n",
        )
        .unwrap();
        assert_eq!(message.job_uuid(), Some("7f4de4bc-17d7".to_string()));

        let message = EslMessage::parse(
            b"Content-Type: command/reply\nReply-Text: +OK Job-UUID: abc\nJob-UUID: def\n\n",
        )
        .unwrap();
        assert_eq!(message.job_uuid(), Some("def".to_string()));
    }

    #[test]
    fn test_display() {
        let message = EslMessage::parse(b"Content-Length: 27\n\n-ERR af Command not found!\n\n").unwrap();
        assert_eq!(
            message.to_string(),
            "Headers: Content-Length=27 ; Body: -ERR af Command not found!\n"
        );

        let message = EslMessage::parse(b"Content-Type: auth/request\n\n").unwrap();
        assert_eq!(message.to_string(), "Headers: Content-Type=auth/request");
    }

    #[test]
    fn test_parse_headers_percent_decodes_values() {
        let message = EslMessage::parse(b"Content-Type: command%2Freply\nReply-Text: %2BOK\n\n").unwrap();
        assert_eq!(message.content_type(), &ContentType::CommandReply);
        assert_eq!(message.reply_text(), Some("+OK".to_string()));
    }

    #[test]
    fn test_parse_headers_invalid_percent_sequence() {
        let message = EslMessage::parse(b"X-Bad: %ZZinvalid\nX-Good: clean\n\n").unwrap();
        assert_eq!(message.header("X-Bad"), Some("%ZZinvalid".to_string()));
        assert_eq!(message.header("X-Good"), Some("clean".to_string()));
    }

    #[test]
    fn test_content_type_classification() {
        let cases = [
            ("auth/request", ContentType::AuthRequest),
            ("command/reply", ContentType::CommandReply),
            ("api/response", ContentType::ApiResponse),
            ("text/disconnect-notice", ContentType::DisconnectNotice),
            ("text/rude-rejection", ContentType::RudeRejection),
            ("text/event-plain", ContentType::EventPlain),
            ("text/event-json", ContentType::EventJson),
            ("text/event-xml", ContentType::EventXml),
            ("text/plain", ContentType::TextPlain),
            ("log/data", ContentType::LogData),
        ];
        for (wire, expected) in cases {
            let ct = ContentType::from_content_type(wire);
            assert_eq!(ct, expected);
            assert_eq!(ct.as_str(), wire);
        }
        assert_eq!(
            ContentType::from_content_type("application/simple-message-summary"),
            ContentType::Unknown("application/simple-message-summary".into())
        );
    }

    #[test]
    fn test_streaming_incomplete_message() {
        let mut parser = EslParser::new();
        parser
            .add_data(b"Content-Type: api/response\nContent-Length: 10\n\ntest")
            .unwrap();
        assert!(parser
            .parse_message()
            .unwrap()
            .is_none());

        parser
            .add_data(b" data")
            .unwrap();
        assert!(parser
            .parse_message()
            .unwrap()
            .is_none());

        parser
            .add_data(b"!")
            .unwrap();
        let message = parser
            .parse_message()
            .unwrap()
            .unwrap();
        assert_eq!(message.body_str(), Some("test data!".to_string()));
        assert_eq!(parser.buffered(), 0);
    }

    #[test]
    fn test_streaming_headers_split_across_reads() {
        let mut parser = EslParser::new();
        parser
            .add_data(b"Content-Type: command/")
            .unwrap();
        assert!(parser
            .parse_message()
            .unwrap()
            .is_none());

        parser
            .add_data(b"reply\nReply-Text: +OK accepted\n\n")
            .unwrap();
        let message = parser
            .parse_message()
            .unwrap()
            .unwrap();
        assert_eq!(message.content_type(), &ContentType::CommandReply);
        assert_eq!(message.reply_text(), Some("+OK accepted".to_string()));
    }

    #[test]
    fn test_streaming_back_to_back_frames() {
        let mut parser = EslParser::new();
        parser
            .add_data(
                b"Content-Type: api/response\nContent-Length: 2\n\nOKContent-Type: command/reply\nReply-Text: +OK\n\n",
            )
            .unwrap();

        let first = parser
            .parse_message()
            .unwrap()
            .unwrap();
        assert_eq!(first.body(), Some(&b"OK"[..]));

        let second = parser
            .parse_message()
            .unwrap()
            .unwrap();
        assert_eq!(second.content_type(), &ContentType::CommandReply);
        assert_eq!(second.reply_text(), Some("+OK".to_string()));
        assert!(parser
            .parse_message()
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_streaming_skips_blank_line_after_body() {
        let mut parser = EslParser::new();
        parser
            .add_data(b"Content-Length: 5\n\nhello\n\nContent-Type: auth/request\n\n")
            .unwrap();

        let first = parser
            .parse_message()
            .unwrap()
            .unwrap();
        assert_eq!(first.body(), Some(&b"hello"[..]));

        let second = parser
            .parse_message()
            .unwrap()
            .unwrap();
        assert_eq!(second.content_type(), &ContentType::AuthRequest);
    }

    #[test]
    fn test_streaming_zero_length_drops_frame() {
        let mut parser = EslParser::new();
        parser
            .add_data(b"Content-Type: api/response\nContent-Length: 0\n\n")
            .unwrap();
        assert!(matches!(
            parser.parse_message(),
            Err(EslError::ContentLengthZero)
        ));
        assert_eq!(parser.buffered(), 0);
    }

    #[test]
    fn test_finish_flushes_partial_frame() {
        let mut parser = EslParser::new();
        parser
            .add_data(b"Content-Type: auth/request\n")
            .unwrap();
        assert!(parser
            .parse_message()
            .unwrap()
            .is_none());

        let message = parser
            .finish()
            .unwrap()
            .unwrap();
        assert_eq!(message.content_type(), &ContentType::AuthRequest);
        assert!(parser
            .finish()
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_buffer_limit() {
        let mut parser = EslParser::new();
        let chunk = vec![b'a'; MAX_BUFFER_SIZE];
        parser
            .add_data(&chunk)
            .unwrap();
        assert!(parser
            .add_data(b"x")
            .is_err());
    }
}
