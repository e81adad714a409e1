// src/http/request.rs
use thiserror::Error;

use crate::buffer::Buffer;
use crate::http::{decode_url_encoded, Method, Parameters, NEW_LINE};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Malformed-request errors. Every variant maps to a BadRequest response and
/// the connection is not kept alive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid HTTP request line: '{0}'")]
    InvalidRequestLine(String),

    #[error("Invalid HTTP method: '{0}'")]
    InvalidMethod(String),

    #[error("There must be an empty line between HTTP headers and the body")]
    MissingBlankLine,

    #[error("Unsupported HTTP method: '{0}'")]
    UnsupportedMethod(String),

    #[error("Unsupported HTTP content type: '{0}'")]
    UnsupportedContentType(String),

    #[error("Invalid HTTP POST data: '{0}'")]
    InvalidFormData(String),

    #[error("Invalid HTTP URL-encoding: '{0}'")]
    InvalidEncoding(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    NotStarted,
    Headers,
    Body,
    Finished,
}

/// The incremental HTTP request parser.
///
/// Feeding it a buffer consumes complete CRLF-terminated lines and advances
/// the state machine; an incomplete header line leaves the state untouched
/// and reports "need more bytes", so the result of a parse does not depend on
/// how the request was chunked across receives. A trailing fragment that can
/// no longer extend to a header line is rejected at once as body bytes with
/// no blank line in front of them. The body itself is not delimited by
/// `Content-Length`: whatever readable bytes follow the blank line at parse
/// time form the body.
#[derive(Debug)]
pub struct Request {
    state: ParseState,
    method: Method,
    path: String,
    version: String,
    headers: Parameters,
    form: Parameters,
}

impl Request {
    pub fn new() -> Self {
        Self {
            state: ParseState::NotStarted,
            method: Method::Get,
            path: String::new(),
            version: String::new(),
            headers: Parameters::new(),
            form: Parameters::new(),
        }
    }

    /// Parse an HTTP request from the buffer's readable region.
    ///
    /// Returns `Ok(true)` when a complete request has been parsed, `Ok(false)`
    /// when more bytes are needed. Consumed bytes are retrieved from the
    /// buffer either way. Parsing a new request clears the previous one.
    pub fn parse(&mut self, buf: &mut Buffer) -> Result<bool, ParseError> {
        if self.state == ParseState::Finished {
            self.clear();
        }

        loop {
            match self.state {
                ParseState::NotStarted => {
                    let Some(line) = Self::take_line(buf) else {
                        return Ok(false);
                    };
                    self.parse_request_line(&line)?;
                }
                ParseState::Headers => {
                    let Some(line) = Self::take_line(buf) else {
                        // A trailing fragment with a space before any colon
                        // can never grow into a header line (header names are
                        // tokens): these are body bytes with no blank line in
                        // front of them.
                        if Self::cannot_become_header(buf.readable()) {
                            return Err(ParseError::MissingBlankLine);
                        }
                        return Ok(false);
                    };
                    self.parse_header_line(&line)?;
                }
                ParseState::Body => {
                    let body = buf.retrieve_all_as_string();
                    if !body.is_empty() {
                        self.parse_body(&body)?;
                    }
                    self.state = ParseState::Finished;
                }
                ParseState::Finished => return Ok(true),
            }
        }
    }

    /// Clear the accumulated request.
    pub fn clear(&mut self) {
        self.state = ParseState::NotStarted;
        self.method = Method::Get;
        self.path.clear();
        self.version.clear();
        self.headers.clear();
        self.form.clear();
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Look up a header by its key. The query is case-sensitive.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// Look up a form variable by its key. The query is case-sensitive.
    pub fn form_value(&self, key: &str) -> Option<&str> {
        self.form.get(key).map(String::as_str)
    }

    pub fn form_size(&self) -> usize {
        self.form.len()
    }

    /// Whether the request keeps the connection alive: HTTP/1.1 with a
    /// `Connection: keep-alive` header present exactly.
    pub fn keep_alive(&self) -> bool {
        match self.headers.get("Connection") {
            Some(conn) => self.version == "1.1" && conn == "keep-alive",
            None => false,
        }
    }

    fn cannot_become_header(fragment: &[u8]) -> bool {
        let colon = fragment.iter().position(|&byte| byte == b':');
        match fragment.iter().position(|&byte| byte == b' ') {
            Some(space) => colon.map_or(true, |colon| space < colon),
            None => false,
        }
    }

    /// Pop one complete CRLF-terminated line off the buffer, or `None` when
    /// no full line is available yet.
    fn take_line(buf: &mut Buffer) -> Option<String> {
        let readable = buf.readable();
        let end = readable
            .windows(NEW_LINE.len())
            .position(|window| window == NEW_LINE.as_bytes())?;
        let line = String::from_utf8_lossy(&readable[..end]).into_owned();
        buf.retrieve(end + NEW_LINE.len());
        Some(line)
    }

    fn parse_request_line(&mut self, line: &str) -> Result<(), ParseError> {
        let invalid = || ParseError::InvalidRequestLine(line.to_string());
        let (method, rest) = line.split_once(' ').ok_or_else(invalid)?;
        let (path, version) = rest.split_once(' ').ok_or_else(invalid)?;
        let version = version.strip_prefix("HTTP/").ok_or_else(invalid)?;
        if version.contains(' ') {
            return Err(invalid());
        }

        self.method = Method::parse(method)?;
        self.path = path.to_string();
        self.version = version.to_string();
        self.state = ParseState::Headers;
        Ok(())
    }

    fn parse_header_line(&mut self, line: &str) -> Result<(), ParseError> {
        if line.is_empty() {
            self.state = ParseState::Body;
            return Ok(());
        }

        let (name, value) = line.split_once(':').ok_or(ParseError::MissingBlankLine)?;
        let value = value.strip_prefix(' ').unwrap_or(value);
        // The first occurrence of a repeated header wins.
        self.headers
            .entry(name.to_string())
            .or_insert_with(|| value.to_string());
        Ok(())
    }

    fn parse_body(&mut self, body: &str) -> Result<(), ParseError> {
        match self.method {
            Method::Post => self.parse_post(body),
            other => Err(ParseError::UnsupportedMethod(other.as_str().to_string())),
        }
    }

    fn parse_post(&mut self, body: &str) -> Result<(), ParseError> {
        let content_type = self.headers.get("Content-Type").cloned().unwrap_or_default();
        if content_type == FORM_CONTENT_TYPE {
            self.parse_url_encoded_form(body)
        } else {
            Err(ParseError::UnsupportedContentType(content_type))
        }
    }

    fn parse_url_encoded_form(&mut self, body: &str) -> Result<(), ParseError> {
        let decoded = decode_url_encoded(body)?;
        for pair in decoded.split('&') {
            let invalid = || ParseError::InvalidFormData(body.to_string());
            let (key, val) = pair.split_once('=').ok_or_else(invalid)?;
            if key.is_empty() || val.is_empty() {
                return Err(invalid());
            }
            if self
                .form
                .insert(key.to_string(), val.to_string())
                .is_some()
            {
                // Duplicate keys are rejected, not first-writer-wins.
                return Err(invalid());
            }
        }
        Ok(())
    }
}

impl Default for Request {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Request, ParseError> {
        let mut buf = Buffer::from(text);
        let mut request = Request::new();
        assert!(request.parse(&mut buf)?);
        Ok(request)
    }

    #[test]
    fn empty_body_has_no_form_variables() {
        let request = parse(
            "POST /path/to/file HTTP/1.1\r\n\
             Host: server.id\r\n\
             Content-Type: application/x-www-form-urlencoded\r\n\
             Content-Length: 0\r\n\
             \r\n",
        )
        .unwrap();

        assert_eq!(request.header("Content-Length"), Some("0"));
        assert_eq!(request.form_size(), 0);
    }

    #[test]
    fn single_form_variable() {
        let request = parse(
            "POST /file HTTP/1.1\r\n\
             Host: server.id\r\n\
             Content-Type: application/x-www-form-urlencoded\r\n\
             Content-Length: 4\r\n\
             \r\n\
             id=1",
        )
        .unwrap();

        assert!(!request.keep_alive());
        assert_eq!(request.version(), "1.1");
        assert_eq!(request.path(), "/file");
        assert_eq!(request.method(), Method::Post);

        assert_eq!(request.header("Content-Length"), Some("4"));
        assert_eq!(
            request.header("Content-Type"),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(request.header("Host"), Some("server.id"));
        assert_eq!(request.header("Connection"), None);

        assert_eq!(request.form_value("id"), Some("1"));
        assert_eq!(request.form_value("name"), None);

        // Lookups are case-sensitive.
        assert_eq!(request.form_value("ID"), None);
        assert_eq!(request.header("host"), None);
        assert_eq!(request.header("HOST"), None);

        assert_eq!(request.form_size(), 1);
    }

    #[test]
    fn decoded_form_and_keep_alive() {
        let request = parse(
            "POST /path/to/file HTTP/1.1\r\n\
             Host: server.id\r\n\
             Connection: keep-alive\r\n\
             Content-Type: application/x-www-form-urlencoded\r\n\
             Content-Length: 32\r\n\
             \r\n\
             id=1&name=mike+chen&msg=hello%21",
        )
        .unwrap();

        assert!(request.keep_alive());
        assert_eq!(request.form_value("id"), Some("1"));
        assert_eq!(request.form_value("name"), Some("mike chen"));
        assert_eq!(request.form_value("msg"), Some("hello!"));
        assert_eq!(request.form_size(), 3);
    }

    #[test]
    fn body_without_blank_line_fails() {
        let result = parse(
            "POST /path/to/file HTTP/1.1\r\n\
             Host: server.id\r\n\
             Content-Type: application/x-www-form-urlencoded\r\n\
             Content-Length: 4\r\n\
             invalid body without an empty line",
        );
        assert_eq!(result.unwrap_err(), ParseError::MissingBlankLine);
    }

    #[test]
    fn non_post_body_is_unsupported() {
        let result = parse("GET /file HTTP/1.1\r\nHost: h\r\n\r\nid=1");
        assert_eq!(
            result.unwrap_err(),
            ParseError::UnsupportedMethod("GET".to_string())
        );

        // A body-less GET is fine.
        assert!(parse("GET /file HTTP/1.1\r\nHost: h\r\n\r\n").is_ok());
    }

    #[test]
    fn wrong_content_type_is_unsupported() {
        let result = parse(
            "POST /file HTTP/1.1\r\n\
             Content-Type: text/plain\r\n\
             \r\n\
             id=1",
        );
        assert_eq!(
            result.unwrap_err(),
            ParseError::UnsupportedContentType("text/plain".to_string())
        );
    }

    #[test]
    fn malformed_request_line_fails() {
        assert!(matches!(
            parse("POST\r\n\r\n").unwrap_err(),
            ParseError::InvalidRequestLine(_)
        ));
        assert!(matches!(
            parse("POST /x FTP/1.1\r\n\r\n").unwrap_err(),
            ParseError::InvalidRequestLine(_)
        ));
        assert!(matches!(
            parse("SPEAK /x HTTP/1.1\r\n\r\n").unwrap_err(),
            ParseError::InvalidMethod(_)
        ));
    }

    #[test]
    fn form_rejects_empty_and_duplicate_keys() {
        let request = |body: &str| {
            parse(&format!(
                "POST /x HTTP/1.1\r\n\
                 Content-Type: application/x-www-form-urlencoded\r\n\
                 \r\n\
                 {body}"
            ))
        };

        assert!(matches!(
            request("=1").unwrap_err(),
            ParseError::InvalidFormData(_)
        ));
        assert!(matches!(
            request("id=").unwrap_err(),
            ParseError::InvalidFormData(_)
        ));
        assert!(matches!(
            request("id=1&id=2").unwrap_err(),
            ParseError::InvalidFormData(_)
        ));
        assert!(matches!(
            request("novalue").unwrap_err(),
            ParseError::InvalidFormData(_)
        ));
    }

    #[test]
    fn chunked_delivery_matches_single_shot() {
        let text = "POST /file HTTP/1.1\r\n\
                    Host: server.id\r\n\
                    Connection: keep-alive\r\n\
                    Content-Type: application/x-www-form-urlencoded\r\n\
                    Content-Length: 4\r\n\
                    \r\n\
                    id=1";

        // Split inside a header line: the parser must ask for more bytes and
        // produce the same request once the rest arrives.
        for split in [3, 20, 40, text.len() - 5] {
            let mut buf = Buffer::new();
            let mut request = Request::new();

            buf.append(text[..split].as_bytes());
            assert!(!request.parse(&mut buf).unwrap());

            buf.append(text[split..].as_bytes());
            assert!(request.parse(&mut buf).unwrap());

            let reference = parse(text).unwrap();
            assert_eq!(request.method(), reference.method());
            assert_eq!(request.path(), reference.path());
            assert_eq!(request.version(), reference.version());
            assert_eq!(request.header("Host"), reference.header("Host"));
            assert_eq!(request.form_value("id"), reference.form_value("id"));
            assert_eq!(request.keep_alive(), reference.keep_alive());
        }
    }

    #[test]
    fn well_formed_request_consumes_its_bytes() {
        let mut buf = Buffer::from("GET /a HTTP/1.1\r\nHost: h\r\n\r\n");
        let mut request = Request::new();
        assert!(request.parse(&mut buf).unwrap());
        assert_eq!(request.path(), "/a");
        assert!(buf.is_empty());
    }

    #[test]
    fn trailing_bytes_are_read_as_the_body() {
        // The body is not delimited by Content-Length: a second pipelined
        // request in the same read is taken as the first one's body and
        // rejected for a body-less method.
        let mut buf = Buffer::from("GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n");
        let mut request = Request::new();
        assert!(request.parse(&mut buf).is_err());
    }

    #[test]
    fn parser_resets_between_requests() {
        let mut request = Request::new();

        let mut buf = Buffer::from("GET /first HTTP/1.1\r\nHost: a\r\n\r\n");
        assert!(request.parse(&mut buf).unwrap());
        assert_eq!(request.path(), "/first");

        let mut buf = Buffer::from("GET /second HTTP/1.1\r\n\r\n");
        assert!(request.parse(&mut buf).unwrap());
        assert_eq!(request.path(), "/second");
        assert_eq!(request.header("Host"), None);
    }
}
