// src/http/response.rs
use std::path::PathBuf;

use crate::buffer::{Buffer, NewLine};
use crate::error::Error;
use crate::http::{
    content_type_by_file_name, put_params_into_html, Parameters, StatusCode, NEW_LINE, VERSION,
};
use crate::mmap::MappedFile;

/// The template rendered for error responses, looked up under the root
/// directory.
const STATUS_PAGE: &str = "/http-status.html";

const STATUS_CODE_TAG: &str = "status-code";
const STATUS_TAG: &str = "status";
const MSG_TAG: &str = "msg";

/// The HTTP response builder.
///
/// Builds the status line and headers into an output buffer. A file response
/// hands the mapped file back to the caller so its bytes can be streamed to
/// the socket separately; a template response renders placeholder
/// substitutions into the buffer; an error response renders the status
/// template or, when that cannot be mapped, a small predefined page. A file
/// that cannot be mapped demotes the response to BadRequest with the OS
/// diagnostic quoted in the body.
pub struct Response {
    root_dir: PathBuf,
    file_path: PathBuf,
    status: StatusCode,
    keep_alive: bool,
    file: Option<MappedFile>,
}

impl Response {
    /// Create a builder resolving relative request paths against `root_dir`.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            file_path: PathBuf::new(),
            status: StatusCode::Ok,
            keep_alive: false,
            file: None,
        }
    }

    /// Whether the connection should keep alive.
    pub fn set_keep_alive(&mut self, keep_alive: bool) -> &mut Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Build a response serving a file.
    ///
    /// Returns the resulting status and, on success, the mapped file whose
    /// content must be sent after the headers in `buf`.
    pub fn build_file(
        &mut self,
        buf: &mut Buffer,
        file: impl Into<PathBuf>,
    ) -> (StatusCode, Option<MappedFile>) {
        self.reset(file);
        self.build(buf, None);
        (self.status, self.file.take())
    }

    /// Build a response rendering an HTML template with parameters in place
    /// of `<$key$>` placeholders. Parameters without a placeholder are
    /// silently dropped; unmatched placeholders are left in place.
    pub fn build_template(
        &mut self,
        buf: &mut Buffer,
        html: impl Into<PathBuf>,
        params: &Parameters,
    ) -> StatusCode {
        self.reset(html);
        self.build(buf, Some(params));
        self.status
    }

    /// Build a response from an HTTP status and an optional diagnostic.
    ///
    /// Renders the status template when it is available under the root
    /// directory; otherwise the response is demoted to BadRequest carrying
    /// the predefined error page.
    pub fn build_status(
        &mut self,
        buf: &mut Buffer,
        code: StatusCode,
        msg: impl Into<String>,
    ) -> StatusCode {
        self.reset(STATUS_PAGE);
        self.status = code;

        let params = Parameters::from([
            (STATUS_CODE_TAG.to_string(), code.code().to_string()),
            (STATUS_TAG.to_string(), code.message().to_string()),
            (MSG_TAG.to_string(), msg.into()),
        ]);
        self.build(buf, Some(&params));
        self.status
    }

    fn reset(&mut self, file: impl Into<PathBuf>) {
        self.file = None;
        self.file_path = file.into();
        self.status = StatusCode::Ok;
    }

    fn build(&mut self, buf: &mut Buffer, params: Option<&Parameters>) {
        let map_error = match self.map_file() {
            Ok(()) => None,
            Err(msg) => {
                self.status = StatusCode::BadRequest;
                Some(msg)
            }
        };

        self.add_status_line(buf);
        self.add_headers(buf);
        match map_error {
            None => match params {
                Some(params) => self.add_param_content(buf, params),
                None => self.add_mapped_content(buf),
            },
            Some(msg) => self.add_predefined_error_content(buf, &msg),
        }
    }

    /// Map the requested file, resolving a relative request path against the
    /// root directory.
    fn map_file(&mut self) -> Result<(), String> {
        // An HTTP path has the form "/path/to/file"; resolving it against the
        // root requires stripping the leading slash, otherwise the join would
        // discard the root entirely.
        let full_path = if self.root_dir.as_os_str().is_empty() {
            self.file_path.clone()
        } else {
            let relative = self
                .file_path
                .strip_prefix("/")
                .unwrap_or(&self.file_path);
            self.root_dir.join(relative)
        };

        match MappedFile::map(full_path) {
            Ok(file) => {
                self.file = Some(file);
                Ok(())
            }
            Err(Error::FileAccess(msg)) => Err(msg),
            Err(err) => Err(err.to_string()),
        }
    }

    fn add_status_line(&self, buf: &mut Buffer) {
        buf.append_str(
            &format!(
                "HTTP/{} {} {}",
                VERSION,
                self.status.code(),
                self.status.message()
            ),
            Some(NewLine::Crlf),
        );
    }

    fn add_headers(&self, buf: &mut Buffer) {
        buf.append_str("Connection: ", None);
        if self.keep_alive {
            buf.append_str("keep-alive", Some(NewLine::Crlf));
            buf.append_str("keep-alive: max=6, timeout=120", Some(NewLine::Crlf));
        } else {
            buf.append_str("close", Some(NewLine::Crlf));
        }
    }

    /// Content headers for the mapped file. The file bytes themselves are
    /// streamed by the caller, not copied into the buffer.
    fn add_mapped_content(&self, buf: &mut Buffer) {
        let file = self.file.as_ref().unwrap();
        buf.append_str(
            &format!("Content-type: {}", self.request_content_type()),
            Some(NewLine::Crlf),
        );
        buf.append_str(
            &format!("Content-length: {}", file.size()),
            Some(NewLine::Crlf),
        );
        buf.append_str(NEW_LINE, None);
    }

    fn add_param_content(&self, buf: &mut Buffer, params: &Parameters) {
        let file = self.file.as_ref().unwrap();
        buf.append_str(
            &format!("Content-type: {}", self.request_content_type()),
            Some(NewLine::Crlf),
        );

        let content = String::from_utf8_lossy(file.data());
        let content = put_params_into_html(&content, params);

        // The advertised length counts the rendered lines joined with CRLF,
        // and the body is written from the same lines so the two always
        // agree.
        let lines = split_lines(&content);
        let length: usize = lines.iter().map(|line| line.len()).sum::<usize>()
            + NEW_LINE.len() * lines.len().saturating_sub(1);

        buf.append_str(&format!("Content-length: {length}"), Some(NewLine::Crlf));
        buf.append_str(NEW_LINE, None);

        for (i, line) in lines.iter().enumerate() {
            if i != lines.len() - 1 {
                buf.append_str(line, Some(NewLine::Crlf));
            } else {
                buf.append_str(line, None);
            }
        }
    }

    fn add_predefined_error_content(&self, buf: &mut Buffer, msg: &str) {
        let mut body = String::new();
        body.push_str("<html>");
        body.push_str(NEW_LINE);
        body.push_str("<title>ERROR</title>");
        body.push_str(NEW_LINE);
        body.push_str("<body>");
        body.push_str(NEW_LINE);
        body.push_str(&format!(
            "<p>{} : {}</p>",
            self.status.code(),
            self.status.message()
        ));
        body.push_str(NEW_LINE);
        if !msg.is_empty() {
            body.push_str(&format!("<p>{msg}</p>"));
            body.push_str(NEW_LINE);
        }
        body.push_str("</body>");
        body.push_str(NEW_LINE);
        body.push_str("</html>");

        buf.append_str("Content-type: text/html", Some(NewLine::Crlf));
        buf.append_str(&format!("Content-length: {}", body.len()), Some(NewLine::Crlf));
        buf.append_str(NEW_LINE, None);
        buf.append_str(&body, None);
    }

    fn request_content_type(&self) -> &'static str {
        content_type_by_file_name(&self.file_path.to_string_lossy())
    }
}

/// Split text into lines, where a separator is a newline together with any
/// run of carriage returns directly before it. A trailing separator does not
/// produce an empty final line.
fn split_lines(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut lines = Vec::new();
    let mut start = 0;

    for (i, byte) in bytes.iter().enumerate() {
        if *byte == b'\n' {
            let mut end = i;
            while end > start && bytes[end - 1] == b'\r' {
                end -= 1;
            }
            lines.push(&text[start..end]);
            start = i + 1;
        }
    }
    if start < bytes.len() {
        lines.push(&text[start..]);
    }
    lines
}
