// src/http/mod.rs
pub mod request;
pub mod response;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::http::request::ParseError;

/// HTTP version spoken by the server.
pub const VERSION: &str = "1.1";

/// HTTP uses CRLF as the line separator.
pub const NEW_LINE: &str = "\r\n";

/// HTTP parameters consisting of key-value pairs. Keys compare
/// case-sensitively.
pub type Parameters = HashMap<String, String>;

/// HTTP methods recognized by the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Parse a method name, case-insensitively.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        match text.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            _ => Err(ParseError::InvalidMethod(text.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP status codes used by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    BadRequest,
    Forbidden,
    NotFound,
}

impl StatusCode {
    pub fn code(self) -> u32 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// A file's content type by extension, compared case-insensitively.
/// `application/octet-stream` indicates arbitrary binary data.
pub fn content_type_by_file_name(name: &str) -> &'static str {
    let extension = Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("html") => "text/html",
        Some("xml") => "text/xml",
        Some("xhtml") => "application/xhtml+xml",
        Some("txt") => "text/plain",
        Some("rtf") => "application/rtf",
        Some("pdf") => "application/pdf",
        Some("word") => "application/nsword",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("au") => "audio/basic",
        Some("mpeg") | Some("mpg") => "video/mpeg",
        Some("avi") => "video/x-msvideo",
        Some("gz") => "application/x-gzip",
        Some("tar") => "application/x-tar",
        Some("css") => "text/css",
        Some("js") => "text/javascript",
        _ => "application/octet-stream",
    }
}

/// Decode a URL-encoded string: `+` maps to space and `%HH` pairs decode to
/// the named byte, in a single left-to-right pass.
pub fn decode_url_encoded(text: &str) -> Result<String, ParseError> {
    let bytes = text.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .ok_or_else(|| ParseError::InvalidEncoding(text.to_string()))?;
                let hex = std::str::from_utf8(hex)
                    .map_err(|_| ParseError::InvalidEncoding(text.to_string()))?;
                let byte = u8::from_str_radix(hex, 16)
                    .map_err(|_| ParseError::InvalidEncoding(text.to_string()))?;
                decoded.push(byte);
                i += 3;
            }
            b'+' => {
                decoded.push(b' ');
                i += 1;
            }
            byte => {
                decoded.push(byte);
                i += 1;
            }
        }
    }

    String::from_utf8(decoded).map_err(|_| ParseError::InvalidEncoding(text.to_string()))
}

/// The HTML placeholder for an HTTP parameter, used to insert data into a
/// template page.
pub fn html_placeholder(key: &str) -> String {
    format!("<${key}$>")
}

/// Substitute HTTP parameters into an HTML template in place of their
/// placeholders. Parameters without a placeholder are ignored; placeholders
/// without a parameter are left in place.
pub fn put_params_into_html(html: &str, params: &Parameters) -> String {
    let mut html = html.to_string();
    for (key, val) in params {
        html = html.replace(&html_placeholder(key), val);
    }
    html
}
