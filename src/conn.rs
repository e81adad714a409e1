// src/conn.rs
use std::io;
use std::net::SocketAddr;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use libc::c_void;

use crate::buffer::Buffer;
use crate::error::Result;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::{Parameters, StatusCode};
use crate::io::FdIo;
use crate::mmap::MappedFile;
use crate::sys;

const INDEX_PAGE: &str = "/index.html";

const USER_TAG: &str = "user";
const MSG_TAG: &str = "msg";
const HIDE_MSG_TAG: &str = "hide-msg";
const TRUE_TAG: &str = "true";
const FALSE_TAG: &str = "false";

/// The document root shared by every connection. Set once at startup, before
/// the first accept.
static ROOT_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Set the root directory all request paths are resolved against. Returns
/// `false` if it was already set.
pub fn set_root_directory(dir: impl Into<PathBuf>) -> bool {
    ROOT_DIR.set(dir.into()).is_ok()
}

/// The configured root directory, empty when unset.
pub fn root_directory() -> &'static Path {
    ROOT_DIR.get().map(PathBuf::as_path).unwrap_or(Path::new(""))
}

/// Per-client connection state.
///
/// Owns the non-blocking socket (closed exactly once on drop), the read and
/// write buffers, the request parser, and the mapped file of the response in
/// flight. A connection is driven by one worker at a time; the reactor's
/// one-shot event registration guarantees it.
pub struct Connection {
    socket: RawFd,
    addr: SocketAddr,
    keep_alive: bool,
    read_buf: Buffer,
    write_buf: Buffer,
    parser: Request,
    file: Option<MappedFile>,
    file_sent: usize,
}

impl Connection {
    pub fn new(socket: RawFd, addr: SocketAddr) -> Self {
        debug_assert!(socket >= 0);
        Self {
            socket,
            addr,
            keep_alive: false,
            read_buf: Buffer::new(),
            write_buf: Buffer::new(),
            parser: Request::new(),
            file: None,
            file_sent: 0,
        }
    }

    pub fn socket(&self) -> RawFd {
        self.socket
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Read everything the socket currently has into the read buffer.
    /// Would-block ends the loop; so does EOF, which the reactor observes
    /// separately as a hang-up event.
    pub fn receive(&mut self) -> Result<usize> {
        let mut io = FdIo::socket(self.socket);
        let mut total = 0;
        loop {
            match self.read_buf.read_from(&mut io) {
                Ok(0) => break,
                Ok(size) => total += size,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(total)
    }

    /// Drain the write buffer, then stream the mapped file from the current
    /// offset. Returns `false` when the socket would block before the
    /// response is fully flushed; the caller re-arms write interest and a
    /// later call resumes where this one stopped.
    pub fn send(&mut self) -> Result<bool> {
        let mut io = FdIo::socket(self.socket);
        while !self.write_buf.is_empty() {
            match self.write_buf.write_to(&mut io) {
                Ok(_) => {}
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(err) => return Err(err.into()),
            }
        }

        if let Some(file) = &self.file {
            while self.file_sent < file.size() {
                let rest = &file.data()[self.file_sent..];
                let size =
                    unsafe { libc::write(self.socket, rest.as_ptr() as *const c_void, rest.len()) };
                if size < 0 {
                    let err = io::Error::last_os_error();
                    if err.kind() == io::ErrorKind::WouldBlock {
                        return Ok(false);
                    }
                    return Err(err.into());
                }
                self.file_sent += size as usize;
            }
        }
        Ok(true)
    }

    /// Parse the buffered request and build a response into the write buffer.
    ///
    /// Returns `false` when the read buffer is empty or the parser still
    /// needs bytes; the caller then re-arms read interest. On a parse
    /// failure a BadRequest response is built and the connection is not kept
    /// alive. Returns `true` when a response is ready to send.
    pub fn process(&mut self) -> bool {
        self.file = None;
        self.file_sent = 0;
        if self.read_buf.is_empty() {
            return false;
        }

        let mut response = Response::new(root_directory());
        match self.parser.parse(&mut self.read_buf) {
            Ok(false) => return false,
            Ok(true) => {
                self.keep_alive = self.parser.keep_alive();
                response.set_keep_alive(self.keep_alive);

                let mut path = self.parser.path().to_string();
                if path.is_empty() || path == "/" {
                    path = INDEX_PAGE.to_string();
                }

                if path == INDEX_PAGE {
                    let params = self.index_params();
                    response.build_template(&mut self.write_buf, INDEX_PAGE, &params);
                } else {
                    let (_, file) = response.build_file(&mut self.write_buf, path);
                    self.file = file;
                }
            }
            Err(err) => {
                self.keep_alive = false;
                response.set_keep_alive(false);
                response.build_status(&mut self.write_buf, StatusCode::BadRequest, err.to_string());
            }
        }
        true
    }

    /// Parameters for the index template: the echoed user and message when
    /// both were submitted, and the `hide-msg` flag controlling whether the
    /// echo block is rendered.
    fn index_params(&self) -> Parameters {
        let user = self.parser.form_value(USER_TAG).unwrap_or_default();
        let msg = self.parser.form_value(MSG_TAG).unwrap_or_default();

        let mut params = Parameters::new();
        if !user.is_empty() && !msg.is_empty() {
            params.insert(USER_TAG.to_string(), user.to_string());
            params.insert(MSG_TAG.to_string(), msg.to_string());
        }
        let hide = if params.is_empty() { TRUE_TAG } else { FALSE_TAG };
        params.insert(HIDE_MSG_TAG.to_string(), hide.to_string());
        params
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        sys::close_fd(self.socket);
    }
}
