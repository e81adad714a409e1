// src/io.rs
use std::io;
use std::os::unix::io::RawFd;

use libc::c_void;

use crate::buffer::Buffer;

/// An I/O source that can drain itself into a [`Buffer`].
pub trait BufRead {
    /// Move bytes from this source into the buffer; returns bytes moved.
    fn read_into(&mut self, buf: &mut Buffer) -> io::Result<usize>;
}

/// An I/O sink that can consume a [`Buffer`]'s readable region.
pub trait BufWrite {
    /// Move the buffer's readable bytes into this sink; returns bytes moved.
    fn write_from(&mut self, buf: &mut Buffer) -> io::Result<usize>;
}

/// Size of the stack-allocated overflow region for scatter reads.
const SCRATCH_LEN: usize = 0x10000;

/// Buffer I/O over raw file descriptors.
///
/// A file descriptor uses the same offset for reading and writing, so the
/// constructor takes two descriptors; for sockets both sides are the same fd.
pub struct FdIo {
    read_fd: RawFd,
    write_fd: RawFd,
}

impl FdIo {
    pub fn new(read_fd: RawFd, write_fd: RawFd) -> Self {
        Self { read_fd, write_fd }
    }

    pub fn socket(fd: RawFd) -> Self {
        Self::new(fd, fd)
    }
}

impl BufRead for FdIo {
    /// Scatter read into the buffer's writable window plus a stack scratch
    /// region, so a small window does not cap the syscall. Overflow bytes are
    /// appended to the buffer afterwards.
    fn read_into(&mut self, buf: &mut Buffer) -> io::Result<usize> {
        let mut scratch = [0u8; SCRATCH_LEN];
        let (writable_ptr, writable_len) = {
            let writable = buf.writable();
            (writable.as_mut_ptr(), writable.len())
        };

        let iov = [
            libc::iovec {
                iov_base: writable_ptr as *mut c_void,
                iov_len: writable_len,
            },
            libc::iovec {
                iov_base: scratch.as_mut_ptr() as *mut c_void,
                iov_len: scratch.len(),
            },
        ];

        let size = unsafe { libc::readv(self.read_fd, iov.as_ptr(), iov.len() as libc::c_int) };
        if size < 0 {
            return Err(io::Error::last_os_error());
        }

        let size = size as usize;
        if size <= writable_len {
            buf.has_written(size);
        } else {
            buf.has_written(writable_len);
            buf.append(&scratch[..size - writable_len]);
        }
        Ok(size)
    }
}

impl BufWrite for FdIo {
    fn write_from(&mut self, buf: &mut Buffer) -> io::Result<usize> {
        let readable = buf.readable();
        if readable.is_empty() {
            return Ok(0);
        }

        let size = unsafe {
            libc::write(
                self.write_fd,
                readable.as_ptr() as *const c_void,
                readable.len(),
            )
        };
        if size < 0 {
            return Err(io::Error::last_os_error());
        }

        buf.retrieve(size as usize);
        Ok(size as usize)
    }
}

/// Null I/O: consumes the buffer's writable or readable space without moving
/// any data.
pub struct NullIo;

impl BufRead for NullIo {
    fn read_into(&mut self, buf: &mut Buffer) -> io::Result<usize> {
        let size = buf.writable_size();
        buf.has_written(size);
        Ok(size)
    }
}

impl BufWrite for NullIo {
    fn write_from(&mut self, buf: &mut Buffer) -> io::Result<usize> {
        Ok(buf.retrieve_all())
    }
}

/// In-memory stream I/O: reads come from a preset input, writes accumulate in
/// an output vector.
pub struct MemIo {
    input: Vec<u8>,
    read_pos: usize,
    output: Vec<u8>,
}

impl MemIo {
    pub fn new(input: impl Into<Vec<u8>>) -> Self {
        Self {
            input: input.into(),
            read_pos: 0,
            output: Vec::new(),
        }
    }

    pub fn output(&self) -> &[u8] {
        &self.output
    }
}

impl BufRead for MemIo {
    fn read_into(&mut self, buf: &mut Buffer) -> io::Result<usize> {
        let rest = &self.input[self.read_pos..];
        buf.append(rest);
        self.read_pos = self.input.len();
        Ok(rest.len())
    }
}

impl BufWrite for MemIo {
    fn write_from(&mut self, buf: &mut Buffer) -> io::Result<usize> {
        self.output.extend_from_slice(buf.readable());
        Ok(buf.retrieve_all())
    }
}

impl From<Vec<u8>> for MemIo {
    fn from(input: Vec<u8>) -> Self {
        Self::new(input)
    }
}

impl From<&str> for MemIo {
    fn from(input: &str) -> Self {
        Self::new(input.as_bytes().to_vec())
    }
}
