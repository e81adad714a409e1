// src/buffer.rs
use std::io;

use crate::io::{BufRead, BufWrite};

/// New-line terminators appended by [`Buffer::append_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewLine {
    /// `\n`
    Lf,
    /// `\r\n`
    Crlf,
}

const INITIAL_CAPACITY: usize = 1024;

/// An auto-expandable FIFO byte buffer.
///
/// The underlying region is split into three parts delimited by a read cursor
/// and a write cursor:
///
/// ```text
///                 write cursor ────────┐
///  read cursor ───────┐                │
///                     ▼                ▼
/// ┌───────────────────┬────────────────┬────────────────┐
/// │ prependable bytes │ readable bytes │ writable bytes │
/// └───────────────────┴────────────────┴────────────────┘
/// ```
///
/// Prependable space is reclaimed before the region grows: expanding slides
/// the readable bytes back to offset zero when that frees enough room,
/// otherwise the region is reallocated to exactly `write + n` bytes.
pub struct Buffer {
    buf: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
}

impl Buffer {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity],
            read_pos: 0,
            write_pos: 0,
        }
    }

    /// Total size of the underlying region.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn readable_size(&self) -> usize {
        self.write_pos - self.read_pos
    }

    pub fn writable_size(&self) -> usize {
        self.buf.len() - self.write_pos
    }

    pub fn prependable_size(&self) -> usize {
        self.read_pos
    }

    pub fn is_empty(&self) -> bool {
        self.readable_size() == 0
    }

    /// The first readable byte, without moving the read cursor.
    pub fn peek(&self) -> Option<u8> {
        self.readable().first().copied()
    }

    /// Readable bytes, without moving the read cursor.
    pub fn readable(&self) -> &[u8] {
        &self.buf[self.read_pos..self.write_pos]
    }

    /// Writable space for direct editing. Callers writing through this view
    /// must advance the write cursor themselves with [`Buffer::has_written`].
    pub fn writable(&mut self) -> &mut [u8] {
        &mut self.buf[self.write_pos..]
    }

    /// Readable bytes as text, without moving the read cursor.
    pub fn readable_string(&self) -> String {
        String::from_utf8_lossy(self.readable()).into_owned()
    }

    pub fn append(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.ensure_writable(data.len());
        self.buf[self.write_pos..self.write_pos + data.len()].copy_from_slice(data);
        self.has_written(data.len());
    }

    /// Append a string and an optional new-line terminator.
    pub fn append_str(&mut self, text: &str, new_line: Option<NewLine>) {
        self.append(text.as_bytes());
        match new_line {
            Some(NewLine::Lf) => self.append(b"\n"),
            Some(NewLine::Crlf) => self.append(b"\r\n"),
            None => {}
        }
    }

    /// Append another buffer's readable region without consuming it.
    pub fn append_buffer(&mut self, other: &Buffer) {
        self.append(other.readable());
    }

    /// Make sure at least `size` bytes are writable, reusing prependable
    /// space before reallocating.
    pub fn ensure_writable(&mut self, size: usize) {
        if self.writable_size() < size {
            self.make_space(size);
        }
        debug_assert!(self.writable_size() >= size);
    }

    fn make_space(&mut self, size: usize) {
        if self.writable_size() + self.prependable_size() < size {
            self.buf.resize(self.write_pos + size, 0);
        } else {
            let readable = self.readable_size();
            self.buf.copy_within(self.read_pos..self.write_pos, 0);
            self.read_pos = 0;
            self.write_pos = readable;
        }
    }

    /// Manually advance the write cursor after writing through
    /// [`Buffer::writable`].
    pub fn has_written(&mut self, size: usize) {
        assert!(self.writable_size() >= size);
        self.write_pos += size;
    }

    /// Manually advance the read cursor.
    pub fn retrieve(&mut self, size: usize) {
        assert!(self.readable_size() >= size);
        self.read_pos += size;
    }

    /// Advance the read cursor up to an address inside the readable region.
    pub fn retrieve_until(&mut self, addr: *const u8) -> usize {
        let begin = self.readable().as_ptr() as usize;
        let end = addr as usize;
        assert!(begin <= end && end <= begin + self.readable_size());
        let size = end - begin;
        self.retrieve(size);
        size
    }

    /// Advance the read cursor to the end, returning the number of bytes
    /// consumed.
    pub fn retrieve_all(&mut self) -> usize {
        let size = self.readable_size();
        self.clear();
        size
    }

    /// Advance the read cursor to the end, extracting the consumed bytes as
    /// text.
    pub fn retrieve_all_as_string(&mut self) -> String {
        let text = self.readable_string();
        self.clear();
        text
    }

    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
    }

    /// Fill the buffer from an I/O source. This is the only buffer operation
    /// besides [`Buffer::write_to`] that may perform system calls.
    pub fn read_from(&mut self, io: &mut dyn BufRead) -> io::Result<usize> {
        io.read_into(self)
    }

    /// Drain the buffer's readable region into an I/O sink.
    pub fn write_to(&mut self, io: &mut dyn BufWrite) -> io::Result<usize> {
        io.write_from(self)
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&[u8]> for Buffer {
    fn from(bytes: &[u8]) -> Self {
        let mut buf = Self::with_capacity(0);
        buf.append(bytes);
        buf
    }
}

impl From<&str> for Buffer {
    fn from(text: &str) -> Self {
        Self::from(text.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemIo;

    #[test]
    fn construction() {
        let buf = Buffer::new();
        assert!(buf.is_empty());
        assert_eq!(buf.readable_size(), 0);
        assert_eq!(buf.peek(), None);

        let buf = Buffer::from("");
        assert!(buf.is_empty());
        assert_eq!(buf.peek(), None);

        let buf = Buffer::from("hello");
        assert!(!buf.is_empty());
        assert_eq!(buf.readable_size(), 5);
        assert_eq!(buf.readable_string(), "hello");
        assert_eq!(buf.peek(), Some(b'h'));
        assert_eq!(buf.readable(), b"hello");
    }

    #[test]
    fn read_write_offsets() {
        let mut buf = Buffer::with_capacity(0x10);
        assert_eq!(buf.writable_size(), 0x10);

        buf.append(b"hello");
        assert_eq!(buf.readable_size(), 5);

        buf.retrieve(1);
        assert_eq!(buf.readable_size(), 4);
        assert_eq!(buf.readable_string(), "ello");

        let addr = unsafe { buf.readable().as_ptr().add(2) };
        assert_eq!(buf.retrieve_until(addr), 2);
        assert_eq!(buf.readable_string(), "lo");

        assert_eq!(buf.retrieve_all(), 2);
        assert!(buf.is_empty());

        buf.ensure_writable(0x1000);
        assert!(buf.writable_size() >= 0x1000);
    }

    #[test]
    fn append_and_retrieve() {
        let mut buf = Buffer::with_capacity(0x10);

        buf.append(b"1");
        assert_eq!(buf.peek(), Some(b'1'));
        buf.append(b"2");
        assert_eq!(buf.readable_string(), "12");
        buf.append_buffer(&Buffer::from("3"));
        assert_eq!(buf.readable_string(), "123");
        assert_eq!(buf.writable_size(), 0x10 - 3);

        assert_eq!(buf.retrieve_all_as_string(), "123");
        assert!(buf.is_empty());

        buf.append_str("hello", Some(NewLine::Crlf));
        assert_eq!(buf.retrieve_all_as_string(), "hello\r\n");
        buf.append_str("hello", Some(NewLine::Lf));
        assert_eq!(buf.retrieve_all_as_string(), "hello\n");
    }

    #[test]
    fn append_does_not_consume_source() {
        let src = Buffer::from("hello");
        let mut dst = Buffer::new();
        dst.append_buffer(&src);
        assert_eq!(src.readable_size(), 5);
        assert_eq!(dst.readable_string(), "hello");
    }

    #[test]
    fn growth_reuses_prependable_space() {
        let mut buf = Buffer::with_capacity(8);
        buf.append(b"abcdef");
        buf.retrieve(4);

        // writable (2) + prependable (4) >= 5: the readable bytes slide back
        // and no reallocation happens.
        buf.ensure_writable(5);
        assert_eq!(buf.capacity(), 8);
        assert_eq!(buf.prependable_size(), 0);
        assert_eq!(buf.readable_string(), "ef");

        // Not enough reusable space: capacity grows to exactly write + n.
        buf.ensure_writable(100);
        assert_eq!(buf.capacity(), buf.readable_size() + 100);
    }

    #[test]
    fn cursor_invariants_hold() {
        let mut buf = Buffer::with_capacity(4);
        let check = |b: &Buffer| {
            assert_eq!(
                b.prependable_size() + b.readable_size() + b.writable_size(),
                b.capacity()
            );
        };

        check(&buf);
        buf.append(b"abcdefgh");
        check(&buf);
        buf.retrieve(3);
        check(&buf);
        buf.append(b"xyz");
        check(&buf);
        buf.retrieve_all();
        check(&buf);
    }

    #[test]
    fn append_then_retrieve_is_neutral() {
        let mut buf = Buffer::from("base");
        buf.append(b"extra");
        buf.retrieve(5);
        assert_eq!(buf.readable_size(), 4);
        assert_eq!(buf.readable_string(), "xtra");

        let mut buf = Buffer::new();
        buf.append(b"hello");
        buf.retrieve(5);
        assert!(buf.is_empty());
    }

    #[test]
    fn clear_resets_cursors() {
        let mut buf = Buffer::from("hello");
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.readable_size(), 0);
        assert_eq!(buf.peek(), None);
    }

    #[test]
    fn io_round_trip() {
        let mut buf = Buffer::new();
        let mut io = MemIo::new("hello");

        assert_eq!(buf.read_from(&mut io).unwrap(), 5);
        assert_eq!(buf.readable_string(), "hello");

        assert_eq!(buf.write_to(&mut io).unwrap(), 5);
        assert!(buf.is_empty());
        assert_eq!(io.output(), b"hello");
    }
}
