// src/epoll.rs
use std::io;
use std::os::unix::io::RawFd;
use std::ptr;
use std::sync::Mutex;
use std::time::Duration;

use libc::c_int;

/// Readiness event masks used by the server. All registrations are
/// edge-triggered.
pub const EVENT_IN: u32 = libc::EPOLLIN as u32;
pub const EVENT_OUT: u32 = libc::EPOLLOUT as u32;
pub const EVENT_RDHUP: u32 = libc::EPOLLRDHUP as u32;
pub const EVENT_HUP: u32 = libc::EPOLLHUP as u32;
pub const EVENT_ERR: u32 = libc::EPOLLERR as u32;
pub const EVENT_EDGE: u32 = libc::EPOLLET as u32;
pub const EVENT_ONESHOT: u32 = libc::EPOLLONESHOT as u32;

/// The I/O event notification facility.
///
/// Monitors a set of file descriptors for readiness. `add`, `modify`, and
/// `delete` are callable from any thread; `wait` and the indexed accessors
/// belong to the reactor thread.
pub struct Epoller {
    epoll_fd: RawFd,
    events: Mutex<Vec<libc::epoll_event>>,
}

impl Epoller {
    /// Create an epoller able to report up to `capacity` events per wait.
    pub fn new(capacity: usize) -> io::Result<Self> {
        assert!(capacity > 0);
        let epoll_fd = unsafe { libc::epoll_create1(0) };
        if epoll_fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            epoll_fd,
            events: Mutex::new(vec![libc::epoll_event { events: 0, u64: 0 }; capacity]),
        })
    }

    pub fn add(&self, fd: RawFd, interest: u32) -> io::Result<()> {
        self.control(libc::EPOLL_CTL_ADD, fd, Some(interest))
    }

    pub fn modify(&self, fd: RawFd, interest: u32) -> io::Result<()> {
        self.control(libc::EPOLL_CTL_MOD, fd, Some(interest))
    }

    pub fn delete(&self, fd: RawFd) -> io::Result<()> {
        match self.control(libc::EPOLL_CTL_DEL, fd, None) {
            // Deleting an fd that is already gone is not a failure.
            Err(err) if err.raw_os_error() == Some(libc::ENOENT) => Ok(()),
            other => other,
        }
    }

    fn control(&self, op: c_int, fd: RawFd, interest: Option<u32>) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: interest.unwrap_or(0),
            u64: fd as u64,
        };
        let event_ptr = if interest.is_some() {
            &mut event as *mut libc::epoll_event
        } else {
            ptr::null_mut()
        };

        if unsafe { libc::epoll_ctl(self.epoll_fd, op, fd, event_ptr) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Wait for events, up to `time_out` (`None` blocks indefinitely).
    /// Returns the number of ready descriptors; a signal-interrupted wait
    /// reports zero ready, never an error.
    pub fn wait(&self, time_out: Option<Duration>) -> io::Result<usize> {
        let milliseconds: c_int = match time_out {
            Some(time_out) => time_out.as_millis().min(c_int::MAX as u128) as c_int,
            None => -1,
        };

        let mut events = self.events.lock().unwrap();
        let ready = unsafe {
            libc::epoll_wait(
                self.epoll_fd,
                events.as_mut_ptr(),
                events.len() as c_int,
                milliseconds,
            )
        };

        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                return Ok(0);
            }
            return Err(err);
        }
        Ok(ready as usize)
    }

    /// The descriptor behind the i-th ready event. Valid only for
    /// `0 <= i < ready_count` after a wait.
    pub fn fd(&self, idx: usize) -> RawFd {
        let events = self.events.lock().unwrap();
        let data = events[idx].u64;
        data as RawFd
    }

    /// The trigger mask of the i-th ready event. Valid only for
    /// `0 <= i < ready_count` after a wait.
    pub fn events(&self, idx: usize) -> u32 {
        let events = self.events.lock().unwrap();
        let mask = events[idx].events;
        mask
    }
}

impl Drop for Epoller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epoll_fd);
        }
    }
}
