// src/sys.rs
use std::ffi::CStr;
use std::io;
use std::mem;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::os::unix::io::RawFd;

use libc::{c_int, c_void, socklen_t};

/// IP family of the listening socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpFamily {
    V4,
    V6,
}

/// Create the listening socket: `SO_LINGER` on with a one second timeout,
/// `SO_REUSEADDR`, bound to `any:port`, listening with the OS default
/// backlog, and switched to non-blocking.
pub fn create_listen_socket(family: IpFamily, port: u16) -> io::Result<RawFd> {
    unsafe {
        let domain = match family {
            IpFamily::V4 => libc::AF_INET,
            IpFamily::V6 => libc::AF_INET6,
        };
        let fd = libc::socket(domain, libc::SOCK_STREAM, 0);
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let linger = libc::linger {
            l_onoff: 1,
            l_linger: 1,
        };
        if libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_LINGER,
            &linger as *const _ as *const c_void,
            mem::size_of_val(&linger) as socklen_t,
        ) < 0
        {
            return Err(close_on_error(fd));
        }

        let enable: c_int = 1;
        if libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &enable as *const _ as *const c_void,
            mem::size_of_val(&enable) as socklen_t,
        ) < 0
        {
            return Err(close_on_error(fd));
        }

        match family {
            IpFamily::V4 => {
                let addr = libc::sockaddr_in {
                    sin_family: libc::AF_INET as libc::sa_family_t,
                    sin_port: port.to_be(),
                    sin_addr: libc::in_addr {
                        s_addr: libc::INADDR_ANY.to_be(),
                    },
                    sin_zero: [0; 8],
                };
                if libc::bind(
                    fd,
                    &addr as *const _ as *const libc::sockaddr,
                    mem::size_of_val(&addr) as socklen_t,
                ) < 0
                {
                    return Err(close_on_error(fd));
                }
            }
            IpFamily::V6 => {
                let addr = libc::sockaddr_in6 {
                    sin6_family: libc::AF_INET6 as libc::sa_family_t,
                    sin6_port: port.to_be(),
                    sin6_flowinfo: 0,
                    sin6_addr: libc::in6_addr { s6_addr: [0; 16] },
                    sin6_scope_id: 0,
                };
                if libc::bind(
                    fd,
                    &addr as *const _ as *const libc::sockaddr,
                    mem::size_of_val(&addr) as socklen_t,
                ) < 0
                {
                    return Err(close_on_error(fd));
                }
            }
        }

        if libc::listen(fd, libc::SOMAXCONN) < 0 {
            return Err(close_on_error(fd));
        }
        if let Err(err) = set_nonblocking(fd) {
            libc::close(fd);
            return Err(err);
        }

        Ok(fd)
    }
}

unsafe fn close_on_error(fd: RawFd) -> io::Error {
    let err = io::Error::last_os_error();
    libc::close(fd);
    err
}

/// Accept one pending connection as a non-blocking socket. `Ok(None)` means
/// the accept queue is drained.
pub fn accept_connection(listen_fd: RawFd) -> io::Result<Option<(RawFd, SocketAddr)>> {
    unsafe {
        let mut storage: libc::sockaddr_storage = mem::zeroed();
        let mut len = mem::size_of::<libc::sockaddr_storage>() as socklen_t;
        let fd = libc::accept4(
            listen_fd,
            &mut storage as *mut _ as *mut libc::sockaddr,
            &mut len,
            libc::SOCK_NONBLOCK,
        );

        if fd < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(None);
            }
            return Err(err);
        }
        Ok(Some((fd, socket_addr_from_raw(&storage))))
    }
}

fn socket_addr_from_raw(storage: &libc::sockaddr_storage) -> SocketAddr {
    match storage.ss_family as c_int {
        libc::AF_INET => {
            let addr = unsafe { &*(storage as *const _ as *const libc::sockaddr_in) };
            SocketAddr::new(
                IpAddr::V4(Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr))),
                u16::from_be(addr.sin_port),
            )
        }
        libc::AF_INET6 => {
            let addr = unsafe { &*(storage as *const _ as *const libc::sockaddr_in6) };
            SocketAddr::new(
                IpAddr::V6(Ipv6Addr::from(addr.sin6_addr.s6_addr)),
                u16::from_be(addr.sin6_port),
            )
        }
        _ => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
    }
}

pub fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL, 0);
        if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

pub fn close_fd(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}

/// The bare `strerror` text for an OS error, e.g. `No such file or
/// directory`, suitable for quoting on an error page.
pub fn os_error_string(err: &io::Error) -> String {
    let Some(code) = err.raw_os_error() else {
        return err.to_string();
    };

    let mut buf = [0 as libc::c_char; 256];
    unsafe {
        if libc::strerror_r(code, buf.as_mut_ptr(), buf.len()) != 0 {
            return err.to_string();
        }
        CStr::from_ptr(buf.as_ptr()).to_string_lossy().into_owned()
    }
}
