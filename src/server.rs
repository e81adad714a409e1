// src/server.rs
use std::collections::HashMap;
use std::net::SocketAddr;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crate::conn::Connection;
use crate::epoll::{
    Epoller, EVENT_EDGE, EVENT_ERR, EVENT_HUP, EVENT_IN, EVENT_ONESHOT, EVENT_OUT, EVENT_RDHUP,
};
use crate::error::{Error, Result};
use crate::pool::ThreadPool;
use crate::sys::{self, IpFamily};
use crate::timer::HeapTimer;

/// The listener is edge-triggered; clients additionally one-shot, so at most
/// one worker handles a given connection until its interest is re-armed.
const LISTEN_EVENTS: u32 = EVENT_RDHUP | EVENT_EDGE;
const CONNECT_EVENTS: u32 = EVENT_ONESHOT | EVENT_RDHUP | EVENT_EDGE;

/// Upper bound on a single demultiplexer wait, so the closed flag and
/// freshly zeroed timers are observed promptly.
const MAX_WAIT: Duration = Duration::from_millis(500);

const EVENT_CAPACITY: usize = 1024;

const DEFAULT_PORT: u16 = 10000;
const DEFAULT_ALIVE_TIME: Duration = Duration::from_secs(60);

/// State shared between the reactor thread, the workers, and timer
/// callbacks.
///
/// Lock order: only the reactor thread ever holds the timer and client locks
/// together (timer first, inside eviction callbacks). Workers take one lock
/// at a time, with the connection mutex outermost.
struct Shared {
    alive_time: Duration,
    epoller: Epoller,
    timer: Mutex<HeapTimer<RawFd>>,
    clients: Mutex<HashMap<RawFd, Arc<Mutex<Connection>>>>,
    closed: AtomicBool,
}

impl Shared {
    /// Extend a client's alive time. Returns `false` when the client is
    /// already gone.
    fn extend_alive_time(&self, socket: RawFd) -> bool {
        let mut timer = self.timer.lock().unwrap();
        timer.adjust(&socket, self.alive_time).is_ok()
    }

    /// Zero a client's timer so the next reactor iteration evicts it.
    /// Keeping the eviction on the reactor thread means clients are added
    /// and removed on a single thread only.
    fn mark_for_close(&self, socket: RawFd) {
        let mut timer = self.timer.lock().unwrap();
        let _ = timer.adjust_at(&socket, std::time::Instant::now());
    }

    /// Remove a client from the demultiplexer and the connection table. The
    /// timer node has already been removed by the eviction tick.
    fn close_client(&self, socket: RawFd) {
        if let Err(err) = self.epoller.delete(socket) {
            tracing::debug!("failed to delete socket {socket} from epoller: {err}");
        }
        self.clients.lock().unwrap().remove(&socket);
    }

    fn rearm(&self, socket: RawFd, interest: u32) {
        if let Err(err) = self.epoller.modify(socket, CONNECT_EVENTS | interest) {
            tracing::error!("failed to re-arm socket {socket}: {err}");
            self.mark_for_close(socket);
        }
    }

    /// Worker task for a readable client: receive, process, and re-arm for
    /// reading or writing depending on whether a response became ready.
    fn handle_receive(&self, conn: Arc<Mutex<Connection>>, socket: RawFd) {
        let mut conn = conn.lock().unwrap();
        tracing::debug!("receiving data from client {}", conn.addr());
        match conn.receive() {
            Ok(_) => {
                let interest = if conn.process() { EVENT_OUT } else { EVENT_IN };
                self.rearm(socket, interest);
            }
            Err(err) => {
                tracing::error!("failed to receive data from client {}: {err}", conn.addr());
                self.mark_for_close(socket);
            }
        }
    }

    /// Worker task for a writable client: send, and on completion either
    /// process the next pipelined request (keep-alive) or schedule close.
    fn handle_send(&self, conn: Arc<Mutex<Connection>>, socket: RawFd) {
        let mut conn = conn.lock().unwrap();
        tracing::debug!("sending data to client {}", conn.addr());
        match conn.send() {
            Ok(true) => {
                if conn.keep_alive() {
                    let interest = if conn.process() { EVENT_OUT } else { EVENT_IN };
                    self.rearm(socket, interest);
                } else {
                    self.mark_for_close(socket);
                }
            }
            // The socket buffer filled up; resume when writable again.
            Ok(false) => self.rearm(socket, EVENT_OUT),
            Err(err) => {
                tracing::error!("failed to send data to client {}: {err}", conn.addr());
                self.mark_for_close(socket);
            }
        }
    }
}

/// A handle for requesting shutdown from another thread, typically a signal
/// handler.
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<Shared>,
}

impl ServerHandle {
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }
}

/// The echo web server: one reactor thread dispatching readiness events to a
/// pool of workers.
pub struct WebServer {
    port: u16,
    family: IpFamily,
    shared: Arc<Shared>,
    pool: ThreadPool,
}

/// Builder for [`WebServer`].
pub struct WebServerBuilder {
    port: u16,
    family: IpFamily,
    alive_time: Duration,
    workers: Option<usize>,
}

impl WebServerBuilder {
    pub fn new() -> Self {
        Self {
            port: DEFAULT_PORT,
            family: IpFamily::V4,
            alive_time: DEFAULT_ALIVE_TIME,
            workers: None,
        }
    }

    /// The listening port. Ports below 1024 are rejected at build time.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn family(mut self, family: IpFamily) -> Self {
        self.family = family;
        self
    }

    /// How long a client may stay idle before it is disconnected. The timer
    /// is refreshed whenever the client sends or receives data.
    pub fn alive_time(mut self, alive_time: Duration) -> Self {
        self.alive_time = alive_time;
        self
    }

    /// Worker thread count; `None` or zero means hardware concurrency.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn build(self) -> Result<WebServer> {
        if self.port < 1024 {
            return Err(Error::ReservedPort(self.port));
        }

        Ok(WebServer {
            port: self.port,
            family: self.family,
            shared: Arc::new(Shared {
                alive_time: self.alive_time,
                epoller: Epoller::new(EVENT_CAPACITY)?,
                timer: Mutex::new(HeapTimer::new()),
                clients: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
            pool: ThreadPool::new(self.workers),
        })
    }
}

impl Default for WebServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WebServer {
    pub fn builder() -> WebServerBuilder {
        WebServerBuilder::new()
    }

    /// A cloneable handle for requesting shutdown.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Request shutdown; the running reactor notices within one wait.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }

    /// Run the accept/dispatch loop until the server is closed.
    pub fn run(&mut self) -> Result<()> {
        self.pool.start()?;
        let listener = sys::create_listen_socket(self.family, self.port)?;
        self.shared.epoller.add(listener, LISTEN_EVENTS | EVENT_IN)?;
        tracing::info!("server listening on port {}", self.port);

        while !self.shared.closed.load(Ordering::Acquire) {
            // Evict idle clients and learn how long until the next expiry.
            let until_next = self.shared.timer.lock().unwrap().to_next_tick();
            let wait = if until_next.is_zero() {
                MAX_WAIT
            } else {
                until_next.min(MAX_WAIT)
            };

            let ready = match self.shared.epoller.wait(Some(wait)) {
                Ok(ready) => ready,
                Err(err) => {
                    tracing::error!("failed to wait for events: {err}");
                    continue;
                }
            };

            for i in 0..ready {
                let socket = self.shared.epoller.fd(i);
                let events = self.shared.epoller.events(i);
                if socket == listener {
                    self.on_listen_event(listener);
                } else if events & (EVENT_RDHUP | EVENT_HUP | EVENT_ERR) != 0 {
                    self.shared.mark_for_close(socket);
                } else if events & EVENT_IN != 0 {
                    self.on_receive_event(socket);
                } else if events & EVENT_OUT != 0 {
                    self.on_send_event(socket);
                } else {
                    tracing::error!("unexpected events {events:#x} on socket {socket}");
                }
            }
        }

        self.shutdown(listener);
        Ok(())
    }

    /// Accept every pending client until the listener would block.
    fn on_listen_event(&self, listener: RawFd) {
        loop {
            match sys::accept_connection(listener) {
                Ok(Some((socket, addr))) => self.add_client(socket, addr),
                Ok(None) => break,
                Err(err) => {
                    tracing::error!("failed to accept a new client: {err}");
                    break;
                }
            }
        }
    }

    fn add_client(&self, socket: RawFd, addr: SocketAddr) {
        if let Err(err) = self.shared.epoller.add(socket, CONNECT_EVENTS | EVENT_IN) {
            tracing::error!("failed to register client {addr}: {err}");
            sys::close_fd(socket);
            return;
        }

        let conn = Arc::new(Mutex::new(Connection::new(socket, addr)));
        self.shared.clients.lock().unwrap().insert(socket, conn);

        // The eviction callback runs on the reactor thread under the timer
        // lock; it must not lock the timer again. A weak reference avoids a
        // cycle through the timer the shared state owns.
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        self.shared
            .timer
            .lock()
            .unwrap()
            .push(socket, self.shared.alive_time, move |key| {
                if let Some(shared) = weak.upgrade() {
                    shared.close_client(key);
                    tracing::info!("client {addr} has disconnected");
                }
            });

        tracing::info!("a new client {addr} has connected");
        tracing::debug!("client {addr} is bound to socket {socket}");
    }

    fn on_receive_event(&self, socket: RawFd) {
        if !self.shared.extend_alive_time(socket) {
            return;
        }
        let Some(conn) = self.shared.clients.lock().unwrap().get(&socket).cloned() else {
            return;
        };
        let shared = Arc::clone(&self.shared);
        self.pool
            .push(move || shared.handle_receive(conn, socket));
    }

    fn on_send_event(&self, socket: RawFd) {
        if !self.shared.extend_alive_time(socket) {
            return;
        }
        let Some(conn) = self.shared.clients.lock().unwrap().get(&socket).cloned() else {
            return;
        };
        let shared = Arc::clone(&self.shared);
        self.pool.push(move || shared.handle_send(conn, socket));
    }

    fn shutdown(&mut self, listener: RawFd) {
        self.shared.epoller.delete(listener).ok();
        sys::close_fd(listener);

        self.pool.close();
        self.shared.timer.lock().unwrap().clear();
        self.shared.clients.lock().unwrap().clear();
        tracing::info!("server closed");
    }
}
