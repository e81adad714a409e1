//! Live-socket end-to-end tests: a real server on a loopback port driven by
//! a plain TCP client.

use std::fs;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use mazurka::{set_root_directory, ServerHandle, WebServer};

const INDEX_TEMPLATE: &str =
    "<html>\r\n<p><$user$> said: <$msg$></p>\r\n<p>hide=<$hide-msg$></p>\r\n</html>";

static ROOT: OnceLock<PathBuf> = OnceLock::new();

/// Every test in this binary shares one document root, because the root
/// directory is process-wide and set once.
fn ensure_root() {
    ROOT.get_or_init(|| {
        let dir = std::env::temp_dir().join(format!("mazurka-e2e-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("index.html"), INDEX_TEMPLATE).unwrap();
        assert!(set_root_directory(dir.clone()));
        dir
    });
}

fn start_server(port: u16) -> ServerHandle {
    ensure_root();
    let mut server = WebServer::builder()
        .port(port)
        .alive_time(Duration::from_secs(60))
        .workers(2)
        .build()
        .unwrap();
    let handle = server.handle();
    thread::spawn(move || server.run().unwrap());

    // Wait until the listener is up.
    for _ in 0..200 {
        if TcpStream::connect(("127.0.0.1", port)).is_ok() {
            return handle;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("server did not start listening on port {port}");
}

/// Send one request and read until the server closes the connection.
fn round_trip(port: u16, request: &str) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream.write_all(request.as_bytes()).unwrap();

    let mut data = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => data.extend_from_slice(&chunk[..n]),
            Err(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut =>
            {
                break
            }
            Err(err) => panic!("read failed: {err}"),
        }
    }
    String::from_utf8_lossy(&data).into_owned()
}

/// Read exactly one response off a (possibly reused) connection, using its
/// Content-length header to find the end of the body.
fn read_response(stream: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(head_end) = data
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .map(|pos| pos + 4)
        {
            let head = String::from_utf8_lossy(&data[..head_end]).into_owned();
            let length: usize = head
                .lines()
                .find_map(|line| line.strip_prefix("Content-length: "))
                .expect("response must carry Content-length")
                .parse()
                .unwrap();
            if data.len() >= head_end + length {
                return String::from_utf8_lossy(&data[..head_end + length]).into_owned();
            }
        }

        let read = stream.read(&mut chunk).unwrap();
        assert!(read > 0, "connection closed before the response finished");
        data.extend_from_slice(&chunk[..read]);
    }
}

#[test]
fn missing_file_produces_the_bad_request_page() {
    let port = 18731;
    let _handle = start_server(port);

    let reply = round_trip(port, "GET /non_existing HTTP/1.1\r\nHost: h\r\n\r\n");
    assert_eq!(
        reply,
        "HTTP/1.1 400 Bad Request\r\n\
         Connection: close\r\n\
         Content-type: text/html\r\n\
         Content-length: 114\r\n\
         \r\n\
         <html>\r\n\
         <title>ERROR</title>\r\n\
         <body>\r\n\
         <p>400 : Bad Request</p>\r\n\
         <p>No such file or directory</p>\r\n\
         </body>\r\n\
         </html>"
    );
}

#[test]
fn index_page_echoes_the_submitted_form() {
    let port = 18732;
    let _handle = start_server(port);

    let reply = round_trip(
        port,
        "POST /index.html HTTP/1.1\r\n\
         Host: h\r\n\
         Content-Type: application/x-www-form-urlencoded\r\n\
         Content-Length: 22\r\n\
         \r\n\
         user=mike&msg=hello%21",
    );

    assert!(reply.starts_with("HTTP/1.1 200 OK\r\nConnection: close\r\n"));
    assert!(reply.contains("Content-type: text/html\r\n"));
    assert!(reply.contains("mike said: hello!"));
    assert!(reply.contains("hide=false"));
}

#[test]
fn root_path_serves_the_index_without_an_echo() {
    let port = 18733;
    let _handle = start_server(port);

    let reply = round_trip(port, "GET / HTTP/1.1\r\nHost: h\r\n\r\n");
    assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"));
    // No form input: the placeholders stay and the echo block is hidden.
    assert!(reply.contains("hide=true"));
    assert!(reply.contains("<$user$>"));
}

#[test]
fn keep_alive_reuses_the_connection() {
    let port = 18734;
    let _handle = start_server(port);

    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

    stream
        .write_all(
            b"POST /index.html HTTP/1.1\r\n\
              Host: h\r\n\
              Connection: keep-alive\r\n\
              Content-Type: application/x-www-form-urlencoded\r\n\
              Content-Length: 22\r\n\
              \r\n\
              user=mike&msg=hello%21",
        )
        .unwrap();
    let first = read_response(&mut stream);
    assert!(first.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(first.contains("Connection: keep-alive\r\n"));
    assert!(first.contains("keep-alive: max=6, timeout=120\r\n"));
    assert!(first.contains("mike said: hello!"));

    // The same connection serves a second request.
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: h\r\n\r\n")
        .unwrap();
    let second = read_response(&mut stream);
    assert!(second.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(second.contains("Connection: close\r\n"));
    assert!(second.contains("hide=true"));
}

#[test]
fn malformed_request_is_answered_with_bad_request() {
    let port = 18735;
    let _handle = start_server(port);

    let reply = round_trip(
        port,
        "POST /x HTTP/1.1\r\n\
         Content-Type: application/x-www-form-urlencoded\r\n\
         Content-Length: 4\r\n\
         invalid body without an empty line",
    );
    assert!(reply.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert!(reply.contains("Connection: close\r\n"));
    assert!(reply.contains("empty line between HTTP headers"));
}
