/*
 * server_client.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * Integration tests for the server and client engines: full exchanges over
 * localhost sockets, covering framing decisions, interim responses, form
 * data, redirects, the worker pool, and timeout behavior.
 */

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use canter::body::Body;
use canter::mime::MimeType;
use canter::request::{Request, RequestFile};
use canter::response::Response;
use canter::server::Server;
use canter::uri::Uri;
use canter::{Client, Error};

fn echo_server() -> Server {
    Server::new(
        "127.0.0.1:0".parse().unwrap(),
        |req: &mut Request, resp: &mut Response| -> canter::Result<()> {
            if resp.status.code != 200 {
                return Ok(()); // surface the suggested status as-is
            }
            let text = format!("{} {}", req.method, req.uri.request_target());
            resp.body = Body::from_text(MimeType::text_plain(), text);
            Ok(())
        },
    )
}

fn read_until_close(sock: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    sock.read_to_end(&mut out).unwrap();
    out
}

fn status_line(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    text.lines().next().unwrap_or("").to_string()
}

#[test]
fn plain_get_over_raw_socket() {
    let server = echo_server();
    server.start().unwrap();
    let addr = server.listen_address();

    let mut sock = TcpStream::connect(addr).unwrap();
    sock.write_all(b"GET /ping HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
    let raw = read_until_close(&mut sock);

    assert_eq!(status_line(&raw), "HTTP/1.1 200 OK");
    let text = String::from_utf8_lossy(&raw);
    assert!(text.contains("Connection: close"));
    assert!(text.ends_with("GET /ping"));
    server.stop().unwrap();
}

#[test]
fn missing_length_yields_411() {
    let server = echo_server();
    server.start().unwrap();
    let addr = server.listen_address();

    let mut sock = TcpStream::connect(addr).unwrap();
    // body bytes present but no Content-Length, in one segment
    sock.write_all(b"POST /u HTTP/1.1\r\nHost: x\r\n\r\nabc").unwrap();
    let raw = read_until_close(&mut sock);

    assert_eq!(status_line(&raw), "HTTP/1.1 411 Length Required");
    server.stop().unwrap();
}

#[test]
fn malformed_request_line_yields_400() {
    let server = echo_server();
    server.start().unwrap();
    let addr = server.listen_address();

    let mut sock = TcpStream::connect(addr).unwrap();
    sock.write_all(b"GET_NO_URI HTTP/1.1\r\n\r\n").unwrap();
    let raw = read_until_close(&mut sock);

    assert_eq!(status_line(&raw), "HTTP/1.1 400 Bad Request");
    server.stop().unwrap();
}

#[test]
fn oversized_request_yields_413() {
    let server = echo_server();
    server.set_max_request_size(Some(64));
    server.start().unwrap();
    let addr = server.listen_address();

    let mut sock = TcpStream::connect(addr).unwrap();
    let long_value = "v".repeat(256);
    let message = format!("GET / HTTP/1.1\r\nHost: x\r\nX-Pad: {}\r\n\r\n", long_value);
    sock.write_all(message.as_bytes()).unwrap();
    let raw = read_until_close(&mut sock);

    assert_eq!(status_line(&raw), "HTTP/1.1 413 Payload Too Large");
    server.stop().unwrap();
}

#[test]
fn expectation_without_continue_yields_417() {
    let server = echo_server();
    server.start().unwrap();
    let addr = server.listen_address();

    let mut sock = TcpStream::connect(addr).unwrap();
    sock.write_all(b"POST /u HTTP/1.1\r\nHost: x\r\nExpect: something-else\r\n\r\n")
        .unwrap();
    let raw = read_until_close(&mut sock);

    assert_eq!(status_line(&raw), "HTTP/1.1 417 Expectation Failed");
    server.stop().unwrap();
}

#[test]
fn expect_continue_interim_then_body() {
    let server = Server::new(
        "127.0.0.1:0".parse().unwrap(),
        |req: &mut Request, resp: &mut Response| -> canter::Result<()> {
            let body = req.body.read_all()?;
            resp.body = Body::from_bytes(MimeType::text_plain(), body);
            Ok(())
        },
    );
    server.start().unwrap();
    let addr = server.listen_address();

    let mut sock = TcpStream::connect(addr).unwrap();
    sock.write_all(
        b"POST /u HTTP/1.1\r\nHost: x\r\nContent-Length: 3\r\nExpect: 100-continue\r\n\r\n",
    )
    .unwrap();

    // the interim response arrives before any body byte is sent
    let interim = b"HTTP/1.1 100 Continue\r\n\r\n";
    let mut got = vec![0u8; interim.len()];
    sock.read_exact(&mut got).unwrap();
    assert_eq!(&got, interim);

    sock.write_all(b"abc").unwrap();
    let raw = read_until_close(&mut sock);
    assert_eq!(status_line(&raw), "HTTP/1.1 200 OK");
    assert!(raw.ends_with(b"abc"));
    server.stop().unwrap();
}

#[test]
fn head_response_has_no_body() {
    let server = echo_server();
    server.start().unwrap();
    let addr = server.listen_address();

    let mut sock = TcpStream::connect(addr).unwrap();
    sock.write_all(b"HEAD /x HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
    let raw = read_until_close(&mut sock);
    let text = String::from_utf8_lossy(&raw);

    assert_eq!(status_line(&raw), "HTTP/1.1 200 OK");
    assert!(text.contains("Content-Length: 0"));
    assert!(text.ends_with("\r\n\r\n"));
    server.stop().unwrap();
}

#[test]
fn client_query_roundtrip() {
    let server = echo_server();
    server.start().unwrap();
    let addr = server.listen_address();

    let mut client = Client::new();
    client.set_timeout(Some(Duration::from_secs(5)));
    let uri = Uri::parse(&format!("http://{}/hello?x=1", addr)).unwrap();
    let mut request = Request::with_uri("GET", uri);
    let mut response = client.query(&mut request).unwrap();

    assert_eq!(response.status.code, 200);
    assert_eq!(response.status.message, "OK");
    let body = response.body.read_all().unwrap();
    assert_eq!(body, b"GET /hello?x=1");
    server.stop().unwrap();
}

#[test]
fn client_sends_default_user_agent_and_host() {
    let seen: Arc<Mutex<Option<(Option<String>, Option<String>)>>> =
        Arc::new(Mutex::new(None));
    let record = seen.clone();
    let server = Server::new(
        "127.0.0.1:0".parse().unwrap(),
        move |req: &mut Request, _resp: &mut Response| -> canter::Result<()> {
            *record.lock().unwrap() = Some((
                req.headers.get("Host").map(str::to_string),
                req.user_agent.clone(),
            ));
            Ok(())
        },
    );
    server.start().unwrap();
    let addr = server.listen_address();

    let mut client = Client::new();
    client.set_timeout(Some(Duration::from_secs(5)));
    let uri = Uri::parse(&format!("http://{}/", addr)).unwrap();
    let mut request = Request::with_uri("GET", uri);
    client.query(&mut request).unwrap();

    let (host, agent) = seen.lock().unwrap().take().unwrap();
    assert_eq!(host.unwrap(), addr.to_string());
    assert!(agent.unwrap().starts_with("canter/"));
    server.stop().unwrap();
}

#[test]
fn urlencoded_post_parses_on_server() {
    let server = Server::new(
        "127.0.0.1:0".parse().unwrap(),
        |req: &mut Request, resp: &mut Response| -> canter::Result<()> {
            req.parse_post()?;
            let text = format!(
                "a={} b={}",
                req.post.get("a").unwrap_or("?"),
                req.post.get("b").unwrap_or("?")
            );
            resp.body = Body::from_text(MimeType::text_plain(), text);
            Ok(())
        },
    );
    server.start().unwrap();
    let addr = server.listen_address();

    let mut client = Client::new();
    client.set_timeout(Some(Duration::from_secs(5)));
    let uri = Uri::parse(&format!("http://{}/submit", addr)).unwrap();
    let mut request = Request::with_uri("POST", uri);
    request.post.add("a", "1");
    request.post.add("b", "two words");
    let mut response = client.query(&mut request).unwrap();

    assert_eq!(response.body.read_all().unwrap(), b"a=1 b=two words");
    server.stop().unwrap();
}

#[test]
fn multipart_upload_roundtrip() {
    let server = Server::new(
        "127.0.0.1:0".parse().unwrap(),
        |req: &mut Request, resp: &mut Response| -> canter::Result<()> {
            req.parse_post()?;
            let file = req
                .file("g")
                .ok_or_else(|| Error::new("file part missing"))?;
            let text = format!(
                "f={} file={}:{}",
                req.post.get("f").unwrap_or("?"),
                file.filename,
                String::from_utf8_lossy(&file.contents),
            );
            resp.body = Body::from_text(MimeType::text_plain(), text);
            Ok(())
        },
    );
    server.start().unwrap();
    let addr = server.listen_address();

    let mut client = Client::new();
    client.set_timeout(Some(Duration::from_secs(5)));
    let uri = Uri::parse(&format!("http://{}/upload", addr)).unwrap();
    let mut request = Request::with_uri("POST", uri);
    request.post.add("f", "v");
    request.files.push((
        "g".to_string(),
        RequestFile {
            filename: "a.txt".to_string(),
            content_type: Some(MimeType::text_plain()),
            headers: Default::default(),
            contents: b"hi".to_vec(),
        },
    ));
    let mut response = client.query(&mut request).unwrap();

    assert_eq!(response.body.read_all().unwrap(), b"f=v file=a.txt:hi");
    server.stop().unwrap();
}

#[test]
fn redirects_followed_within_budget() {
    let server = Server::new(
        "127.0.0.1:0".parse().unwrap(),
        |req: &mut Request, resp: &mut Response| -> canter::Result<()> {
            if req.uri.request_target() == "/old" {
                resp.set_status(302);
                resp.headers.add("Location", "/new");
            } else {
                resp.body = Body::from_text(MimeType::text_plain(), "arrived");
            }
            Ok(())
        },
    );
    server.start().unwrap();
    let addr = server.listen_address();

    let mut client = Client::new();
    client.set_timeout(Some(Duration::from_secs(5)));
    client.set_max_redirects(1);
    let uri = Uri::parse(&format!("http://{}/old", addr)).unwrap();
    let mut request = Request::with_uri("GET", uri);
    let mut response = client.query(&mut request).unwrap();
    assert_eq!(response.status.code, 200);
    assert_eq!(response.body.read_all().unwrap(), b"arrived");

    // with no redirect budget the 3xx surfaces verbatim
    let mut client = Client::new();
    client.set_timeout(Some(Duration::from_secs(5)));
    let uri = Uri::parse(&format!("http://{}/old", addr)).unwrap();
    let mut request = Request::with_uri("GET", uri);
    let response = client.query(&mut request).unwrap();
    assert_eq!(response.status.code, 302);
    assert_eq!(response.headers.get("Location"), Some("/new"));
    server.stop().unwrap();
}

#[test]
fn handler_failure_becomes_500() {
    let server = Server::new(
        "127.0.0.1:0".parse().unwrap(),
        |_req: &mut Request, _resp: &mut Response| -> canter::Result<()> {
            Err(Error::new("deliberate failure"))
        },
    );
    server.start().unwrap();
    let addr = server.listen_address();

    let mut sock = TcpStream::connect(addr).unwrap();
    sock.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
    let raw = read_until_close(&mut sock);
    assert_eq!(status_line(&raw), "HTTP/1.1 500 Internal Server Error");
    server.stop().unwrap();
}

#[test]
fn handler_panic_becomes_500() {
    let server = Server::new(
        "127.0.0.1:0".parse().unwrap(),
        |_req: &mut Request, _resp: &mut Response| -> canter::Result<()> {
            panic!("handler exploded");
        },
    );
    server.start().unwrap();
    let addr = server.listen_address();

    let mut sock = TcpStream::connect(addr).unwrap();
    sock.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
    let raw = read_until_close(&mut sock);
    assert_eq!(status_line(&raw), "HTTP/1.1 500 Internal Server Error");
    server.stop().unwrap();
}

#[test]
fn pooled_server_completes_rapid_connections() {
    let handled = Arc::new(AtomicUsize::new(0));
    let counter = handled.clone();
    let server = Server::new(
        "127.0.0.1:0".parse().unwrap(),
        move |_req: &mut Request, resp: &mut Response| -> canter::Result<()> {
            thread::sleep(Duration::from_millis(30));
            counter.fetch_add(1, Ordering::SeqCst);
            resp.body = Body::from_text(MimeType::text_plain(), "ok");
            Ok(())
        },
    );
    server.set_pool_size(2).unwrap();
    server.start().unwrap();
    let addr = server.listen_address();

    let clients: Vec<_> = (0..5)
        .map(|_| {
            thread::spawn(move || {
                let mut client = Client::new();
                client.set_timeout(Some(Duration::from_secs(10)));
                let uri = Uri::parse(&format!("http://{}/", addr)).unwrap();
                let mut request = Request::with_uri("GET", uri);
                let mut response = client.query(&mut request).unwrap();
                assert_eq!(response.status.code, 200);
                assert_eq!(response.body.read_all().unwrap(), b"ok");
            })
        })
        .collect();
    for c in clients {
        c.join().unwrap();
    }

    server.wait().unwrap();
    assert_eq!(handled.load(Ordering::SeqCst), 5);

    // the pool admits connections again after wait
    let mut client = Client::new();
    client.set_timeout(Some(Duration::from_secs(10)));
    let uri = Uri::parse(&format!("http://{}/", addr)).unwrap();
    let mut request = Request::with_uri("GET", uri);
    let response = client.query(&mut request).unwrap();
    assert_eq!(response.status.code, 200);
    assert_eq!(handled.load(Ordering::SeqCst), 6);
    server.stop().unwrap();
}

#[test]
fn server_timeout_reaches_error_hook() {
    let errors: Arc<Mutex<Vec<bool>>> = Arc::new(Mutex::new(Vec::new()));
    let record = errors.clone();
    let server = echo_server();
    server.set_timeout(Some(Duration::from_millis(80)));
    server.set_error_hook(move |_conn, err| {
        record.lock().unwrap().push(err.is_timeout());
    });
    server.start().unwrap();
    let addr = server.listen_address();

    // connect and go silent; the server's read must hit its deadline
    let sock = TcpStream::connect(addr).unwrap();
    thread::sleep(Duration::from_millis(300));
    drop(sock);

    let seen = errors.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0], "error hook should have seen a timeout");
    server.stop().unwrap();
}

#[test]
fn response_roundtrip_through_sockets() {
    use canter::h1::ParseOptions;
    use canter::net::NetStream;
    use canter::{Connection, SetCookie};

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let writer = thread::spawn(move || {
        let (sock, _) = listener.accept().unwrap();
        let conn = Connection::new(NetStream::from_accepted(sock));
        let mut response = Response::with_status(201);
        response.headers.add("X-One", "alpha");
        response.headers.add("X-Two", "beta");
        response.headers.add("X-One", "gamma");
        response.add_cookie(SetCookie::new("id", "42").path("/"));
        response.body = Body::from_text(MimeType::text_plain(), "hello body");
        conn.send_response(&mut response).unwrap();
        conn.close(true);
    });

    let endpoints = [addr];
    let stream = NetStream::connect(&endpoints, Some(Duration::from_secs(5))).unwrap();
    let conn = Connection::new(stream);
    let mut parsed = Response::new();
    let code = conn.read_response(&mut parsed, &ParseOptions::default()).unwrap();
    writer.join().unwrap();

    assert_eq!(code, 201);
    assert_eq!(parsed.status.message, "Created");
    // original headers come back in order, with duplicates intact
    let ordered: Vec<_> = parsed
        .headers
        .iter()
        .filter(|(n, _)| n.starts_with("X-"))
        .collect();
    assert_eq!(
        ordered,
        vec![("X-One", "alpha"), ("X-Two", "beta"), ("X-One", "gamma")]
    );
    assert_eq!(parsed.cookies.len(), 1);
    assert_eq!(parsed.cookies[0].name, "id");
    assert_eq!(parsed.cookies[0].attribute("Path"), Some("/"));
    assert_eq!(parsed.headers.get("Content-Length"), Some("10"));
    let body = parsed.body.read_all().unwrap();
    assert_eq!(body, b"hello body");
    conn.close(true);
}

#[test]
fn async_client_completes_queries() {
    let server = echo_server();
    server.start().unwrap();
    let addr = server.listen_address();

    let mut client = Client::new();
    client.set_timeout(Some(Duration::from_secs(5)));
    let async_client = canter::AsyncClient::new(client);

    let results: Arc<Mutex<Vec<(u16, Vec<u8>)>>> = Arc::new(Mutex::new(Vec::new()));
    let failures: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    for i in 0..3 {
        let uri = Uri::parse(&format!("http://{}/async/{}", addr, i)).unwrap();
        let request = Request::with_uri("GET", uri);
        let results = results.clone();
        let failures = failures.clone();
        async_client.async_query(
            request,
            move |mut response| {
                let body = response.body.read_all().unwrap_or_default();
                results.lock().unwrap().push((response.status.code, body));
            },
            None,
            move |err| {
                failures.lock().unwrap().push(err.to_string());
            },
        );
    }

    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while async_client.pending() > 0 && std::time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    async_client.stop();

    assert!(failures.lock().unwrap().is_empty(), "{:?}", failures.lock().unwrap());
    let results = results.lock().unwrap();
    assert_eq!(results.len(), 3);
    for (code, body) in results.iter() {
        assert_eq!(*code, 200);
        assert!(body.starts_with(b"GET /async/"));
    }
    server.stop().unwrap();
}
