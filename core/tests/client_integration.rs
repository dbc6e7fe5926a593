/*
 * client_integration.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * Integration tests for the HTTP/1.1 client engine against local scripted
 * servers: body framing, keep-alive pooling, redirects, decompression,
 * and retry behavior. Everything runs offline on loopback listeners.
 *
 * Run with:
 *   cargo test -p zhttp_core --test client_integration
 */

use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use zhttp_core::error::HttpError;
use zhttp_core::protocol::http::request::{Method, Request};
use zhttp_core::protocol::http::response::Version;
use zhttp_core::{Client, ClientConfig, RedirectPolicy};

/// Read one request head (through the blank line) and however much body the
/// Content-Length announces.
async fn read_request(stream: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0, "client closed before request complete");
        data.extend_from_slice(&buf[..n]);
        if let Some(head_end) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&data[..head_end + 4]).into_owned();
            let content_length = head
                .lines()
                .find(|l| l.to_ascii_lowercase().starts_with("content-length:"))
                .and_then(|l| l.split(':').nth(1))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            let body_have = data.len() - (head_end + 4);
            if body_have >= content_length {
                let body = &data[head_end + 4..head_end + 4 + content_length];
                return format!("{}{}", head, String::from_utf8_lossy(body));
            }
        }
    }
}

/// One-shot server: accept a single connection, run the script, shut down.
async fn serve_once<F, Fut>(script: F) -> String
where
    F: FnOnce(TcpStream) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        script(stream).await;
    });
    format!("http://{}", addr)
}

fn quick_client() -> Client {
    let mut config = ClientConfig::default();
    config.connect_timeout = Duration::from_secs(5);
    config.read_timeout = Duration::from_secs(5);
    config.write_timeout = Duration::from_secs(5);
    config.retry.max_retries = 0;
    Client::with_config(config)
}

#[tokio::test]
async fn get_with_content_length_body() {
    let base = serve_once(|mut stream| async move {
        let request = read_request(&mut stream).await;
        assert!(request.starts_with("GET /hello HTTP/1.1\r\n"));
        assert!(request.contains("User-Agent: zhttp/0.1.0\r\n"));
        assert!(request.contains("Accept-Encoding: gzip, deflate\r\n"));
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 13\r\n\r\nHello, World!")
            .await
            .unwrap();
    })
    .await;

    let client = quick_client();
    let response = client.get(&format!("{}/hello", base)).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.version, Version::Http11);
    assert_eq!(response.reason, "OK");
    assert_eq!(response.header("content-type"), Some("text/plain"));
    assert_eq!(response.text().unwrap(), "Hello, World!");
}

#[tokio::test]
async fn chunked_response_is_reassembled() {
    let base = serve_once(|mut stream| async move {
        let _ = read_request(&mut stream).await;
        stream
            .write_all(
                b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
                  5\r\nHello\r\n7\r\n, World\r\n1\r\n!\r\n0\r\n\r\n",
            )
            .await
            .unwrap();
    })
    .await;

    let client = quick_client();
    let response = client.get(&base).await.unwrap();
    assert_eq!(response.text().unwrap(), "Hello, World!");
}

#[tokio::test]
async fn close_delimited_body_read_to_eof() {
    let base = serve_once(|mut stream| async move {
        let _ = read_request(&mut stream).await;
        stream
            .write_all(b"HTTP/1.0 200 OK\r\n\r\nstreamed until close")
            .await
            .unwrap();
        stream.shutdown().await.unwrap();
    })
    .await;

    let client = quick_client();
    let response = client.get(&base).await.unwrap();
    assert_eq!(response.version, Version::Http10);
    assert_eq!(response.text().unwrap(), "streamed until close");
}

#[tokio::test]
async fn keep_alive_reuses_one_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let server_connections = connections.clone();
    tokio::spawn(async move {
        loop {
            let (mut stream, _) = listener.accept().await.unwrap();
            server_connections.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                for _ in 0..3 {
                    let _ = read_request(&mut stream).await;
                    stream
                        .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
                        .await
                        .unwrap();
                }
            });
        }
    });

    let client = quick_client();
    let url = format!("http://{}/", addr);
    for _ in 0..3 {
        let response = client.get(&url).await.unwrap();
        assert_eq!(response.status, 200);
    }
    assert_eq!(connections.load(Ordering::SeqCst), 1, "expected one pooled connection");
    let stats = client.pool_stats();
    assert_eq!(stats.idle, 1);
    assert_eq!(stats.active, 0);
}

#[tokio::test]
async fn connection_close_header_prevents_reuse() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let server_connections = connections.clone();
    tokio::spawn(async move {
        loop {
            let (mut stream, _) = listener.accept().await.unwrap();
            server_connections.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let _ = read_request(&mut stream).await;
                stream
                    .write_all(b"HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 2\r\n\r\nok")
                    .await
                    .unwrap();
                stream.shutdown().await.unwrap();
            });
        }
    });

    let client = quick_client();
    let url = format!("http://{}/", addr);
    for _ in 0..2 {
        let response = client.get(&url).await.unwrap();
        assert_eq!(response.status, 200);
    }
    assert_eq!(connections.load(Ordering::SeqCst), 2);
    assert_eq!(client.pool_stats().idle, 0);
}

#[tokio::test]
async fn post_redirect_downgrades_and_strips_sensitive_headers() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        // First connection: 302 to /after.
        let (mut stream, _) = listener.accept().await.unwrap();
        let first = read_request(&mut stream).await;
        assert!(first.starts_with("POST /form HTTP/1.1\r\n"));
        assert!(first.contains("Authorization: Bearer sekrit\r\n"));
        assert!(first.ends_with("payload=1"));
        stream
            .write_all(b"HTTP/1.1 302 Found\r\nLocation: /after\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();

        // The redirected request arrives on the pooled connection.
        let second = read_request(&mut stream).await;
        assert!(second.starts_with("GET /after HTTP/1.1\r\n"));
        assert!(!second.to_ascii_lowercase().contains("authorization"));
        assert!(!second.to_ascii_lowercase().contains("cookie"));
        assert!(!second.contains("payload=1"));
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\ndone")
            .await
            .unwrap();
    });

    let client = quick_client();
    let request = Request::builder(Method::Post, format!("http://{}/form", addr))
        .header("Authorization", "Bearer sekrit")
        .header("Cookie", "session=1")
        .body(b"payload=1".to_vec())
        .build()
        .unwrap();
    let response = client.send(request).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.text().unwrap(), "done");
}

#[tokio::test]
async fn policy_safe_returns_redirect_for_post() {
    let base = serve_once(|mut stream| async move {
        let _ = read_request(&mut stream).await;
        stream
            .write_all(b"HTTP/1.1 302 Found\r\nLocation: /elsewhere\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
    })
    .await;

    let mut config = ClientConfig::default();
    config.redirect_policy = RedirectPolicy::Safe;
    config.retry.max_retries = 0;
    let client = Client::with_config(config);
    let response = client.post(&format!("{}/form", base), b"data".to_vec()).await.unwrap();
    assert_eq!(response.status, 302);
    assert_eq!(response.header("location"), Some("/elsewhere"));
}

#[tokio::test]
async fn redirect_307_preserves_method_and_body() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let first = read_request(&mut stream).await;
        assert!(first.starts_with("POST /a HTTP/1.1\r\n"));
        stream
            .write_all(b"HTTP/1.1 307 Temporary Redirect\r\nLocation: /b\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
        let second = read_request(&mut stream).await;
        assert!(second.starts_with("POST /b HTTP/1.1\r\n"));
        assert!(second.ends_with("again"));
        stream
            .write_all(b"HTTP/1.1 201 Created\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
    });

    let client = quick_client();
    let response = client
        .post(&format!("http://{}/a", addr), b"again".to_vec())
        .await
        .unwrap();
    assert_eq!(response.status, 201);
}

#[tokio::test]
async fn too_many_redirects_detected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut n = 0u32;
        loop {
            let (mut stream, _) = listener.accept().await.unwrap();
            loop {
                let _ = read_request(&mut stream).await;
                n += 1;
                let location = format!("/hop/{}", n);
                let head = format!(
                    "HTTP/1.1 302 Found\r\nLocation: {}\r\nContent-Length: 0\r\n\r\n",
                    location
                );
                if stream.write_all(head.as_bytes()).await.is_err() {
                    break;
                }
            }
        }
    });

    let mut config = ClientConfig::default();
    config.max_redirects = 3;
    config.retry.max_retries = 0;
    let client = Client::with_config(config);
    let err = client.get(&format!("http://{}/start", addr)).await.unwrap_err();
    assert!(matches!(err.root(), HttpError::TooManyRedirects));
}

#[tokio::test]
async fn gzip_body_transparently_decoded() {
    use flate2::read::GzEncoder;
    use flate2::Compression;

    let mut packed = Vec::new();
    GzEncoder::new(&b"compressed payload"[..], Compression::default())
        .read_to_end(&mut packed)
        .unwrap();
    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\nContent-Length: {}\r\n\r\n",
        packed.len()
    );
    let mut wire = head.into_bytes();
    wire.extend_from_slice(&packed);

    let base = serve_once(move |mut stream| async move {
        let _ = read_request(&mut stream).await;
        stream.write_all(&wire).await.unwrap();
    })
    .await;

    let client = quick_client();
    let response = client.get(&base).await.unwrap();
    assert_eq!(response.text().unwrap(), "compressed payload");
    assert_eq!(response.header("content-encoding"), None);
}

#[tokio::test]
async fn auto_decompress_disabled_leaves_body_encoded() {
    use flate2::read::GzEncoder;
    use flate2::Compression;

    let mut packed = Vec::new();
    GzEncoder::new(&b"raw bytes"[..], Compression::default())
        .read_to_end(&mut packed)
        .unwrap();
    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\nContent-Length: {}\r\n\r\n",
        packed.len()
    );
    let mut wire = head.into_bytes();
    let expected = packed.clone();
    wire.extend_from_slice(&packed);

    let base = serve_once(move |mut stream| async move {
        let _ = read_request(&mut stream).await;
        stream.write_all(&wire).await.unwrap();
    })
    .await;

    let mut config = ClientConfig::default();
    config.auto_decompress = false;
    config.retry.max_retries = 0;
    let client = Client::with_config(config);
    let response = client.get(&base).await.unwrap();
    assert_eq!(response.header("content-encoding"), Some("gzip"));
    assert_eq!(&response.body[..], &expected[..]);
}

#[tokio::test]
async fn head_response_has_no_body() {
    let base = serve_once(|mut stream| async move {
        let request = read_request(&mut stream).await;
        assert!(request.starts_with("HEAD / HTTP/1.1\r\n"));
        // Content-Length describes what GET would return; no body follows.
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 5000\r\n\r\n")
            .await
            .unwrap();
    })
    .await;

    let client = quick_client();
    let response = client.head(&base).await.unwrap();
    assert_eq!(response.status, 200);
    assert!(response.body.is_empty());
    assert_eq!(response.content_length(), Some(5000));
}

#[tokio::test]
async fn body_size_limit_enforced() {
    let base = serve_once(|mut stream| async move {
        let _ = read_request(&mut stream).await;
        let body = vec![b'x'; 2048];
        let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", body.len());
        stream.write_all(head.as_bytes()).await.unwrap();
        stream.write_all(&body).await.unwrap();
    })
    .await;

    let mut config = ClientConfig::default();
    config.max_body_size = 1024;
    config.retry.max_retries = 0;
    let client = Client::with_config(config);
    let err = client.get(&base).await.unwrap_err();
    assert!(matches!(err.root(), HttpError::BodyTooLarge));
}

#[tokio::test]
async fn connection_refused_surfaces_and_retries_stop() {
    // Bind then drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut config = ClientConfig::default();
    config.retry.max_retries = 2;
    config.retry.backoff_initial = Duration::from_millis(5);
    let client = Client::with_config(config);
    let err = client.get(&format!("http://{}/", addr)).await.unwrap_err();
    assert!(matches!(err.root(), HttpError::ConnectionRefused));
}

#[tokio::test]
async fn retry_succeeds_after_connection_reset() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let attempts = Arc::new(AtomicUsize::new(0));
    let server_attempts = attempts.clone();
    tokio::spawn(async move {
        loop {
            let (mut stream, _) = listener.accept().await.unwrap();
            let n = server_attempts.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                // Kill the first exchange mid-request.
                drop(stream);
                continue;
            }
            tokio::spawn(async move {
                let _ = read_request(&mut stream).await;
                stream
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
                    .await
                    .unwrap();
            });
        }
    });

    let mut config = ClientConfig::default();
    config.retry.max_retries = 3;
    config.retry.backoff_initial = Duration::from_millis(5);
    let client = Client::with_config(config);
    let response = client.get(&format!("http://{}/", addr)).await.unwrap();
    assert_eq!(response.status, 200);
    assert!(attempts.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn read_timeout_reported() {
    let base = serve_once(|mut stream| async move {
        let _ = read_request(&mut stream).await;
        // Never answer.
        tokio::time::sleep(Duration::from_secs(30)).await;
    })
    .await;

    let mut config = ClientConfig::default();
    config.read_timeout = Duration::from_millis(100);
    config.retry.max_retries = 0;
    let client = Client::with_config(config);
    let err = client.get(&base).await.unwrap_err();
    assert!(matches!(err.root(), HttpError::ReadTimeout));
}

#[tokio::test]
async fn per_request_timeout_caps_total() {
    let base = serve_once(|mut stream| async move {
        let _ = read_request(&mut stream).await;
        tokio::time::sleep(Duration::from_secs(30)).await;
    })
    .await;

    let client = quick_client();
    let request = Request::builder(Method::Get, base)
        .timeout(Duration::from_millis(100))
        .build()
        .unwrap();
    let err = client.send(request).await.unwrap_err();
    assert!(err.is_timeout());
}

#[tokio::test]
async fn download_writes_body_to_file() {
    let base = serve_once(|mut stream| async move {
        let _ = read_request(&mut stream).await;
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 8\r\n\r\nfilebody")
            .await
            .unwrap();
    })
    .await;

    let dir = std::env::temp_dir().join(format!("zhttp-test-{}", std::process::id()));
    tokio::fs::create_dir_all(&dir).await.unwrap();
    let path = dir.join("download.bin");

    let client = quick_client();
    let len = client.download(&base, &path).await.unwrap();
    assert_eq!(len, 8);
    assert_eq!(tokio::fs::read(&path).await.unwrap(), b"filebody");
    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn multipart_request_carries_boundary() {
    use zhttp_core::protocol::http::request::MultipartBuilder;

    let base = serve_once(|mut stream| async move {
        let request = read_request(&mut stream).await;
        assert!(request.contains("Content-Type: multipart/form-data; boundary="));
        assert!(request.contains("name=\"field\""));
        assert!(request.contains("value-1"));
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
    })
    .await;

    let client = quick_client();
    let request = Request::builder(Method::Post, base)
        .multipart(MultipartBuilder::new().text("field", "value-1"))
        .build()
        .unwrap();
    let response = client.send(request).await.unwrap();
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn streamed_reader_body_sent_chunked() {
    let base = serve_once(|mut stream| async move {
        // Head arrives first; read until the terminating chunk.
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            data.extend_from_slice(&buf[..n]);
            if data.windows(5).any(|w| w == b"0\r\n\r\n") {
                break;
            }
        }
        let text = String::from_utf8_lossy(&data);
        assert!(text.contains("Transfer-Encoding: chunked\r\n"));
        assert!(text.contains("streamed-data"));
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
    })
    .await;

    let client = quick_client();
    let reader: Box<dyn tokio::io::AsyncRead + Send + Unpin> = Box::new(&b"streamed-data"[..]);
    let request = Request::builder(Method::Post, base)
        .body_reader(reader)
        .build()
        .unwrap();
    let response = client.send(request).await.unwrap();
    assert_eq!(response.status, 200);
}
