#![allow(dead_code)]

use ristretto::{
    limits::{ConnLimits, ReqLimits, ServerLimits, WaitStrategy},
    Router, Server, ServerHandle,
};
use std::{net::SocketAddr, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
    time::timeout,
};
use tracing_subscriber::EnvFilter;

const WAIT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

pub fn server_limits() -> ServerLimits {
    ServerLimits {
        max_connections: 4,
        wait_strategy: WaitStrategy::Sleep(Duration::from_millis(1)),
        shutdown_timeout: Duration::from_secs(2),
        ..ServerLimits::default()
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub handle: ServerHandle,
    task: JoinHandle<ristretto::Result<()>>,
}

impl TestServer {
    pub async fn start(router: Router) -> Self {
        Self::start_with(router, server_limits(), ConnLimits::default(), ReqLimits::default()).await
    }

    pub async fn start_with(
        router: Router,
        server: ServerLimits,
        conn: ConnLimits,
        req: ReqLimits,
    ) -> Self {
        init_tracing();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Server::builder()
            .listener(listener)
            .router(router)
            .server_limits(server)
            .connection_limits(conn)
            .request_limits(req)
            .build();

        let handle = server.handle();
        let task = tokio::spawn(server.launch());

        Self { addr, handle, task }
    }

    pub async fn client(&self) -> Client {
        Client::connect(self.addr).await
    }

    /// Sends raw bytes on a fresh connection, half-closes it and collects
    /// everything the server writes until it closes.
    pub async fn raw(&self, request: &str) -> String {
        let mut stream = TcpStream::connect(self.addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        stream.shutdown().await.unwrap();

        let mut out = Vec::new();
        let mut chunk = [0; 4096];
        loop {
            match timeout(WAIT, stream.read(&mut chunk)).await {
                Ok(Ok(0)) | Ok(Err(_)) => break,
                Ok(Ok(n)) => out.extend_from_slice(&chunk[..n]),
                Err(_) => panic!("server did not close the connection"),
            }
        }

        String::from_utf8(out).unwrap()
    }

    pub async fn stop(self) {
        self.handle.shutdown();

        let result = timeout(WAIT, self.task).await;
        assert!(matches!(result, Ok(Ok(Ok(())))), "server did not stop cleanly");
    }
}

#[derive(Debug)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Reply {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> T {
        serde_json::from_str(&self.body).unwrap()
    }

    // `with_body` is false for HEAD, whose Content-Length describes a body that is not sent
    fn parse(buffer: &mut Vec<u8>, with_body: bool) -> Option<Reply> {
        let text = std::str::from_utf8(&buffer[..]).ok()?;
        let head_len = text.find("\r\n\r\n")? + 4;

        let mut lines = text[..head_len - 4].split("\r\n");
        let status = lines.next()?.split(' ').nth(1)?.parse().ok()?;
        let headers: Vec<(String, String)> = lines
            .filter_map(|line| line.split_once(": "))
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();

        let body_len = match with_body {
            true => headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, v)| v.parse().ok())
                .unwrap_or(0),
            false => 0,
        };
        if buffer.len() < head_len + body_len {
            return None;
        }

        let body = String::from_utf8(buffer[head_len..head_len + body_len].to_vec()).ok()?;
        buffer.drain(..head_len + body_len);

        Some(Reply {
            status,
            headers,
            body,
        })
    }
}

pub struct Client {
    stream: TcpStream,
    buffer: Vec<u8>,
}

impl Client {
    pub async fn connect(addr: SocketAddr) -> Self {
        Self {
            stream: TcpStream::connect(addr).await.unwrap(),
            buffer: Vec::new(),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.stream.local_addr().unwrap()
    }

    pub async fn send(&mut self, raw: &str) {
        self.stream.write_all(raw.as_bytes()).await.unwrap();
    }

    pub async fn request(&mut self, raw: &str) -> Reply {
        self.send(raw).await;
        self.reply().await.expect("connection closed before a reply")
    }

    pub async fn reply(&mut self) -> Option<Reply> {
        self.read_reply(true).await
    }

    pub async fn head_reply(&mut self) -> Option<Reply> {
        self.read_reply(false).await
    }

    /// Whether the server closed the connection, waiting up to 5 seconds.
    pub async fn is_closed(&mut self) -> bool {
        let mut chunk = [0; 64];
        match timeout(WAIT, self.stream.read(&mut chunk)).await {
            Ok(Ok(0)) | Ok(Err(_)) => true,
            Ok(Ok(_)) => false,
            Err(_) => false,
        }
    }

    async fn read_reply(&mut self, with_body: bool) -> Option<Reply> {
        let mut chunk = [0; 4096];

        loop {
            if let Some(reply) = Reply::parse(&mut self.buffer, with_body) {
                return Some(reply);
            }

            match timeout(WAIT, self.stream.read(&mut chunk)).await {
                Ok(Ok(0)) | Ok(Err(_)) => return None,
                Ok(Ok(n)) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(_) => panic!("no reply within {WAIT:?}"),
            }
        }
    }
}
