//! Helpers shared by the unit tests: an in-memory fetcher and throwaway
//! local HTTP and FTP servers.

use crate::error::{Error, ErrorKind, Result};
use crate::fetch::{Fetch, Payload};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Cursor, Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

#[derive(Clone)]
enum Reply {
    Body {
        bytes: Vec<u8>,
        disposition: Option<String>,
    },
    Fail(ErrorKind),
}

/// 内存中的假下载器，记录调用次数和最大并发数
#[derive(Default)]
pub struct FakeFetcher {
    replies: HashMap<String, Reply>,
    delay: Duration,
    calls: Mutex<Vec<String>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, url: &str, bytes: &[u8]) -> Self {
        self.replies.insert(
            url.to_string(),
            Reply::Body {
                bytes: bytes.to_vec(),
                disposition: None,
            },
        );
        self
    }

    pub fn with_disposition(mut self, url: &str, bytes: &[u8], disposition: &str) -> Self {
        self.replies.insert(
            url.to_string(),
            Reply::Body {
                bytes: bytes.to_vec(),
                disposition: Some(disposition.to_string()),
            },
        );
        self
    }

    pub fn with_failure(mut self, url: &str, kind: ErrorKind) -> Self {
        self.replies.insert(url.to_string(), Reply::Fail(kind));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Highest number of fetches observed in flight at once
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Fetch for FakeFetcher {
    fn fetch(&self, url: &str, timeout: Duration) -> Result<Payload> {
        self.calls.lock().unwrap().push(url.to_string());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        match self.replies.get(url).cloned() {
            Some(Reply::Body { bytes, disposition }) => Ok(Payload::new(Cursor::new(bytes)).with_content_disposition(disposition)),
            Some(Reply::Fail(ErrorKind::Timeout)) => Err(Error::Timeout {
                url: url.to_string(),
                timeout,
            }),
            Some(Reply::Fail(_)) | None => Err(Error::Network {
                url: url.to_string(),
                message: "connection refused".to_string(),
            }),
        }
    }
}

/// 读取请求头直到空行
fn drain_request(stream: &mut impl Read) {
    let mut seen = Vec::new();
    let mut buf = [0u8; 512];
    while !seen.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => seen.extend_from_slice(&buf[..n]),
        }
    }
}

/// Serves `response` verbatim to the first connection and returns its URL
pub fn serve_once(response: &[u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let response = response.to_vec();
    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            drain_request(&mut stream);
            let _ = stream.write_all(&response);
            let _ = stream.flush();
        }
    });
    format!("http://{}/files/payload.bin", addr)
}

/// Accepts a connection and never answers it
pub fn serve_silent(hold: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            drain_request(&mut stream);
            thread::sleep(hold);
        }
    });
    format!("http://{}/slow.bin", addr)
}

/// Minimal passive-mode FTP server for one session.
///
/// Serves `payload` for any `RETR` and answers `SIZE` with `announced`.
/// Returns the URL of `pub/big.bin` on it.
pub fn serve_ftp(payload: &[u8], announced: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let payload = payload.to_vec();
    thread::spawn(move || {
        let mut control = match listener.accept() {
            Ok((stream, _)) => stream,
            Err(_) => return,
        };
        let mut lines = BufReader::new(control.try_clone().unwrap());
        let _ = control.write_all(b"220 ready\r\n");
        let mut passive: Option<TcpListener> = None;
        let mut line = String::new();
        loop {
            line.clear();
            match lines.read_line(&mut line) {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
            let verb = line.split_whitespace().next().unwrap_or("").to_ascii_uppercase();
            let reply = match verb.as_str() {
                "USER" => "331 password please\r\n".to_string(),
                "PASS" => "230 logged in\r\n".to_string(),
                "CWD" => "250 directory changed\r\n".to_string(),
                "TYPE" => "200 type set\r\n".to_string(),
                "SIZE" => format!("213 {}\r\n", announced),
                "PASV" => {
                    let data = TcpListener::bind("127.0.0.1:0").unwrap();
                    let data_port = data.local_addr().unwrap().port();
                    passive = Some(data);
                    format!(
                        "227 Entering Passive Mode (127,0,0,1,{},{})\r\n",
                        data_port >> 8,
                        data_port & 0xff
                    )
                }
                "RETR" => match passive.take() {
                    Some(data) => {
                        let _ = control.write_all(b"150 opening data connection\r\n");
                        if let Ok((mut conn, _)) = data.accept() {
                            let _ = conn.write_all(&payload);
                        }
                        "226 transfer complete\r\n".to_string()
                    }
                    None => "425 use PASV first\r\n".to_string(),
                },
                "QUIT" => {
                    let _ = control.write_all(b"221 bye\r\n");
                    return;
                }
                _ => "502 not implemented\r\n".to_string(),
            };
            if control.write_all(reply.as_bytes()).is_err() {
                return;
            }
        }
    });
    format!("ftp://127.0.0.1:{}/pub/big.bin", port)
}
