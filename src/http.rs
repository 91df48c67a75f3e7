use crate::error::{Error, Result};
use crate::fetch::{Fetch, Payload};
use reqwest::blocking::{Client, Response};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH};
use reqwest::redirect::Policy;
use std::collections::HashMap;
use std::time::Duration;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// 基于reqwest阻塞客户端的下载器
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client, //客户端
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }

    /// 发送GET请求并检查状态码
    fn send(&self, url: &str, timeout: Duration) -> Result<Response> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .map_err(|err| Error::from_reqwest(url, timeout, err))?;
        response
            .error_for_status()
            .map_err(|err| Error::from_reqwest(url, timeout, err))
    }

    /// Body decoded as text, using `encoding` as the charset label when given
    pub fn text(&self, url: &str, encoding: Option<&str>, timeout: Duration) -> Result<String> {
        let response = self.send(url, timeout)?;
        let text = match encoding {
            Some(label) if !label.is_empty() => response.text_with_charset(label),
            _ => response.text(),
        };
        text.map_err(|err| Error::from_reqwest(url, timeout, err))
    }

    /// 只请求head部分，返回所有响应头
    pub fn headers(
        &self,
        url: &str,
        follow_redirects: bool,
        timeout: Duration,
    ) -> Result<HashMap<String, String>> {
        let request = if follow_redirects {
            self.client.head(url)
        } else {
            Client::builder()
                .user_agent(USER_AGENT)
                .redirect(Policy::none())
                .build()
                .map_err(|err| Error::from_reqwest(url, timeout, err))?
                .head(url)
        };
        let response = request
            .timeout(timeout)
            .send()
            .map_err(|err| Error::from_reqwest(url, timeout, err))?
            .error_for_status()
            .map_err(|err| Error::from_reqwest(url, timeout, err))?;

        let mut headers: HashMap<String, String> = HashMap::new();
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            headers
                .entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }
        Ok(headers)
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str, timeout: Duration) -> Result<Payload> {
        let response = self.send(url, timeout)?;
        let content_disposition = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());
        debug!("{} answered, length {:?}", url, content_length);
        Ok(Payload::new(response)
            .with_content_disposition(content_disposition)
            .with_content_length(content_length))
    }
}

#[cfg(test)]
mod http_test {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::{serve_once, serve_silent};

    #[test]
    fn test_fetch_reads_body_and_disposition() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nContent-Disposition: attachment; filename=\"report.txt\"\r\nConnection: close\r\n\r\nhello",
        );
        let fetcher = HttpFetcher::new();
        let payload = fetcher.fetch(&url, Duration::from_secs(5)).unwrap();
        assert_eq!(
            payload.content_disposition.as_deref(),
            Some("attachment; filename=\"report.txt\"")
        );
        assert_eq!(payload.content_length, Some(5));
        let body = payload.into_bytes(&url, Duration::from_secs(5)).unwrap();
        assert_eq!(body, b"hello");
    }

    #[test]
    fn test_error_status_is_reported() {
        let url = serve_once(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        let err = HttpFetcher::new()
            .fetch(&url, Duration::from_secs(5))
            .unwrap_err();
        match err {
            Error::Status { status, .. } => assert_eq!(status, 404),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_silent_server_times_out() {
        let url = serve_silent(Duration::from_secs(3));
        let err = HttpFetcher::new()
            .fetch(&url, Duration::from_millis(300))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn test_headers_are_collected() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nX-Served-By: unit\r\nConnection: close\r\n\r\n",
        );
        let headers = HttpFetcher::new()
            .headers(&url, true, Duration::from_secs(5))
            .unwrap();
        assert_eq!(headers.get("x-served-by").map(String::as_str), Some("unit"));
    }

    #[test]
    fn test_headers_without_following_redirect() {
        let url = serve_once(
            b"HTTP/1.1 302 Found\r\nLocation: http://127.0.0.1:9/elsewhere.bin\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        let headers = HttpFetcher::new()
            .headers(&url, false, Duration::from_secs(5))
            .unwrap();
        assert_eq!(
            headers.get("location").map(String::as_str),
            Some("http://127.0.0.1:9/elsewhere.bin")
        );
    }

    #[test]
    fn test_text_with_charset() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\nContent-Type: text/plain\r\nConnection: close\r\n\r\n\xe9t\xe9",
        );
        let text = HttpFetcher::new()
            .text(&url, Some("latin1"), Duration::from_secs(5))
            .unwrap();
        assert_eq!(text, "été");
    }
}
