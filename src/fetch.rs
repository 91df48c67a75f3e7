//! The fetch primitive every higher level operation is built on.

use crate::error::{Error, Result};
use std::fmt;
use std::io::Read;
use std::time::Duration;

/// 一次请求的结果，body以流的形式读取
pub struct Payload {
    /// Raw `Content-Disposition` header value, if the server sent one
    pub content_disposition: Option<String>,
    pub content_length: Option<u64>,
    body: Box<dyn Read + Send>,
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("content_disposition", &self.content_disposition)
            .field("content_length", &self.content_length)
            .finish()
    }
}

impl Payload {
    pub fn new(body: impl Read + Send + 'static) -> Self {
        Self {
            content_disposition: None,
            content_length: None,
            body: Box::new(body),
        }
    }

    pub fn with_content_disposition(mut self, value: Option<String>) -> Self {
        self.content_disposition = value;
        self
    }

    pub fn with_content_length(mut self, length: Option<u64>) -> Self {
        self.content_length = length;
        self
    }

    pub fn body(&mut self) -> &mut (dyn Read + Send) {
        self.body.as_mut()
    }

    /// 读取全部内容
    pub fn into_bytes(mut self, url: &str, timeout: Duration) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.body
            .read_to_end(&mut buf)
            .map_err(|err| Error::from_read(url, timeout, err))?;
        Ok(buf)
    }
}

/// A single blocking retrieval of `url` bounded by `timeout`.
///
/// Implementations must be shareable between batch workers.
pub trait Fetch: Send + Sync {
    fn fetch(&self, url: &str, timeout: Duration) -> Result<Payload>;
}
