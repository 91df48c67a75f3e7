use crate::config::DEFAULT_CHUNK_SIZE;
use crate::error::{Error, Result};
use crate::fetch::{Fetch, Payload};
use async_ftp::types::FileType;
use async_ftp::{status, DataStream, FtpError, FtpStream};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::io::{self, Read};
use std::thread;
use std::time::Duration;
use tokio::io::{AsyncReadExt, BufReader};
use url::Url;

const ANONYMOUS_USER: &str = "anonymous";
const ANONYMOUS_PASSWORD: &str = "anonymous@";

/// ftp链接解析后的各部分
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpTarget {
    pub address: String, //host:port
    pub user: String,
    pub password: String,
    pub dir: String,  //文件所在目录
    pub file: String, //文件名称
}

impl FtpTarget {
    /// 解析 `ftp://[user[:password]@]host[:port]/path/to/file`
    pub fn parse(ftp_url: &str) -> Result<Self> {
        let url = Url::parse(ftp_url)
            .map_err(|err| Error::Input(format!("invalid ftp url {}: {}", ftp_url, err)))?;
        if url.scheme() != "ftp" {
            return Err(Error::Input(format!("{} is not an ftp:// url", ftp_url)));
        }
        let host = url
            .host_str()
            .ok_or_else(|| Error::Input(format!("{} has no host", ftp_url)))?;
        let port = url.port_or_known_default().unwrap_or(21);

        let decode = |value: &str| {
            urlencoding::decode(value)
                .map(|cow| cow.into_owned())
                .unwrap_or_else(|_| value.to_string())
        };
        let user = match url.username() {
            "" => ANONYMOUS_USER.to_string(),
            name => decode(name),
        };
        let password = match url.password() {
            Some(password) => decode(password),
            None => ANONYMOUS_PASSWORD.to_string(),
        };

        let mut segments: Vec<String> = url
            .path_segments()
            .map(|segments| segments.map(decode).collect())
            .unwrap_or_default();
        let file = segments.pop().unwrap_or_default();
        if file.is_empty() {
            return Err(Error::Input(format!("{} does not name a file", ftp_url)));
        }
        let dir = segments.join("/");

        Ok(Self {
            address: format!("{}:{}", host, port),
            user,
            password,
            dir,
            file,
        })
    }
}

/// 数据连接读出的内容块，空块表示传输完成
type Chunk = io::Result<Vec<u8>>;

// 传输线程最多领先读取方的块数
const CHUNK_QUEUE: usize = 4;

/// 登录ftp服务器并打开文件的数据连接
///
/// Returns the control connection, the data stream and the size the server
/// reports for the file, if it answers `SIZE`.
pub async fn connect(
    target: &FtpTarget,
    ftp_url: &str,
    timeout: Duration,
) -> Result<(FtpStream, BufReader<DataStream>, Option<u64>)> {
    let session = async {
        let mut stream = FtpStream::connect(target.address.clone()).await?;
        stream.login(&target.user, &target.password).await?;
        if !target.dir.is_empty() {
            stream.cwd(&target.dir).await?;
        }
        stream.transfer_type(FileType::Binary).await?;
        let length = match stream.size(&target.file).await {
            Ok(size) => size.map(|size| size as u64),
            Err(err) => {
                debug!("SIZE {} not answered: {}", target.file, err);
                None
            }
        };
        let data = stream.get(&target.file).await?;
        Ok::<_, FtpError>((stream, data, length))
    };

    match tokio::time::timeout(timeout, session).await {
        Err(_) => Err(Error::Timeout {
            url: ftp_url.to_string(),
            timeout,
        }),
        Ok(Err(err)) => Err(Error::Ftp {
            url: ftp_url.to_string(),
            message: err.to_string(),
        }),
        Ok(Ok(opened)) => Ok(opened),
    }
}

/// Copies the data stream into `chunks`; `false` when the reader went away
async fn pump(mut data: BufReader<DataStream>, timeout: Duration, chunks: &Sender<Chunk>) -> io::Result<bool> {
    let mut total: u64 = 0;
    loop {
        let mut buf = vec![0u8; DEFAULT_CHUNK_SIZE];
        let read = match tokio::time::timeout(timeout, data.read(&mut buf)).await {
            Err(_) => return Err(io::Error::new(io::ErrorKind::TimedOut, "ftp data connection stalled")),
            Ok(read) => read?,
        };
        if read == 0 {
            debug!("ftp data connection closed after {} bytes", total);
            return Ok(true);
        }
        buf.truncate(read);
        total += read as u64;
        // 这个线程只跑这一个任务，阻塞发送即可形成背压
        if chunks.send(Ok(buf)).is_err() {
            return Ok(false);
        }
    }
}

/// 在独立线程的runtime上完成一次下载
fn transfer(
    target: FtpTarget,
    ftp_url: String,
    timeout: Duration,
    opened: Sender<Result<Option<u64>>>,
    chunks: Sender<Chunk>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            let _ = opened.send(Err(Error::Ftp {
                url: ftp_url,
                message: format!("could not start runtime: {}", err),
            }));
            return;
        }
    };

    runtime.block_on(async move {
        let (mut stream, data, length) = match connect(&target, &ftp_url, timeout).await {
            Ok(opened) => opened,
            Err(err) => {
                let _ = opened.send(Err(err));
                return;
            }
        };
        if opened.send(Ok(length)).is_err() {
            return;
        }

        match pump(data, timeout, &chunks).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("reader of {} stopped early", ftp_url);
                return;
            }
            Err(err) => {
                let _ = chunks.send(Err(err));
                return;
            }
        }

        // 数据连接关闭后服务器应答226/250
        let finished = tokio::time::timeout(
            timeout,
            stream.read_response_in(&[status::CLOSING_DATA_CONNECTION, status::REQUESTED_FILE_ACTION_OK]),
        )
        .await;
        let end = match finished {
            Ok(Ok(_)) => Ok(Vec::new()),
            Ok(Err(err)) => Err(io::Error::new(io::ErrorKind::Other, err.to_string())),
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "ftp server did not confirm the transfer")),
        };
        let complete = end.is_ok();
        let _ = chunks.send(end);
        if complete {
            info!("retrieved {} from {}", target.file, target.address);
        }
        // 断开链接
        if let Err(err) = stream.quit().await {
            debug!("ftp quit failed: {}", err);
        }
    });
}

/// Reads the chunks a transfer thread sends, until the empty end marker
struct ChunkReader {
    chunks: Receiver<Chunk>,
    current: Vec<u8>,
    offset: usize,
    done: bool,
}

impl ChunkReader {
    fn new(chunks: Receiver<Chunk>) -> Self {
        Self {
            chunks,
            current: Vec::new(),
            offset: 0,
            done: false,
        }
    }
}

impl Read for ChunkReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.offset >= self.current.len() {
            if self.done {
                return Ok(0);
            }
            match self.chunks.recv() {
                Ok(Ok(chunk)) if chunk.is_empty() => self.done = true,
                Ok(Ok(chunk)) => {
                    self.current = chunk;
                    self.offset = 0;
                }
                Ok(Err(err)) => return Err(err),
                Err(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "ftp transfer stopped before the end of the file",
                    ))
                }
            }
        }
        let count = buf.len().min(self.current.len() - self.offset);
        buf[..count].copy_from_slice(&self.current[self.offset..self.offset + count]);
        self.offset += count;
        Ok(count)
    }
}

/// Fetches `ftp://` URLs.
///
/// Each fetch runs its session on a private current-thread runtime in its
/// own thread; the body streams through a small bounded queue of chunks.
#[derive(Debug, Default, Clone, Copy)]
pub struct FtpFetcher;

impl Fetch for FtpFetcher {
    fn fetch(&self, url: &str, timeout: Duration) -> Result<Payload> {
        let target = FtpTarget::parse(url)?;
        let (opened_tx, opened_rx) = bounded(1);
        let (chunk_tx, chunk_rx) = bounded(CHUNK_QUEUE);
        let ftp_url = url.to_string();
        thread::Builder::new()
            .name("grab-ftp".to_string())
            .spawn(move || transfer(target, ftp_url, timeout, opened_tx, chunk_tx))
            .map_err(|err| Error::Ftp {
                url: url.to_string(),
                message: format!("could not start transfer thread: {}", err),
            })?;

        let length = opened_rx.recv().map_err(|_| Error::Ftp {
            url: url.to_string(),
            message: "transfer thread stopped before connecting".to_string(),
        })??;
        Ok(Payload::new(ChunkReader::new(chunk_rx)).with_content_length(length))
    }
}
