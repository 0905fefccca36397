//! memcached client speaking the ASCII protocol over tokio.
//!
//! The connection is opened lazily: constructing a client never fails, the
//! first command connects. After a transport or protocol error the
//! connection is dropped and the next command reconnects. Nothing is retried.

use std::io;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::cache::CacheClient;
use crate::error::{CacheError, CacheResult};

/// Longest key memcached accepts.
pub const MAX_KEY_LENGTH: usize = 250;

/// Expiry values above this are read by memcached as absolute Unix times.
const RELATIVE_EXPIRY_LIMIT_SECS: u64 = 60 * 60 * 24 * 30;

/// Latest absolute expiry memcached stores without wrapping its 32-bit clock.
const MAX_ABSOLUTE_EXPIRY: u64 = i32::MAX as u64;

/// Largest value memcached stores with its default item size.
pub const MAX_VALUE_LENGTH: usize = 1024 * 1024;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

enum Command<'a> {
    Get(&'a str),
    Set {
        key: &'a str,
        value: &'a str,
        exptime: u64,
    },
    Delete(&'a str),
}

impl Command<'_> {
    fn encode(&self) -> Vec<u8> {
        match self {
            Command::Get(key) => format!("get {}\r\n", key).into_bytes(),
            Command::Set {
                key,
                value,
                exptime,
            } => {
                let mut buf =
                    format!("set {} 0 {} {}\r\n", key, exptime, value.len()).into_bytes();
                buf.extend_from_slice(value.as_bytes());
                buf.extend_from_slice(b"\r\n");
                buf
            }
            Command::Delete(key) => format!("delete {}\r\n", key).into_bytes(),
        }
    }
}

enum Reply {
    Value(Option<String>),
    Flag(bool),
}

/// memcached client for one server.
pub struct MemcacheClient {
    addr: String,
    timeout: Duration,
    conn: Mutex<Option<BufStream<TcpStream>>>,
}

impl std::fmt::Debug for MemcacheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemcacheClient")
            .field("addr", &self.addr)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl MemcacheClient {
    /// Create a client for `host:port`. No connection is made until the first
    /// command.
    pub fn connect(host: &str, port: u16) -> Self {
        Self {
            addr: format!("{}:{}", host, port),
            timeout: DEFAULT_TIMEOUT,
            conn: Mutex::new(None),
        }
    }

    /// Set the connect and per-command timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Server address.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn execute(&self, command: Command<'_>) -> CacheResult<Reply> {
        let mut guard = self.conn.lock().await;

        if guard.is_none() {
            let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr))
                .await
                .map_err(|_| CacheError::Timeout)??;
            debug!(addr = %self.addr, "Connected to memcached");
            *guard = Some(BufStream::new(stream));
        }

        let Some(stream) = guard.as_mut() else {
            return Err(CacheError::Unavailable);
        };

        let result = match tokio::time::timeout(self.timeout, exchange(stream, &command)).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout),
        };

        // The stream position is unknown after these; start over next time.
        if matches!(
            result,
            Err(CacheError::Io(_) | CacheError::Timeout | CacheError::Protocol(_))
        ) {
            debug!(addr = %self.addr, "Dropping memcached connection after error");
            *guard = None;
        }

        result
    }
}

#[async_trait]
impl CacheClient for MemcacheClient {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        validate_key(key)?;
        match self.execute(Command::Get(key)).await? {
            Reply::Value(value) => {
                trace!(key = %key, hit = value.is_some(), "memcached get");
                Ok(value)
            }
            Reply::Flag(_) => Err(CacheError::Protocol("unexpected reply to get".to_string())),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        validate_key(key)?;
        let command = Command::Set {
            key,
            value,
            exptime: expiry(ttl),
        };
        match self.execute(command).await? {
            Reply::Flag(stored) => Ok(stored),
            Reply::Value(_) => Err(CacheError::Protocol("unexpected reply to set".to_string())),
        }
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        validate_key(key)?;
        match self.execute(Command::Delete(key)).await? {
            Reply::Flag(deleted) => Ok(deleted),
            Reply::Value(_) => Err(CacheError::Protocol(
                "unexpected reply to delete".to_string(),
            )),
        }
    }

    async fn close(&self) -> CacheResult<bool> {
        let mut guard = self.conn.lock().await;
        if let Some(mut stream) = guard.take() {
            // The server drops the connection on its own if this fails.
            let _ = stream.shutdown().await;
            debug!(addr = %self.addr, "Closed memcached connection");
        }
        Ok(true)
    }
}

/// Reject keys memcached would refuse.
fn validate_key(key: &str) -> CacheResult<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("empty key".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidKey(format!(
            "key is {} bytes, limit is {}",
            key.len(),
            MAX_KEY_LENGTH
        )));
    }
    if key.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control()) {
        return Err(CacheError::InvalidKey(format!(
            "key contains whitespace or control characters: {:?}",
            key
        )));
    }
    Ok(())
}

/// memcached `exptime` for a TTL.
fn expiry(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if secs <= RELATIVE_EXPIRY_LIMIT_SECS {
        return secs;
    }
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    now.saturating_add(secs).min(MAX_ABSOLUTE_EXPIRY)
}

async fn exchange(
    stream: &mut BufStream<TcpStream>,
    command: &Command<'_>,
) -> CacheResult<Reply> {
    stream.write_all(&command.encode()).await?;
    stream.flush().await?;

    match command {
        Command::Get(_) => read_value(stream).await.map(Reply::Value),
        Command::Set { .. } => {
            let line = read_line(stream).await?;
            match line.as_str() {
                "STORED" => Ok(Reply::Flag(true)),
                "NOT_STORED" | "EXISTS" | "NOT_FOUND" => Ok(Reply::Flag(false)),
                other => Err(error_reply(other)),
            }
        }
        Command::Delete(_) => {
            let line = read_line(stream).await?;
            match line.as_str() {
                "DELETED" => Ok(Reply::Flag(true)),
                "NOT_FOUND" => Ok(Reply::Flag(false)),
                other => Err(error_reply(other)),
            }
        }
    }
}

/// Read a `VALUE ... END` block (or a bare `END`).
async fn read_value<S>(stream: &mut S) -> CacheResult<Option<String>>
where
    S: AsyncBufRead + Unpin,
{
    let line = read_line(stream).await?;
    if line == "END" {
        return Ok(None);
    }

    let mut parts = line.split(' ');
    if parts.next() != Some("VALUE") {
        return Err(error_reply(&line));
    }
    let len: usize = parts
        .nth(2)
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| CacheError::Protocol(format!("malformed VALUE line: {}", line)))?;
    if len > MAX_VALUE_LENGTH {
        return Err(CacheError::Protocol(format!(
            "value of {} bytes exceeds the {} byte item limit",
            len, MAX_VALUE_LENGTH
        )));
    }

    let mut data = vec![0u8; len + 2];
    stream.read_exact(&mut data).await?;
    if &data[len..] != b"\r\n" {
        return Err(CacheError::Protocol(
            "value block not terminated by CRLF".to_string(),
        ));
    }
    data.truncate(len);

    let end = read_line(stream).await?;
    if end != "END" {
        return Err(CacheError::Protocol(format!(
            "expected END after value, got {:?}",
            end
        )));
    }

    String::from_utf8(data)
        .map(Some)
        .map_err(|_| CacheError::Protocol("value is not valid UTF-8".to_string()))
}

async fn read_line<S>(stream: &mut S) -> CacheResult<String>
where
    S: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let n = stream.read_line(&mut line).await?;
    if n == 0 {
        return Err(CacheError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "memcached closed the connection",
        )));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn error_reply(line: &str) -> CacheError {
    if line == "ERROR" {
        CacheError::Server("unknown command".to_string())
    } else if let Some(msg) = line
        .strip_prefix("CLIENT_ERROR ")
        .or_else(|| line.strip_prefix("SERVER_ERROR "))
    {
        CacheError::Server(msg.to_string())
    } else {
        CacheError::Protocol(format!("unexpected reply: {:?}", line))
    }
}
