//! Minimal blocking RESP2 client: enough to issue `HGETALL`.

use crate::store::{KvError, KvStore};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

const IO_TIMEOUT: Duration = Duration::from_secs(5);
/// Redis' own `proto-max-bulk-len`.
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;
const MAX_ARRAY_LEN: i64 = 1 << 20;
const MAX_DEPTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Vec<u8>>),
    Array(Option<Vec<Reply>>),
}

fn read_line<R: BufRead + ?Sized>(r: &mut R) -> Result<String, KvError> {
    let mut line = String::new();
    if r.read_line(&mut line)? == 0 {
        return Err(KvError::Protocol("connection closed".into()));
    }
    match line.strip_suffix("\r\n") {
        Some(body) => Ok(body.to_string()),
        None => Err(KvError::Protocol(format!("unterminated line {line:?}"))),
    }
}

fn parse_len(s: &str) -> Result<i64, KvError> {
    s.parse()
        .map_err(|_| KvError::Protocol(format!("bad length {s:?}")))
}

fn bounded_len(s: &str, max: i64) -> Result<i64, KvError> {
    let len = parse_len(s)?;
    if len > max {
        return Err(KvError::Protocol(format!("length {len} exceeds {max}")));
    }
    Ok(len)
}

/// Reads one complete reply. Oversized lengths and deep nesting are
/// protocol errors.
pub fn read_reply<R: BufRead + ?Sized>(r: &mut R) -> Result<Reply, KvError> {
    read_nested(r, 0)
}

fn read_nested<R: BufRead + ?Sized>(r: &mut R, depth: usize) -> Result<Reply, KvError> {
    let line = read_line(r)?;
    let (kind, rest) = line.split_at_checked(1).unwrap_or(("", ""));
    match kind {
        "+" => Ok(Reply::Simple(rest.to_string())),
        "-" => Ok(Reply::Error(rest.to_string())),
        ":" => Ok(Reply::Integer(parse_len(rest)?)),
        "$" => {
            let len = bounded_len(rest, MAX_BULK_LEN)?;
            if len < 0 {
                return Ok(Reply::Bulk(None));
            }
            let mut buf = vec![0u8; len as usize + 2];
            r.read_exact(&mut buf)?;
            if !buf.ends_with(b"\r\n") {
                return Err(KvError::Protocol("bulk string not terminated".into()));
            }
            buf.truncate(len as usize);
            Ok(Reply::Bulk(Some(buf)))
        }
        "*" => {
            let len = bounded_len(rest, MAX_ARRAY_LEN)?;
            if len < 0 {
                return Ok(Reply::Array(None));
            }
            if depth >= MAX_DEPTH {
                return Err(KvError::Protocol(format!("arrays nested deeper than {MAX_DEPTH}")));
            }
            let items = (0..len)
                .map(|_| read_nested(r, depth + 1))
                .collect::<Result<_, _>>()?;
            Ok(Reply::Array(Some(items)))
        }
        _ => Err(KvError::Protocol(format!("unknown reply type in {line:?}"))),
    }
}

fn encode_command(args: &[&str]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out
}

fn bulk_text(reply: Reply) -> Result<String, KvError> {
    match reply {
        Reply::Bulk(Some(bytes)) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Reply::Simple(s) => Ok(s),
        Reply::Integer(v) => Ok(v.to_string()),
        other => Err(KvError::Protocol(format!("unexpected array element {other:?}"))),
    }
}

pub struct RespClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl RespClient {
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self, KvError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        stream.set_write_timeout(Some(IO_TIMEOUT))?;
        stream.set_nodelay(true)?;
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
        })
    }

    /// Retries [`RespClient::connect`] `attempts` times, `delay` apart.
    pub fn connect_with_retry(addr: &str, attempts: u32, delay: Duration) -> Result<Self, KvError> {
        let mut attempt = 1;
        loop {
            match Self::connect(addr) {
                Ok(client) => {
                    info!(addr, "connected to key/value store");
                    return Ok(client);
                }
                Err(e) if attempt < attempts => {
                    warn!(addr, attempt, error = %e, "key/value store unreachable, retrying");
                    attempt += 1;
                    thread::sleep(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn command(&mut self, args: &[&str]) -> Result<Reply, KvError> {
        self.writer.write_all(&encode_command(args))?;
        read_reply(&mut self.reader)
    }
}

impl KvStore for RespClient {
    fn hgetall(&mut self, key: &str) -> Result<Vec<(String, String)>, KvError> {
        let items = match self.command(&["HGETALL", key])? {
            Reply::Array(Some(items)) => items,
            _ => {
                return Err(KvError::NotAnArray {
                    key: key.to_string(),
                });
            }
        };
        if items.len() % 2 != 0 {
            return Err(KvError::Protocol(format!(
                "HGETALL {key} returned {} elements",
                items.len()
            )));
        }
        let mut fields = Vec::with_capacity(items.len() / 2);
        let mut it = items.into_iter();
        while let (Some(k), Some(v)) = (it.next(), it.next()) {
            fields.push((bulk_text(k)?, bulk_text(v)?));
        }
        Ok(fields)
    }
}
