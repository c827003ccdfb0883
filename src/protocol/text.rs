//! The classic line protocol: CRLF-terminated ASCII command lines, values
//! framed by an explicit byte count.

use std::collections::HashMap;
use std::io::Write;
use std::str::{self, FromStr};

use async_std::io::prelude::{BufReadExt, ReadExt};
use async_std::io::{self, BufRead};
use async_trait::async_trait;

use crate::constants::{CRLF, MAX_VALUE_DATA_LEN};
use crate::errors::{ErrorKind, Result};
use crate::item::Item;
use crate::protocol::{Codec, Request, Response, StoreVerb};

#[derive(Debug, Default, Clone, Copy)]
pub struct TextCodec;

#[async_trait]
impl Codec for TextCodec {
    fn name(&self) -> &'static str {
        "text"
    }

    fn supports(&self, _request: &Request<'_>) -> bool {
        true
    }

    fn encode(&self, request: &Request<'_>, buf: &mut Vec<u8>) -> Result<()> {
        match request {
            Request::Get { key } => write!(buf, "gets {}\r\n", key)?,
            Request::GetMulti { keys } => {
                buf.extend_from_slice(b"gets");
                for key in keys.iter() {
                    write!(buf, " {}", key)?;
                }
                buf.extend_from_slice(CRLF);
            }
            Request::Store { verb, item } => {
                write!(
                    buf,
                    "{} {} {} {} {}",
                    verb.as_str(),
                    item.key,
                    item.flags,
                    item.expiration,
                    item.value.len()
                )?;
                if *verb == StoreVerb::Cas {
                    let cas = item.cas_id.ok_or(ErrorKind::MissingCasToken)?;
                    write!(buf, " {}", cas)?;
                }
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(&item.value);
                buf.extend_from_slice(CRLF);
            }
            Request::Delete { key } => write!(buf, "delete {}\r\n", key)?,
            Request::Arith { verb, key, delta } => {
                write!(buf, "{} {} {}\r\n", verb.as_str(), key, delta)?
            }
            Request::Touch { key, expiration } => write!(buf, "touch {} {}\r\n", key, expiration)?,
            Request::FlushAll => buf.extend_from_slice(b"flush_all\r\n"),
            Request::Version => buf.extend_from_slice(b"version\r\n"),
            Request::Stats => buf.extend_from_slice(b"stats\r\n"),
        }
        Ok(())
    }

    async fn decode(
        &self,
        request: &Request<'_>,
        reader: &mut (dyn BufRead + Unpin + Send),
    ) -> Result<Response> {
        match request {
            Request::Get { .. } | Request::GetMulti { .. } => read_values(reader).await,
            Request::Stats => read_stats(reader).await,
            Request::Arith { .. } => {
                let line = read_line(reader).await?;
                match parse_status(&line) {
                    Some(status) => Ok(status),
                    // decr pads shrinking numbers with trailing spaces
                    None => parse_field(trim_end(&line), "counter value").map(Response::Numeric),
                }
            }
            Request::Version => {
                let line = read_line(reader).await?;
                if let Some(version) = line.strip_prefix(&b"VERSION "[..]) {
                    return Ok(Response::Version(String::from_utf8_lossy(version).into_owned()));
                }
                parse_status(&line).ok_or_else(|| unexpected(&line))
            }
            _ => {
                let line = read_line(reader).await?;
                parse_status(&line).ok_or_else(|| unexpected(&line))
            }
        }
    }
}

/// Reads one line and strips its CRLF. EOF before any byte is an I/O error.
async fn read_line(reader: &mut (dyn BufRead + Unpin + Send)) -> Result<Vec<u8>> {
    let mut line = Vec::new();
    if reader.read_until(b'\n', &mut line).await? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "server closed the connection").into());
    }
    if !line.ends_with(CRLF) {
        bail!(ErrorKind::Protocol(format!(
            "unterminated line {:?}",
            String::from_utf8_lossy(&line)
        )));
    }
    line.truncate(line.len() - CRLF.len());
    Ok(line)
}

async fn read_values(reader: &mut (dyn BufRead + Unpin + Send)) -> Result<Response> {
    let mut items = Vec::new();
    loop {
        let line = read_line(reader).await?;
        if line == b"END" {
            return Ok(Response::Values(items));
        }
        if line.starts_with(b"VALUE ") {
            let (mut item, len) = parse_value_line(&line)?;
            item.value = read_data(reader, len).await?;
            items.push(item);
            continue;
        }
        return match parse_status(&line) {
            Some(status @ Response::Error)
            | Some(status @ Response::ClientError(_))
            | Some(status @ Response::ServerError(_))
                if items.is_empty() =>
            {
                Ok(status)
            }
            _ => Err(unexpected(&line)),
        };
    }
}

/// Parses `VALUE <key> <flags> <bytes> [<cas>]` into an item without its
/// value and the announced value length.
fn parse_value_line(line: &[u8]) -> Result<(Item, usize)> {
    let mut fields = line.split(|&b| b == b' ').skip(1);
    let (key, flags, len) = match (fields.next(), fields.next(), fields.next()) {
        (Some(key), Some(flags), Some(len)) => (key, flags, len),
        _ => return Err(unexpected(line)),
    };
    let cas_id = match fields.next() {
        Some(cas) => Some(parse_field(cas, "cas")?),
        None => None,
    };
    if fields.next().is_some() {
        return Err(unexpected(line));
    }
    let key = String::from_utf8(key.to_vec())
        .map_err(|_| ErrorKind::Protocol(format!("key is not valid UTF-8: {:?}", key)))?;
    let item = Item {
        key,
        value: Vec::new(),
        flags: parse_field(flags, "flags")?,
        expiration: 0,
        cas_id,
    };
    let len: usize = parse_field(len, "length")?;
    if len > MAX_VALUE_DATA_LEN {
        bail!(ErrorKind::Protocol(format!("value data too large: {} bytes", len)));
    }
    Ok((item, len))
}

/// Reads exactly `len` payload bytes plus the trailing CRLF.
async fn read_data(reader: &mut (dyn BufRead + Unpin + Send), len: usize) -> Result<Vec<u8>> {
    let mut data = vec![0; len + CRLF.len()];
    reader.read_exact(&mut data).await?;
    if !data.ends_with(CRLF) {
        bail!(ErrorKind::Protocol("value block not terminated by CRLF".into()));
    }
    data.truncate(len);
    Ok(data)
}

async fn read_stats(reader: &mut (dyn BufRead + Unpin + Send)) -> Result<Response> {
    let mut stats = HashMap::new();
    loop {
        let line = read_line(reader).await?;
        if line == b"END" {
            return Ok(Response::Stats(stats));
        }
        if let Some(rest) = line.strip_prefix(&b"STAT "[..]) {
            let rest = String::from_utf8_lossy(rest);
            let mut parts = rest.splitn(2, ' ');
            let name = parts.next().unwrap_or_default().to_owned();
            let value = parts.next().unwrap_or_default().to_owned();
            stats.insert(name, value);
            continue;
        }
        return match parse_status(&line) {
            Some(status) if stats.is_empty() => Ok(status),
            _ => Err(unexpected(&line)),
        };
    }
}

fn parse_status(line: &[u8]) -> Option<Response> {
    let response = match line {
        b"STORED" => Response::Stored,
        b"NOT_STORED" => Response::NotStored,
        b"EXISTS" => Response::Exists,
        b"NOT_FOUND" => Response::NotFound,
        b"DELETED" => Response::Deleted,
        b"TOUCHED" => Response::Touched,
        b"OK" => Response::Ok,
        b"ERROR" => Response::Error,
        _ => {
            if let Some(reason) = line.strip_prefix(&b"CLIENT_ERROR"[..]) {
                Response::ClientError(reason_text(reason))
            } else if let Some(reason) = line.strip_prefix(&b"SERVER_ERROR"[..]) {
                Response::ServerError(reason_text(reason))
            } else {
                return None;
            }
        }
    };
    Some(response)
}

fn reason_text(reason: &[u8]) -> String {
    String::from_utf8_lossy(reason).trim().to_owned()
}

fn parse_field<T: FromStr>(field: &[u8], what: &str) -> Result<T> {
    str::from_utf8(field)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            ErrorKind::Protocol(format!(
                "invalid {} {:?}",
                what,
                String::from_utf8_lossy(field)
            ))
            .into()
        })
}

fn trim_end(field: &[u8]) -> &[u8] {
    let end = field.iter().rposition(|&b| b != b' ').map_or(0, |i| i + 1);
    &field[..end]
}

fn unexpected(line: &[u8]) -> crate::errors::Error {
    debug!("Unexpected line from server {:?}", String::from_utf8_lossy(line));
    ErrorKind::Protocol(format!(
        "unexpected response line {:?}",
        String::from_utf8_lossy(line)
    ))
    .into()
}
