//! The fixed-header binary protocol, narrowed to `get` and `set`.

use std::convert::TryFrom;
use std::io::Cursor;

use async_std::io::prelude::ReadExt;
use async_std::io::BufRead;
use async_trait::async_trait;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use enum_primitive::FromPrimitive;

use crate::constants::{KEY_MAXIMUM_SIZE, MAX_VALUE_DATA_LEN};
use crate::errors::{ErrorKind, Result};
use crate::item::Item;
use crate::protocol::{Codec, Request, Response, StoreVerb};

pub const HEADER_SIZE: usize = 24;

/// Flags: u32 and Expiration time: u32
const SET_EXTRAS_LENGTH: usize = 8;
const GET_EXTRAS_LENGTH: usize = 4;

/// Largest body a reply may announce: extras, key and value.
const MAX_BODY_LENGTH: usize = u8::MAX as usize + KEY_MAXIMUM_SIZE + MAX_VALUE_DATA_LEN;

enum Magic {
    Request = 0x80,
    Response = 0x81,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Opcode {
    Get = 0x00,
    Set = 0x01,
}

enum_from_primitive! {
    #[derive(Debug, PartialEq)]
    pub enum Status {
        Success = 0x00,
        KeyNotFound = 0x01,
        KeyExists = 0x02,
        ValueTooBig = 0x03,
        InvalidArguments = 0x04,
        ItemNotStored = 0x05,
        NonNumeric = 0x06,
        AuthError = 0x20,
        AuthContinue = 0x21,
        UnknownCommand = 0x81,
        OutOfMemory = 0x82
    }
}

#[derive(Debug)]
struct RequestHeader {
    magic: u8,
    opcode: u8,
    key_length: u16,
    extras_length: u8,
    data_type: u8,
    reserved: u16,
    body_length: u32,
    opaque: u32,
    cas: u64,
}

/// The response header fields the codec acts on. Data type and opaque are
/// skipped.
#[derive(Debug)]
struct ResponseHeader {
    opcode: u8,
    key_length: u16,
    extras_length: u8,
    status: u16,
    body_length: u32,
    cas: u64,
}

impl RequestHeader {
    fn new(opcode: Opcode, key_length: usize, value_length: usize, extras_length: usize) -> Result<RequestHeader> {
        let key_length = u16::try_from(key_length)
            .map_err(|_| ErrorKind::Protocol(format!("key of {} bytes cannot be framed", key_length)))?;
        let body_length = u32::try_from(key_length as usize + value_length + extras_length)
            .map_err(|_| ErrorKind::Protocol(format!("value of {} bytes cannot be framed", value_length)))?;
        Ok(RequestHeader {
            magic: Magic::Request as u8,
            opcode: opcode as u8,
            key_length,
            extras_length: extras_length as u8,
            data_type: 0,
            reserved: 0,
            body_length,
            opaque: 0,
            cas: 0,
        })
    }

    fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.write_u8(self.magic)?;
        buf.write_u8(self.opcode)?;
        buf.write_u16::<BigEndian>(self.key_length)?;
        buf.write_u8(self.extras_length)?;
        buf.write_u8(self.data_type)?;
        buf.write_u16::<BigEndian>(self.reserved)?;
        buf.write_u32::<BigEndian>(self.body_length)?;
        buf.write_u32::<BigEndian>(self.opaque)?;
        buf.write_u64::<BigEndian>(self.cas)?;
        Ok(())
    }
}

impl ResponseHeader {
    fn parse(raw: &[u8; HEADER_SIZE]) -> Result<ResponseHeader> {
        let mut buf = Cursor::new(&raw[..]);
        let magic = buf.read_u8()?;
        if magic != Magic::Response as u8 {
            debug!("Server sent an unknown magic code {:?}", magic);
            bail!(ErrorKind::Protocol(format!("unknown magic code 0x{:02x}", magic)));
        }
        let opcode = buf.read_u8()?;
        let key_length = buf.read_u16::<BigEndian>()?;
        let extras_length = buf.read_u8()?;
        let _data_type = buf.read_u8()?;
        let status = buf.read_u16::<BigEndian>()?;
        let body_length = buf.read_u32::<BigEndian>()?;
        let _opaque = buf.read_u32::<BigEndian>()?;
        Ok(ResponseHeader {
            opcode,
            key_length,
            extras_length,
            status,
            body_length,
            cas: buf.read_u64::<BigEndian>()?,
        })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BinaryCodec;

impl BinaryCodec {
    fn opcode(request: &Request<'_>) -> Option<Opcode> {
        match request {
            Request::Get { .. } => Some(Opcode::Get),
            Request::Store { verb: StoreVerb::Set, .. } => Some(Opcode::Set),
            _ => None,
        }
    }
}

#[async_trait]
impl Codec for BinaryCodec {
    fn name(&self) -> &'static str {
        "binary"
    }

    fn supports(&self, request: &Request<'_>) -> bool {
        BinaryCodec::opcode(request).is_some()
    }

    fn encode(&self, request: &Request<'_>, buf: &mut Vec<u8>) -> Result<()> {
        match request {
            Request::Get { key } => {
                let header = RequestHeader::new(Opcode::Get, key.len(), 0, 0)?;
                header.write_to(buf)?;
                std::io::Write::write_all(buf, key.as_bytes())?;
            }
            Request::Store { verb: StoreVerb::Set, item } => {
                let header = RequestHeader::new(
                    Opcode::Set,
                    item.key.len(),
                    item.value.len(),
                    SET_EXTRAS_LENGTH,
                )?;
                header.write_to(buf)?;
                buf.write_u32::<BigEndian>(item.flags)?;
                buf.write_u32::<BigEndian>(item.expiration as u32)?;
                // After flags key and value
                std::io::Write::write_all(buf, item.key.as_bytes())?;
                std::io::Write::write_all(buf, &item.value)?;
            }
            _ => bail!(ErrorKind::Unsupported),
        }
        Ok(())
    }

    async fn decode(
        &self,
        request: &Request<'_>,
        reader: &mut (dyn BufRead + Unpin + Send),
    ) -> Result<Response> {
        let expected = match BinaryCodec::opcode(request) {
            Some(opcode) => opcode,
            None => bail!(ErrorKind::Unsupported),
        };
        let mut raw = [0; HEADER_SIZE];
        reader.read_exact(&mut raw).await?;
        let header = ResponseHeader::parse(&raw)?;
        trace!("Read response header {:?}", header);
        if header.opcode != expected as u8 {
            bail!(ErrorKind::Protocol(format!(
                "response opcode 0x{:02x} does not match request {:?}",
                header.opcode, expected
            )));
        }
        let body_length = header.body_length as usize;
        if body_length > MAX_BODY_LENGTH {
            bail!(ErrorKind::Protocol(format!("body of {} bytes is too large", body_length)));
        }
        // The whole body is always consumed so the stream stays framed.
        let mut body = vec![0; body_length];
        reader.read_exact(&mut body).await?;
        let extras_length = header.extras_length as usize;
        let value_offset = extras_length + header.key_length as usize;
        if value_offset > body.len() {
            bail!(ErrorKind::Protocol(format!(
                "body of {} bytes is shorter than its extras and key",
                body.len()
            )));
        }

        match Status::from_u16(header.status) {
            Some(Status::Success) => match request {
                Request::Get { key } => {
                    if extras_length < GET_EXTRAS_LENGTH {
                        bail!(ErrorKind::Protocol("get response without flags".into()));
                    }
                    let flags = Cursor::new(&body[..GET_EXTRAS_LENGTH]).read_u32::<BigEndian>()?;
                    let value = body.split_off(value_offset);
                    Ok(Response::Values(vec![Item {
                        key: (*key).to_owned(),
                        value,
                        flags,
                        expiration: 0,
                        cas_id: Some(header.cas),
                    }]))
                }
                _ => Ok(Response::Stored),
            },
            Some(status) => {
                let message = String::from_utf8_lossy(&body[value_offset..]).into_owned();
                debug!("Server returned {:?}: {:?}", status, message);
                Ok(status_response(status, message))
            }
            None => bail!(ErrorKind::Protocol(format!(
                "unknown status code 0x{:02x}",
                header.status
            ))),
        }
    }
}

fn status_response(status: Status, message: String) -> Response {
    let reason = |fallback: &str| {
        if message.is_empty() {
            fallback.to_owned()
        } else {
            message.clone()
        }
    };
    match status {
        Status::Success => Response::Stored,
        Status::KeyNotFound => Response::NotFound,
        Status::KeyExists => Response::Exists,
        Status::ItemNotStored => Response::NotStored,
        Status::ValueTooBig => Response::ServerError(reason("value too large")),
        Status::OutOfMemory => Response::ServerError(reason("out of memory")),
        Status::InvalidArguments => Response::ClientError(reason("invalid arguments")),
        Status::NonNumeric => Response::ClientError(reason("non-numeric value")),
        Status::AuthError | Status::AuthContinue => Response::ClientError(reason("authentication required")),
        Status::UnknownCommand => Response::ClientError(reason("unknown command")),
    }
}
