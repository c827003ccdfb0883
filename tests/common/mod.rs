//! In-process stand-in for memcached: the text protocol plus binary get/set.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_std::io::{self, BufRead, BufReader, Read, Write};
use async_std::net::TcpListener;
#[cfg(unix)]
use async_std::os::unix::net::UnixListener;
use async_std::prelude::*;
use async_std::task;
use byteorder::{BigEndian, ByteOrder};

struct Entry {
    value: Vec<u8>,
    flags: u32,
    cas: u64,
    expires: Option<Instant>,
}

impl Entry {
    fn alive(&self) -> bool {
        self.expires.map_or(true, |at| Instant::now() < at)
    }
}

#[derive(Default)]
struct Store {
    entries: HashMap<Vec<u8>, Entry>,
    next_cas: u64,
}

impl Store {
    fn live(&mut self, key: &[u8]) -> Option<&mut Entry> {
        if self.entries.get(key).map_or(false, |e| !e.alive()) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn put(&mut self, key: &[u8], value: Vec<u8>, flags: u32, exptime: i64) -> u64 {
        self.next_cas += 1;
        let entry = Entry {
            value,
            flags,
            cas: self.next_cas,
            expires: expires_at(exptime),
        };
        self.entries.insert(key.to_vec(), entry);
        self.next_cas
    }
}

fn expires_at(exptime: i64) -> Option<Instant> {
    match exptime {
        0 => None,
        t if t < 0 => Some(Instant::now()),
        t => Some(Instant::now() + Duration::from_secs(t as u64)),
    }
}

type Shared = Arc<Mutex<Store>>;

pub struct FakeServer {
    pub addr: String,
}

impl FakeServer {
    pub async fn start() -> FakeServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let store = Shared::default();
        task::spawn(async move {
            let mut incoming = listener.incoming();
            while let Some(Ok(stream)) = incoming.next().await {
                let store = store.clone();
                task::spawn(async move {
                    let _ = serve(stream, store).await;
                });
            }
        });
        FakeServer { addr }
    }

    /// Same server, listening on a Unix socket under the temp directory.
    #[cfg(unix)]
    pub async fn start_unix(name: &str) -> FakeServer {
        let path = socket_path(name);
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).await.unwrap();
        let store = Shared::default();
        task::spawn(async move {
            let mut incoming = listener.incoming();
            while let Some(Ok(stream)) = incoming.next().await {
                let store = store.clone();
                task::spawn(async move {
                    let _ = serve(stream, store).await;
                });
            }
        });
        FakeServer {
            addr: path.to_string_lossy().into_owned(),
        }
    }
}

fn socket_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("memcache-async-{}-{}.sock", std::process::id(), name))
}

/// Accepts connections, reads requests and never answers.
pub struct SilentServer {
    pub addr: String,
}

impl SilentServer {
    pub async fn start() -> SilentServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        task::spawn(async move {
            let mut incoming = listener.incoming();
            while let Some(Ok(mut stream)) = incoming.next().await {
                task::spawn(async move {
                    let mut buf = [0; 1024];
                    while let Ok(n) = stream.read(&mut buf).await {
                        if n == 0 {
                            break;
                        }
                    }
                });
            }
        });
        SilentServer { addr }
    }
}

/// Accepts connections and closes them straight away.
pub struct ClosingServer {
    pub addr: String,
}

impl ClosingServer {
    pub async fn start() -> ClosingServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        task::spawn(async move {
            let mut incoming = listener.incoming();
            while let Some(Ok(stream)) = incoming.next().await {
                drop(stream);
            }
        });
        ClosingServer { addr }
    }
}

async fn serve<S>(stream: S, store: Shared) -> io::Result<()>
where
    S: Read + Write + Clone + Unpin,
{
    let mut reader = BufReader::new(stream.clone());
    let mut writer = stream;
    loop {
        let mut first = [0; 1];
        if reader.read(&mut first).await? == 0 {
            return Ok(());
        }
        let reply = if first[0] == 0x80 {
            binary_request(first[0], &mut reader, &store).await?
        } else {
            text_request(first[0], &mut reader, &store).await?
        };
        writer.write_all(&reply).await?;
    }
}

async fn text_request<R: BufRead + Unpin>(
    first: u8,
    reader: &mut R,
    store: &Shared,
) -> io::Result<Vec<u8>> {
    let mut raw = vec![first];
    reader.read_until(b'\n', &mut raw).await?;
    let line = String::from_utf8_lossy(&raw).trim_end_matches("\r\n").to_owned();
    let parts: Vec<&str> = line.split(' ').collect();
    let mut out = Vec::new();
    match parts[0] {
        "get" | "gets" => {
            let mut store = store.lock().unwrap();
            for key in &parts[1..] {
                if let Some(entry) = store.live(key.as_bytes()) {
                    out.extend_from_slice(
                        format!("VALUE {} {} {}", key, entry.flags, entry.value.len()).as_bytes(),
                    );
                    if parts[0] == "gets" {
                        out.extend_from_slice(format!(" {}", entry.cas).as_bytes());
                    }
                    out.extend_from_slice(b"\r\n");
                    out.extend_from_slice(&entry.value);
                    out.extend_from_slice(b"\r\n");
                }
            }
            out.extend_from_slice(b"END\r\n");
        }
        verb @ "set" | verb @ "add" | verb @ "replace" | verb @ "append" | verb @ "prepend"
        | verb @ "cas" => {
            let key = parts[1].as_bytes();
            let flags: u32 = parts[2].parse().unwrap();
            let exptime: i64 = parts[3].parse().unwrap();
            let len: usize = parts[4].parse().unwrap();
            let mut data = vec![0; len + 2];
            reader.read_exact(&mut data).await?;
            data.truncate(len);
            let mut store = store.lock().unwrap();
            let exists = store.live(key).is_some();
            let reply: &[u8] = match verb {
                "add" if exists => b"NOT_STORED\r\n",
                "replace" | "append" | "prepend" if !exists => b"NOT_STORED\r\n",
                "cas" if !exists => b"NOT_FOUND\r\n",
                "cas" => {
                    let token: u64 = parts[5].parse().unwrap();
                    if store.live(key).map(|e| e.cas) == Some(token) {
                        store.put(key, data, flags, exptime);
                        b"STORED\r\n"
                    } else {
                        b"EXISTS\r\n"
                    }
                }
                "append" | "prepend" => {
                    let entry = store.live(key).unwrap();
                    let mut value = entry.value.clone();
                    if verb == "append" {
                        value.extend_from_slice(&data);
                    } else {
                        data.extend_from_slice(&value);
                        value = data;
                    }
                    let (flags, expires) = (entry.flags, entry.expires);
                    store.put(key, value, flags, 0);
                    store.entries.get_mut(key).unwrap().expires = expires;
                    b"STORED\r\n"
                }
                _ => {
                    store.put(key, data, flags, exptime);
                    b"STORED\r\n"
                }
            };
            out.extend_from_slice(reply);
        }
        "delete" => {
            let mut store = store.lock().unwrap();
            let key = parts[1].as_bytes();
            if store.live(key).is_some() {
                store.entries.remove(key);
                out.extend_from_slice(b"DELETED\r\n");
            } else {
                out.extend_from_slice(b"NOT_FOUND\r\n");
            }
        }
        verb @ "incr" | verb @ "decr" => {
            let delta: u64 = parts[2].parse().unwrap();
            let mut store = store.lock().unwrap();
            match store.live(parts[1].as_bytes()) {
                None => out.extend_from_slice(b"NOT_FOUND\r\n"),
                Some(entry) => {
                    let current = String::from_utf8_lossy(&entry.value).trim().parse::<u64>();
                    match current {
                        Ok(current) => {
                            let next = if verb == "incr" {
                                current.wrapping_add(delta)
                            } else {
                                current.saturating_sub(delta)
                            };
                            entry.value = next.to_string().into_bytes();
                            out.extend_from_slice(format!("{}\r\n", next).as_bytes());
                        }
                        Err(_) => out.extend_from_slice(
                            b"CLIENT_ERROR cannot increment or decrement non-numeric value\r\n",
                        ),
                    }
                }
            }
        }
        "touch" => {
            let exptime: i64 = parts[2].parse().unwrap();
            let mut store = store.lock().unwrap();
            match store.live(parts[1].as_bytes()) {
                Some(entry) => {
                    entry.expires = expires_at(exptime);
                    out.extend_from_slice(b"TOUCHED\r\n");
                }
                None => out.extend_from_slice(b"NOT_FOUND\r\n"),
            }
        }
        "flush_all" => {
            store.lock().unwrap().entries.clear();
            out.extend_from_slice(b"OK\r\n");
        }
        "version" => out.extend_from_slice(b"VERSION 1.6.0-fake\r\n"),
        "stats" => {
            let items = store.lock().unwrap().entries.len();
            out.extend_from_slice(
                format!("STAT pid {}\r\nSTAT curr_items {}\r\nEND\r\n", std::process::id(), items)
                    .as_bytes(),
            );
        }
        _ => out.extend_from_slice(b"ERROR\r\n"),
    }
    Ok(out)
}

async fn binary_request<R: BufRead + Unpin>(
    magic: u8,
    reader: &mut R,
    store: &Shared,
) -> io::Result<Vec<u8>> {
    let mut header = [magic; 24];
    reader.read_exact(&mut header[1..]).await?;
    let opcode = header[1];
    let key_length = BigEndian::read_u16(&header[2..4]) as usize;
    let extras_length = header[4] as usize;
    let body_length = BigEndian::read_u32(&header[8..12]) as usize;
    let mut body = vec![0; body_length];
    reader.read_exact(&mut body).await?;
    let key = body[extras_length..extras_length + key_length].to_vec();
    let value = body[extras_length + key_length..].to_vec();

    let mut store = store.lock().unwrap();
    let reply = match opcode {
        0x00 => match store.live(&key) {
            Some(entry) => {
                let mut extras = [0; 4];
                BigEndian::write_u32(&mut extras, entry.flags);
                binary_reply(opcode, 0, &extras, &entry.value, entry.cas)
            }
            None => binary_reply(opcode, 0x01, &[], b"Not found", 0),
        },
        0x01 => {
            let flags = BigEndian::read_u32(&body[0..4]);
            let exptime = BigEndian::read_u32(&body[4..8]) as i32;
            let cas = store.put(&key, value, flags, exptime as i64);
            binary_reply(opcode, 0, &[], &[], cas)
        }
        _ => binary_reply(opcode, 0x81, &[], b"Unknown command", 0),
    };
    Ok(reply)
}

fn binary_reply(opcode: u8, status: u16, extras: &[u8], value: &[u8], cas: u64) -> Vec<u8> {
    let mut header = [0; 24];
    header[0] = 0x81;
    header[1] = opcode;
    header[4] = extras.len() as u8;
    BigEndian::write_u16(&mut header[6..8], status);
    BigEndian::write_u32(&mut header[8..12], (extras.len() + value.len()) as u32);
    BigEndian::write_u64(&mut header[16..24], cas);
    let mut out = header.to_vec();
    out.extend_from_slice(extras);
    out.extend_from_slice(value);
    out
}
