//! HandlerSocket client over TCP.
//!
//! Requests and responses are single lines of tab-separated tokens. Bytes
//! below 0x10 inside a token are written as 0x01 followed by the byte plus
//! 0x40; a lone 0x00 token stands for NULL.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, warn};

use super::{AccelChannel, AccelConnector, ChannelError};
use crate::db::Value;
use crate::error::{Result, StewardError};

/// Index name sent when none is given.
const PRIMARY_INDEX: &str = "PRIMARY";

/// Opens [`HandlerSocketChannel`]s.
#[derive(Debug, Clone)]
pub struct HandlerSocketConnector {
    timeout: Duration,
}

impl HandlerSocketConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl AccelConnector for HandlerSocketConnector {
    type Channel = HandlerSocketChannel;

    fn connect_writer(&self, host: &str, port: u16) -> Result<HandlerSocketChannel> {
        HandlerSocketChannel::connect(host, port, self.timeout)
    }
}

/// One HandlerSocket connection.
#[derive(Debug)]
pub struct HandlerSocketChannel {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    /// A request whose response was not read leaves the stream out of step.
    broken: bool,
}

impl HandlerSocketChannel {
    /// Connects to `host:port`, applying `timeout` to connect, reads and writes.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let connect_error = |e: std::io::Error| {
            StewardError::connection(format!("Connect error: {host}:{port}: {e}"))
        };

        let addr = (host, port)
            .to_socket_addrs()
            .map_err(connect_error)?
            .next()
            .ok_or_else(|| {
                StewardError::connection(format!("Connect error: {host}:{port} did not resolve"))
            })?;

        let stream = TcpStream::connect_timeout(&addr, timeout).map_err(connect_error)?;
        stream.set_read_timeout(Some(timeout)).map_err(connect_error)?;
        stream.set_write_timeout(Some(timeout)).map_err(connect_error)?;
        stream.set_nodelay(true).map_err(connect_error)?;

        let writer = stream.try_clone().map_err(connect_error)?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
            broken: false,
        })
    }

    /// Sends one request line and returns the response tokens after the status.
    fn request(&mut self, tokens: &[Vec<u8>]) -> std::result::Result<Vec<Vec<u8>>, ChannelError> {
        if self.broken {
            return Err(ChannelError::io("connection unusable after an earlier failure"));
        }
        match self.exchange(tokens) {
            Ok(response) => parse_response(response),
            Err(e) => {
                warn!(error = %e, "HandlerSocket connection lost");
                self.broken = true;
                Err(e)
            }
        }
    }

    /// Writes one request line and reads one response line.
    fn exchange(&mut self, tokens: &[Vec<u8>]) -> std::result::Result<Vec<u8>, ChannelError> {
        let mut line = tokens.join(&b'\t');
        line.push(b'\n');
        self.writer
            .write_all(&line)
            .and_then(|()| self.writer.flush())
            .map_err(|e| ChannelError::io(format!("write: {e}")))?;

        let mut response = Vec::new();
        let read = self
            .reader
            .read_until(b'\n', &mut response)
            .map_err(|e| ChannelError::io(format!("read: {e}")))?;
        if read == 0 {
            return Err(ChannelError::io("read: eof"));
        }
        Ok(response)
    }
}

/// Splits a response line; status `0` is success, anything else carries an error token.
fn parse_response(mut response: Vec<u8>) -> std::result::Result<Vec<Vec<u8>>, ChannelError> {
    if response.last() == Some(&b'\n') {
        response.pop();
    }

    let mut fields = response.split(|b| *b == b'\t').map(decode_token);
    let status = fields.next().unwrap_or_default();
    let rest: Vec<Vec<u8>> = fields.collect();

    if status.as_slice() == b"0" {
        return Ok(rest);
    }

    // Error response: status, column count, error token.
    let code = rest
        .get(1)
        .map(|token| String::from_utf8_lossy(token).into_owned())
        .unwrap_or_else(|| String::from_utf8_lossy(&status).into_owned());
    Err(ChannelError::new(code))
}

impl AccelChannel for HandlerSocketChannel {
    fn open_index(
        &mut self,
        id: u32,
        database: &str,
        table: &str,
        index: &str,
        columns: &str,
    ) -> std::result::Result<(), ChannelError> {
        let index = if index.is_empty() { PRIMARY_INDEX } else { index };
        debug!(id, database, table, index, columns, "HandlerSocket open index");
        self.request(&[
            b"P".to_vec(),
            id.to_string().into_bytes(),
            encode_token(database.as_bytes()),
            encode_token(table.as_bytes()),
            encode_token(index.as_bytes()),
            encode_token(columns.as_bytes()),
        ])
        .map(|_| ())
    }

    fn insert(&mut self, id: u32, values: &[Value]) -> std::result::Result<(), ChannelError> {
        let mut tokens = Vec::with_capacity(values.len() + 3);
        tokens.push(id.to_string().into_bytes());
        tokens.push(b"+".to_vec());
        tokens.push(values.len().to_string().into_bytes());
        tokens.extend(values.iter().map(encode_value));
        self.request(&tokens).map(|_| ())
    }

    fn is_broken(&self) -> bool {
        self.broken
    }
}

/// Escapes bytes below 0x10.
fn encode_token(raw: &[u8]) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(raw.len());
    for &byte in raw {
        if byte < 0x10 {
            encoded.push(0x01);
            encoded.push(byte + 0x40);
        } else {
            encoded.push(byte);
        }
    }
    encoded
}

fn decode_token(raw: &[u8]) -> Vec<u8> {
    let mut decoded = Vec::with_capacity(raw.len());
    let mut bytes = raw.iter();
    while let Some(&byte) = bytes.next() {
        match byte {
            0x01 => {
                if let Some(&next) = bytes.next() {
                    decoded.push(next.wrapping_sub(0x40));
                }
            }
            _ => decoded.push(byte),
        }
    }
    decoded
}

fn encode_value(value: &Value) -> Vec<u8> {
    match value {
        Value::Null => vec![0x00],
        Value::Bytes(bytes) => encode_token(bytes),
        Value::String(text) => encode_token(text.as_bytes()),
        Value::Bool(b) => vec![if *b { b'1' } else { b'0' }],
        other => encode_token(other.to_display_string().as_bytes()),
    }
}
