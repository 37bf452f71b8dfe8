//! Client and server wire sessions
//!
//! Every operation takes a deadline; `Duration::ZERO` means no deadline.
//! Deadlines are applied with `tokio::time::timeout` around the whole
//! operation, so a stalled peer cannot pin a session task forever.
//!
//! Sessions buffer both directions with `BufStream`; a CHAIN frame is
//! assembled in memory and written with a single flush so the record
//! payload never interleaves with other traffic.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use parchment_protocol::{encode_chain, Chain, ProtocolError, Record, MAX_FIELD_LEN};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};

use crate::{cmd, Address, NetError, Result, MAGIC, VERSION};

/// Stream types a session can run over
pub trait SessionStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> SessionStream for T {}

/// Run `fut` under `deadline`; a zero deadline disables the timeout
async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if deadline.is_zero() {
        fut.await
    } else {
        match tokio::time::timeout(deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(NetError::Timeout),
        }
    }
}

/// Build a 9-byte CONNECT / CONNECT_ACK frame
fn handshake_frame(command: u8) -> [u8; 9] {
    let mut frame = [0u8; 9];
    frame[0] = command;
    frame[1..5].copy_from_slice(&MAGIC.to_le_bytes());
    frame[5..9].copy_from_slice(&VERSION.to_le_bytes());
    frame
}

/// Validate a received handshake frame
fn check_handshake(frame: &[u8; 9], expected_command: u8) -> Result<()> {
    if frame[0] != expected_command {
        return Err(NetError::UnexpectedCommand {
            expected: expected_command,
            got: frame[0],
        });
    }
    let magic = u32::from_le_bytes([frame[1], frame[2], frame[3], frame[4]]);
    let version = u32::from_le_bytes([frame[5], frame[6], frame[7], frame[8]]);
    if magic != MAGIC || version != VERSION {
        return Err(NetError::Handshake { magic, version });
    }
    Ok(())
}

/// Producer-side session: dials, handshakes, sends acknowledged chains
pub struct Session {
    io: BufStream<Box<dyn SessionStream>>,
}

impl Session {
    /// Dial `address` and perform the client handshake
    ///
    /// The deadline covers the dial and the handshake together.
    pub async fn connect(address: &Address, deadline: Duration) -> Result<Self> {
        with_deadline(deadline, async {
            let stream = address.connect().await.map_err(|e| NetError::Connect {
                address: address.to_string(),
                source: e,
            })?;
            Session::handshake(stream).await
        })
        .await
    }

    /// Perform the client handshake over an established stream
    pub async fn handshake(stream: Box<dyn SessionStream>) -> Result<Self> {
        let mut io = BufStream::new(stream);
        io.write_all(&handshake_frame(cmd::CONNECT)).await?;
        io.flush().await?;

        let mut frame = [0u8; 9];
        io.read_exact(&mut frame).await?;
        check_handshake(&frame, cmd::CONNECT_ACK)?;
        Ok(Session { io })
    }

    /// Send a chain and wait for its acknowledgement
    ///
    /// Fails on any I/O error, on an unexpected command byte, and on an
    /// acknowledgement count that does not match the number of records
    /// sent. After a failure the session is unusable; drop it and
    /// reconnect.
    pub async fn write_chain(&mut self, chain: &Chain, deadline: Duration) -> Result<()> {
        let count = chain.len() as u32;
        with_deadline(deadline, async {
            let mut frame = Vec::with_capacity(5 + chain.encoded_len());
            frame.push(cmd::CHAIN);
            frame.extend_from_slice(&count.to_le_bytes());
            encode_chain(&mut frame, chain);
            self.io.write_all(&frame).await?;
            self.io.flush().await?;

            let mut ack = [0u8; 5];
            self.io.read_exact(&mut ack).await?;
            if ack[0] != cmd::CHAIN_ACK {
                return Err(NetError::UnexpectedCommand {
                    expected: cmd::CHAIN_ACK,
                    got: ack[0],
                });
            }
            let acked = u32::from_le_bytes([ack[1], ack[2], ack[3], ack[4]]);
            if acked != count {
                return Err(NetError::AckMismatch {
                    expected: count,
                    got: acked,
                });
            }
            Ok(())
        })
        .await
    }
}

/// Router-side session: handshakes, reads chains, acknowledges them
///
/// `acknowledge_last` must be called only after the chain returned by
/// `read` has been durably accepted downstream; the producer treats the
/// acknowledgement as a delivery commitment.
pub struct ServerSession {
    io: BufStream<Box<dyn SessionStream>>,
    last_read_count: u32,
}

impl ServerSession {
    /// Perform the server handshake on an accepted stream
    pub async fn accept(stream: Box<dyn SessionStream>, deadline: Duration) -> Result<Self> {
        with_deadline(deadline, async {
            let mut io = BufStream::new(stream);
            let mut frame = [0u8; 9];
            io.read_exact(&mut frame).await?;
            check_handshake(&frame, cmd::CONNECT)?;

            io.write_all(&handshake_frame(cmd::CONNECT_ACK)).await?;
            io.flush().await?;
            Ok(ServerSession {
                io,
                last_read_count: 0,
            })
        })
        .await
    }

    /// Read the next chain from the peer
    ///
    /// Returns `Ok(None)` when the peer closed the connection cleanly
    /// between frames. EOF inside a frame is an error.
    pub async fn read(&mut self, deadline: Duration) -> Result<Option<Chain>> {
        let chain = with_deadline(deadline, async {
            let mut command = [0u8; 1];
            if self.io.read(&mut command).await? == 0 {
                return Ok(None);
            }
            if command[0] != cmd::CHAIN {
                return Err(NetError::UnexpectedCommand {
                    expected: cmd::CHAIN,
                    got: command[0],
                });
            }

            let count = self.io.read_u32_le().await?;
            let mut chain = Chain::new();
            for _ in 0..count {
                let category = read_field(&mut self.io).await?;
                let message = read_field(&mut self.io).await?;
                chain.push(Record { category, message });
            }
            Ok(Some(chain))
        })
        .await?;

        if let Some(chain) = &chain {
            self.last_read_count = chain.len() as u32;
        }
        Ok(chain)
    }

    /// Raw access to the buffered stream, for protocol-violation tests
    #[cfg(test)]
    pub(crate) fn io_mut(&mut self) -> &mut BufStream<Box<dyn SessionStream>> {
        &mut self.io
    }

    /// Acknowledge the most recently read chain
    pub async fn acknowledge_last(&mut self, deadline: Duration) -> Result<()> {
        let count = self.last_read_count;
        with_deadline(deadline, async {
            let mut frame = [0u8; 5];
            frame[0] = cmd::CHAIN_ACK;
            frame[1..5].copy_from_slice(&count.to_le_bytes());
            self.io.write_all(&frame).await?;
            self.io.flush().await?;
            Ok(())
        })
        .await
    }
}

/// Read one varint-prefixed field from the buffered stream
async fn read_field(io: &mut BufStream<Box<dyn SessionStream>>) -> Result<Bytes> {
    let len = read_varint(io).await?;
    if len > MAX_FIELD_LEN as u64 {
        return Err(ProtocolError::FieldTooLarge {
            len,
            max: MAX_FIELD_LEN,
        }
        .into());
    }
    let mut buf = vec![0u8; len as usize];
    io.read_exact(&mut buf).await?;
    Ok(Bytes::from(buf))
}

/// Read an unsigned LEB128 varint byte by byte
///
/// Byte-at-a-time reads are cheap here: the stream is buffered, and a
/// length prefix is at most ten bytes.
async fn read_varint(io: &mut BufStream<Box<dyn SessionStream>>) -> Result<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        if shift >= 64 {
            return Err(ProtocolError::VarintOverflow.into());
        }
        let byte = io.read_u8().await?;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}
