//! Wire framing shared by the coordinator and storage nodes
//!
//! Control frame: `[LEN:u32 BE][JSON:LEN]`
//! Payload:       `[LEN:u64 BE][BYTES:LEN]`, moved in chunks of at most
//! [`CHUNK_SIZE`] bytes
//!
//! Every read takes the number of bytes the header declares, never "whatever
//! one receive call returned", so payloads whose length is a multiple of the
//! chunk size are handled like any other.
//!
//! All operations accept an optional deadline that bounds each individual
//! read or write. `None` blocks for as long as the peer does.

use crate::common::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// Largest slice of payload moved per read/write
pub const CHUNK_SIZE: usize = 8192;

/// Upper bound on a control frame, checked before allocating the body
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Pause after a failed accept (e.g. out of file descriptors)
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Run an I/O future under an optional deadline
pub async fn with_deadline<F, T>(deadline: Option<Duration>, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    let res = match deadline {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::Timeout(format!("{} timed out after {:?}", what, limit)))?,
        None => fut.await,
    };
    res.map_err(|e| map_io(what, e))
}

fn map_io(what: &str, e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::UnexpectedEof => {
            Error::Transport(format!("connection closed while reading {}", what))
        }
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::BrokenPipe => Error::Transport(format!("{}: {}", what, e)),
        _ => Error::Io(e),
    }
}

/// Open a request connection to `addr`
pub async fn connect(addr: &str, deadline: Option<Duration>) -> Result<TcpStream> {
    let stream = with_deadline(deadline, "connect", TcpStream::connect(addr))
        .await
        .map_err(|e| match e {
            Error::Io(io) => Error::Transport(format!("cannot reach {}: {}", addr, io)),
            other => other,
        })?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Serialize `msg` as JSON and send it as one control frame
pub async fn write_frame<W, T>(writer: &mut W, msg: &T, deadline: Option<Duration>) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(msg)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(Error::Protocol(format!(
            "frame too large: {} > {}",
            body.len(),
            MAX_FRAME_LEN
        )));
    }

    let len = (body.len() as u32).to_be_bytes();
    with_deadline(deadline, "frame header", writer.write_all(&len)).await?;
    with_deadline(deadline, "frame body", writer.write_all(&body)).await?;
    with_deadline(deadline, "frame flush", writer.flush()).await?;
    Ok(())
}

/// Receive one control frame and decode it.
/// Malformed JSON or an unknown `type` tag is a protocol error.
pub async fn read_frame<R, T>(reader: &mut R, deadline: Option<Duration>) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_bytes = [0u8; 4];
    with_deadline(deadline, "frame header", reader.read_exact(&mut len_bytes)).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;

    if len > MAX_FRAME_LEN {
        return Err(Error::Protocol(format!(
            "frame too large: {} > {}",
            len, MAX_FRAME_LEN
        )));
    }

    let mut body = vec![0u8; len];
    with_deadline(deadline, "frame body", reader.read_exact(&mut body)).await?;

    serde_json::from_slice(&body)
        .map_err(|e| Error::Protocol(format!("malformed message: {}", e)))
}

/// Send a payload of exactly `len` bytes taken from `source`.
///
/// Fails without padding if `source` runs dry early; the peer sees a short
/// stream and drops the transfer.
pub async fn write_payload<R, W>(
    source: &mut R,
    writer: &mut W,
    len: u64,
    deadline: Option<Duration>,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    with_deadline(deadline, "payload header", writer.write_all(&len.to_be_bytes())).await?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut sent = 0u64;
    while sent < len {
        let want = (len - sent).min(CHUNK_SIZE as u64) as usize;
        let n = source.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(Error::Internal(format!(
                "payload source ended after {} of {} bytes",
                sent, len
            )));
        }
        with_deadline(deadline, "payload", writer.write_all(&buf[..n])).await?;
        sent += n as u64;
    }

    with_deadline(deadline, "payload flush", writer.flush()).await?;
    Ok(sent)
}

/// Receive a payload into `sink`. The header must announce exactly
/// `expected` bytes; the body is then read to the last byte.
pub async fn read_payload<R, W>(
    reader: &mut R,
    sink: &mut W,
    expected: u64,
    deadline: Option<Duration>,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut len_bytes = [0u8; 8];
    with_deadline(deadline, "payload header", reader.read_exact(&mut len_bytes)).await?;
    let len = u64::from_be_bytes(len_bytes);

    if len != expected {
        return Err(Error::Protocol(format!(
            "payload length {} does not match declared size {}",
            len, expected
        )));
    }

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut received = 0u64;
    while received < len {
        let want = (len - received).min(CHUNK_SIZE as u64) as usize;
        let n = with_deadline(deadline, "payload", reader.read(&mut buf[..want])).await?;
        if n == 0 {
            return Err(Error::Transport(format!(
                "connection closed after {} of {} payload bytes",
                received, len
            )));
        }
        sink.write_all(&buf[..n]).await?;
        received += n as u64;
    }

    sink.flush().await?;
    Ok(received)
}
