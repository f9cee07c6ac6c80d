//! Client side of the per-VM stats socket.
//!
//! Every VM exposes a unix socket under the node's socket directory. The
//! collectors talk to it with a request/response protocol:
//!
//! ```text
//! ┌────────────┬──────────────────────┐
//! │ Length (4) │ JSON body (Length)   │
//! └────────────┴──────────────────────┘
//! ```
//!
//! The length is a big-endian `u32`. One request is answered by exactly one
//! response on the same connection.

mod client;
mod protocol;
mod source;

pub use client::StatsClient;
pub use protocol::{StatsRequest, StatsResponse};
pub use source::SocketStatsSource;

use crate::error::{Result, VigilError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest frame either side will accept.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Write one length-prefixed JSON frame.
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes = serde_json::to_vec(msg).map_err(VigilError::protocol)?;
    if bytes.len() > MAX_FRAME_LEN {
        return Err(VigilError::protocol(format!("frame of {} bytes too large", bytes.len())));
    }

    writer.write_all(&(bytes.len() as u32).to_be_bytes()).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed JSON frame.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(VigilError::protocol(format!("frame of {} bytes too large", len)));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    serde_json::from_slice(&buf).map_err(VigilError::protocol)
}
