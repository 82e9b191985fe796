//! The sending half of a peer link.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{LEN_TYPE_SIZE, LenType, Serialize};

/// Writes length-prefixed frames onto an ordered byte stream.
///
/// Bulk id and sample-weight payloads are written straight from the caller's
/// slices, after the encoded frame head; only the length prefix and the frame
/// header pass through the internal scratch buffer.
pub struct WireSender<W>
where
    W: AsyncWrite + Unpin,
{
    tx: W,
    scratch: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> WireSender<W> {
    pub(super) fn new(tx: W) -> Self {
        Self {
            tx,
            scratch: Vec::new(),
        }
    }

    /// Encodes `msg` as one frame and flushes it.
    ///
    /// # Errors
    /// Any transport error from the underlying writer.
    pub async fn send<'a, T: Serialize<'a>>(&mut self, msg: &'a T) -> io::Result<()> {
        let Self { scratch, tx } = self;

        scratch.clear();
        scratch.resize(LEN_TYPE_SIZE, 0);

        let tail = msg.serialize(scratch);
        let tail_len = tail.map(<[_]>::len).unwrap_or_default();
        let frame_len = (scratch.len() - LEN_TYPE_SIZE + tail_len) as LenType;

        scratch[..LEN_TYPE_SIZE].copy_from_slice(&frame_len.to_be_bytes());
        tx.write_all(scratch).await?;

        if let Some(tail) = tail {
            tx.write_all(tail).await?;
        }

        tx.flush().await
    }
}
