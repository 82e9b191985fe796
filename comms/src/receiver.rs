//! The receiving half of a peer link.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{Deserialize, LEN_TYPE_SIZE, LenType, align::Align8};

/// Reads length-prefixed frames from an ordered byte stream.
pub struct WireReceiver<R: AsyncRead + Unpin> {
    rx: R,
}

impl<R: AsyncRead + Unpin> WireReceiver<R> {
    pub(super) fn new(rx: R) -> Self {
        Self { rx }
    }

    /// Reads the next frame into `buf` and decodes it in place.
    ///
    /// The returned `T` borrows from `buf`. The element type must be
    /// 8-aligned so a sparse-id payload can be reinterpreted as `&[u64]`
    /// without a copy; the frame header is one element wide, keeping the
    /// payload aligned behind it.
    ///
    /// # Errors
    /// Transport errors from the underlying reader, or a decode failure for
    /// a malformed frame.
    pub async fn recv_into<'buf, T, B>(&mut self, buf: &'buf mut Vec<B>) -> io::Result<T>
    where
        T: Deserialize<'buf>,
        B: Align8,
    {
        let mut prefix = [0; LEN_TYPE_SIZE];
        self.rx.read_exact(&mut prefix).await?;
        let frame_len = LenType::from_be_bytes(prefix) as usize;

        let elems = frame_len.div_ceil(size_of::<B>());
        buf.clear();
        buf.reserve(elems);

        // SAFETY: `reserve` on the emptied buffer guarantees capacity for
        // `elems`; the frame bytes are overwritten by the read below and the
        // padding tail past `frame_len` is never read.
        unsafe { buf.set_len(elems) };

        let bytes: &mut [u8] = bytemuck::cast_slice_mut(buf);
        let frame = &mut bytes[..frame_len];
        self.rx.read_exact(frame).await?;

        T::deserialize(frame)
    }
}
