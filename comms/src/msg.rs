use std::{borrow::Cow, io};

use crate::{Deserialize, Serialize};

type Header = u64;
const HEADER_SIZE: usize = size_of::<Header>();

/// The payload data for the `Data` variant of the `Msg` enum.
///
/// Bulk payloads are cast in place, never re-encoded. The header is a full
/// word so that an id payload stays 8-aligned inside an 8-aligned receive
/// buffer.
#[derive(Debug)]
pub enum Payload<'a> {
    /// Sparse embedding ids routed to their owning shard.
    Ids(&'a [u64]),
    /// Per-id sample weights for weighted features.
    SampleWeights(&'a [f32]),
}

/// The command for the `Control` variant of the `Msg` enum.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Announces one table's bucket for `round`. The ids payload frame
    /// follows immediately, then a sample-weight frame when `weighted`.
    Bucket {
        round: u64,
        table: String,
        weighted: bool,
    },
    /// Every bucket of `round` has been sent; the peer's contribution to the
    /// all-to-all is complete.
    EndOfRound { round: u64 },
    Disconnect,
}

/// The application layer message for rank-to-rank links.
#[derive(Debug)]
pub enum Msg<'a> {
    Control(Command),
    Data(Payload<'a>),
    Err(Cow<'a, str>),
}

impl Msg<'_> {
    fn buf_is_too_small<T>(size: usize) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("The given buffer is too small {size}, must at least be {HEADER_SIZE} bytes"),
        ))
    }

    fn invalid_kind_byte<T>(byte: u8) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Received an invalid kind byte {byte}"),
        ))
    }

    fn misaligned_payload<T>(err: bytemuck::PodCastError) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Bulk payload cannot be cast in place: {err}"),
        ))
    }
}

impl<'a> Serialize<'a> for Msg<'a> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]> {
        match self {
            Msg::Err(e) => {
                let header = (0 as Header).to_be_bytes();
                buf.extend_from_slice(&header);
                Some(e.as_bytes())
            }
            Msg::Control(cmd) => {
                let header = (1 as Header).to_be_bytes();
                buf.extend_from_slice(&header);

                // SAFETY: Serialize impl for `Command` is derived and not implemented
                //         by hand. Nor has a non string-key map inside.
                serde_json::to_writer(buf, &cmd).unwrap();
                None
            }
            Msg::Data(payload) => {
                let (kind, bytes): (Header, &[u8]) = match payload {
                    Payload::Ids(ids) => (2, bytemuck::cast_slice(ids)),
                    Payload::SampleWeights(weights) => (3, bytemuck::cast_slice(weights)),
                };

                buf.extend_from_slice(&kind.to_be_bytes());
                Some(bytes)
            }
        }
    }
}

impl<'a> Deserialize<'a> for Msg<'a> {
    fn deserialize(buf: &'a [u8]) -> io::Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Self::buf_is_too_small(buf.len());
        }

        let (kind_buf, rest) = buf.split_at(HEADER_SIZE);

        // SAFETY: We splitted the buffer to be of size `HEADER_SIZE` just above.
        let kind = Header::from_be_bytes(kind_buf.try_into().unwrap());

        match kind {
            0 => {
                let string = str::from_utf8(rest)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

                Ok(Self::Err(Cow::Borrowed(string)))
            }
            1 => {
                let cmd = serde_json::from_slice(rest)?;
                Ok(Self::Control(cmd))
            }
            2 => match bytemuck::try_cast_slice(rest) {
                Ok(ids) => Ok(Self::Data(Payload::Ids(ids))),
                Err(e) => Self::misaligned_payload(e),
            },
            3 => match bytemuck::try_cast_slice(rest) {
                Ok(weights) => Ok(Self::Data(Payload::SampleWeights(weights))),
                Err(e) => Self::misaligned_payload(e),
            },
            kind => Self::invalid_kind_byte(kind as u8),
        }
    }
}
