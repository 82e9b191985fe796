use std::io;

/// Zero-copy deserialization from a received frame.
///
/// The returned value borrows from `buf`; bulk payloads are reinterpreted in
/// place rather than copied out.
pub trait Deserialize<'a>: Sized {
    fn deserialize(buf: &'a [u8]) -> io::Result<Self>;
}
