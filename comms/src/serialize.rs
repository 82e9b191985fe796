/// Zero-copy serialization into a frame buffer.
///
/// Implementors append their fixed-size header and any encoded fields to
/// `buf`, and may return a borrowed tail slice that the sender writes after
/// the buffer without copying (bulk id / weight payloads).
pub trait Serialize<'a> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]>;
}
