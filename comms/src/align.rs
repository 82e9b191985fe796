// Trait to generalize over primitive number types that are 1 byte aligned.
pub trait Align1: bytemuck::Pod {}

impl Align1 for u8 {}
impl Align1 for u32 {}
impl Align1 for u64 {}
impl Align1 for f32 {}
impl Align1 for f64 {}

// Trait to generalize over primitive number types that are 8 bytes aligned.
//
// Receive buffers must be 8-aligned because sparse-id payloads are cast to
// `&[u64]` in place.
pub trait Align8: Align1 {}

impl Align8 for u64 {}
impl Align8 for f64 {}
