//! Fixed-size event payload codec
//!
//! Every tracepoint type carries a payload with a fixed byte layout. The
//! `EventPayload` trait is the capability contract between the producer side
//! (encode into the reserved slot) and the consumer side (decode from the
//! drained bytes).
//!
//! # The length contract
//!
//! `decode` must consume exactly as many bytes as `encode` wrote, and both
//! must equal `SIZE`. The drain loop advances `tail` by the decoded length;
//! a mismatch permanently desynchronizes `tail` from record boundaries and
//! corrupts every later record in the stream. Both paths carry debug
//! assertions, but the contract is ultimately the implementer's to keep —
//! there is no runtime framing that could detect a violation.

/// A value with a fixed-size binary layout, usable as a tracepoint payload.
///
/// Implementations are provided for the fixed-width integers and for small
/// tuples of payloads, which covers multi-argument events:
///
/// ```
/// use ringtrace::EventPayload;
///
/// let mut buf = [0u8; 12];
/// let written = (7u64, -3i32).encode(&mut buf);
/// let (decoded, consumed) = <(u64, i32)>::decode(&buf);
/// assert_eq!(decoded, (7, -3));
/// assert_eq!(written, consumed);
/// ```
pub trait EventPayload: Sized {
    /// Encoded size in bytes. Fixed per type.
    const SIZE: usize;

    /// Encode into `dst` (at least `SIZE` bytes). Returns bytes written,
    /// which must equal `SIZE`.
    fn encode(&self, dst: &mut [u8]) -> usize;

    /// Decode from `src` (at least `SIZE` bytes). Returns the value and the
    /// bytes consumed, which must equal `SIZE`.
    fn decode(src: &[u8]) -> (Self, usize);
}

macro_rules! int_payload {
    ($($t:ty),*) => {
        $(
            impl EventPayload for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn encode(&self, dst: &mut [u8]) -> usize {
                    dst[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                    Self::SIZE
                }

                fn decode(src: &[u8]) -> (Self, usize) {
                    let mut bytes = [0u8; std::mem::size_of::<$t>()];
                    bytes.copy_from_slice(&src[..Self::SIZE]);
                    (<$t>::from_le_bytes(bytes), Self::SIZE)
                }
            }
        )*
    };
}

int_payload!(u8, u16, u32, u64, i8, i16, i32, i64);

/// `usize` payloads hold values such as addresses or indices that are
/// meaningful only inside the producing process. Records containing them
/// must be decoded in the same address space that wrote them; nothing in
/// the ring buffer makes them portable.
impl EventPayload for usize {
    const SIZE: usize = std::mem::size_of::<usize>();

    fn encode(&self, dst: &mut [u8]) -> usize {
        dst[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
        Self::SIZE
    }

    fn decode(src: &[u8]) -> (Self, usize) {
        let mut bytes = [0u8; std::mem::size_of::<usize>()];
        bytes.copy_from_slice(&src[..Self::SIZE]);
        (usize::from_le_bytes(bytes), Self::SIZE)
    }
}

impl EventPayload for () {
    const SIZE: usize = 0;

    fn encode(&self, _dst: &mut [u8]) -> usize {
        0
    }

    fn decode(_src: &[u8]) -> (Self, usize) {
        ((), 0)
    }
}

impl<A: EventPayload, B: EventPayload> EventPayload for (A, B) {
    const SIZE: usize = A::SIZE + B::SIZE;

    fn encode(&self, dst: &mut [u8]) -> usize {
        let a = self.0.encode(&mut dst[..A::SIZE]);
        let b = self.1.encode(&mut dst[A::SIZE..A::SIZE + B::SIZE]);
        debug_assert_eq!(a + b, Self::SIZE);
        a + b
    }

    fn decode(src: &[u8]) -> (Self, usize) {
        let (a, used_a) = A::decode(&src[..A::SIZE]);
        let (b, used_b) = B::decode(&src[A::SIZE..A::SIZE + B::SIZE]);
        debug_assert_eq!(used_a + used_b, Self::SIZE);
        ((a, b), used_a + used_b)
    }
}

impl<A: EventPayload, B: EventPayload, C: EventPayload> EventPayload for (A, B, C) {
    const SIZE: usize = A::SIZE + B::SIZE + C::SIZE;

    fn encode(&self, dst: &mut [u8]) -> usize {
        let mut at = self.0.encode(&mut dst[..A::SIZE]);
        at += self.1.encode(&mut dst[at..at + B::SIZE]);
        at += self.2.encode(&mut dst[at..at + C::SIZE]);
        debug_assert_eq!(at, Self::SIZE);
        at
    }

    fn decode(src: &[u8]) -> (Self, usize) {
        let (a, mut at) = A::decode(&src[..A::SIZE]);
        let (b, used_b) = B::decode(&src[at..at + B::SIZE]);
        at += used_b;
        let (c, used_c) = C::decode(&src[at..at + C::SIZE]);
        at += used_c;
        debug_assert_eq!(at, Self::SIZE);
        ((a, b, c), at)
    }
}
