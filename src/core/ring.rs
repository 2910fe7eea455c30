//! Purpose: Circular data-region geometry and the length-prefixed record codec.
//! Exports: `RingGeometry`, `Placement`, `encode_at`, `decode_at`, `framed_len`, `PREFIX_LEN`.
//! Role: Pure byte-level layer used by `queue`; never touches the header fields.
//! Invariants: Positions are absolute file offsets in `[data_start, file_size)`.
//! Invariants: Callers check admission before `encode_at`; the codec never rolls back.
use crate::core::error::{Error, ErrorKind};

pub const PREFIX_LEN: u32 = 4;
const PREFIX: usize = PREFIX_LEN as usize;

/// Bounds of the circular region inside the mapped file.
///
/// All cursor arithmetic goes through this type so wraparound is handled in one place.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RingGeometry {
    data_start: u32,
    file_size: u32,
}

impl RingGeometry {
    pub fn new(data_start: u32, file_size: u32) -> Result<Self, Error> {
        let min_size = u64::from(data_start) + u64::from(PREFIX_LEN) + 1;
        if u64::from(file_size) < min_size {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("file size must be at least {min_size} bytes")));
        }
        Ok(Self {
            data_start,
            file_size,
        })
    }

    pub fn data_start(&self) -> u32 {
        self.data_start
    }

    pub fn file_size(&self) -> u32 {
        self.file_size
    }

    pub fn capacity(&self) -> u32 {
        self.file_size - self.data_start
    }

    pub fn contains(&self, pos: u32) -> bool {
        pos >= self.data_start && pos < self.file_size
    }

    /// Moves `pos` forward by `len` bytes, wrapping through `data_start`.
    pub fn advance(&self, pos: u32, len: u32) -> u32 {
        debug_assert!(self.contains(pos));
        let offset = u64::from(pos - self.data_start) + u64::from(len);
        self.data_start + (offset % u64::from(self.capacity())) as u32
    }

    /// Bytes between `from` and `to` walking forward around the ring.
    pub fn distance(&self, from: u32, to: u32) -> u32 {
        if to >= from {
            to - from
        } else {
            self.capacity() - (from - to)
        }
    }

    fn contiguous(&self, pos: u32) -> u32 {
        self.file_size - pos
    }
}

/// How a framed record lands relative to the wrap boundary.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Placement {
    Contiguous,
    SplitPayload,
    SplitPrefix,
}

impl Placement {
    pub fn of(geometry: RingGeometry, pos: u32, payload_len: u32) -> Self {
        let contiguous = u64::from(geometry.contiguous(pos));
        if contiguous >= u64::from(PREFIX_LEN) + u64::from(payload_len) {
            Placement::Contiguous
        } else if contiguous >= u64::from(PREFIX_LEN) {
            Placement::SplitPayload
        } else {
            Placement::SplitPrefix
        }
    }
}

pub fn framed_len(payload_len: usize) -> Result<u32, Error> {
    u32::try_from(payload_len)
        .ok()
        .and_then(|len| len.checked_add(PREFIX_LEN))
        .ok_or_else(|| Error::new(ErrorKind::Usage).with_message("payload too large"))
}

/// Writes one framed record at `end` and returns the cursor just past it.
pub fn encode_at(map: &mut [u8], geometry: RingGeometry, end: u32, payload: &[u8]) -> u32 {
    let len = payload.len() as u32;
    let prefix = len.to_be_bytes();
    let at = end as usize;
    let ds = geometry.data_start as usize;
    let fs = geometry.file_size as usize;

    match Placement::of(geometry, end, len) {
        Placement::Contiguous => {
            map[at..at + PREFIX].copy_from_slice(&prefix);
            map[at + PREFIX..at + PREFIX + payload.len()].copy_from_slice(payload);
        }
        Placement::SplitPayload => {
            let head = fs - at - PREFIX;
            map[at..at + PREFIX].copy_from_slice(&prefix);
            map[at + PREFIX..fs].copy_from_slice(&payload[..head]);
            map[ds..ds + payload.len() - head].copy_from_slice(&payload[head..]);
        }
        Placement::SplitPrefix => {
            let head = fs - at;
            let tail = PREFIX - head;
            map[at..fs].copy_from_slice(&prefix[..head]);
            map[ds..ds + tail].copy_from_slice(&prefix[head..]);
            map[ds + tail..ds + tail + payload.len()].copy_from_slice(payload);
        }
    }

    geometry.advance(end, PREFIX_LEN + len)
}

/// Reads the framed record at `start`; `used` bounds the length prefix.
///
/// Returns the payload and the cursor just past the record.
pub fn decode_at(
    map: &[u8],
    geometry: RingGeometry,
    start: u32,
    used: u32,
) -> Result<(Vec<u8>, u32), Error> {
    let mut prefix = [0u8; PREFIX];
    let payload_start = read_at(map, geometry, start, &mut prefix);
    let len = u32::from_be_bytes(prefix);
    let fits = len
        .checked_add(PREFIX_LEN)
        .is_some_and(|framed| framed <= used);
    if !fits {
        return Err(Error::new(ErrorKind::InvalidQueue)
            .with_message(format!("record length {len} exceeds stored bytes"))
            .with_offset(u64::from(start)));
    }

    let mut payload = vec![0u8; len as usize];
    let next = read_at(map, geometry, payload_start, &mut payload);
    Ok((payload, next))
}

fn read_at(map: &[u8], geometry: RingGeometry, pos: u32, out: &mut [u8]) -> u32 {
    let at = pos as usize;
    let head = (geometry.contiguous(pos) as usize).min(out.len());
    out[..head].copy_from_slice(&map[at..at + head]);
    let tail = out.len() - head;
    if tail > 0 {
        let ds = geometry.data_start as usize;
        out[head..].copy_from_slice(&map[ds..ds + tail]);
    }
    geometry.advance(pos, out.len() as u32)
}

#[cfg(test)]
mod tests {
    use super::{decode_at, encode_at, framed_len, Placement, RingGeometry, PREFIX_LEN};
    use crate::core::error::ErrorKind;

    // Data region 20..32, twelve bytes of capacity.
    fn small() -> (RingGeometry, Vec<u8>) {
        let geometry = RingGeometry::new(20, 32).expect("geometry");
        (geometry, vec![0u8; 32])
    }

    #[test]
    fn geometry_rejects_tiny_files() {
        let err = RingGeometry::new(20, 24).expect_err("too small");
        assert_eq!(err.kind(), ErrorKind::Usage);
        RingGeometry::new(20, 25).expect("smallest valid");
    }

    #[test]
    fn advance_wraps_to_data_start() {
        let (geometry, _) = small();
        assert_eq!(geometry.capacity(), 12);
        assert_eq!(geometry.advance(20, 5), 25);
        assert_eq!(geometry.advance(30, 2), 20);
        assert_eq!(geometry.advance(30, 7), 25);
        assert_eq!(geometry.advance(31, 12), 31);
    }

    #[test]
    fn distance_is_wrap_aware() {
        let (geometry, _) = small();
        assert_eq!(geometry.distance(22, 22), 0);
        assert_eq!(geometry.distance(22, 27), 5);
        assert_eq!(geometry.distance(30, 21), 3);
    }

    #[test]
    fn contiguous_record() {
        let (geometry, mut map) = small();
        assert_eq!(Placement::of(geometry, 20, 3), Placement::Contiguous);
        let end = encode_at(&mut map, geometry, 20, b"abc");
        assert_eq!(end, 27);
        assert_eq!(&map[20..24], &3u32.to_be_bytes());
        assert_eq!(&map[24..27], b"abc");

        let (payload, next) = decode_at(&map, geometry, 20, 7).expect("decode");
        assert_eq!(payload, b"abc");
        assert_eq!(next, 27);
    }

    #[test]
    fn record_ending_on_boundary_wraps_cursor() {
        let (geometry, mut map) = small();
        let end = encode_at(&mut map, geometry, 26, b"xy");
        assert_eq!(end, 20);
        let (payload, next) = decode_at(&map, geometry, 26, 6).expect("decode");
        assert_eq!(payload, b"xy");
        assert_eq!(next, 20);
    }

    #[test]
    fn payload_split_across_boundary() {
        let (geometry, mut map) = small();
        assert_eq!(Placement::of(geometry, 26, 5), Placement::SplitPayload);
        let end = encode_at(&mut map, geometry, 26, b"hello");
        assert_eq!(end, 23);
        assert_eq!(&map[26..30], &5u32.to_be_bytes());
        assert_eq!(&map[30..32], b"he");
        assert_eq!(&map[20..23], b"llo");

        let (payload, next) = decode_at(&map, geometry, 26, 9).expect("decode");
        assert_eq!(payload, b"hello");
        assert_eq!(next, 23);
    }

    #[test]
    fn prefix_exactly_fills_tail() {
        let (geometry, mut map) = small();
        assert_eq!(Placement::of(geometry, 28, 3), Placement::SplitPayload);
        let end = encode_at(&mut map, geometry, 28, b"xyz");
        assert_eq!(end, 23);
        assert_eq!(&map[20..23], b"xyz");
        let (payload, _) = decode_at(&map, geometry, 28, 7).expect("decode");
        assert_eq!(payload, b"xyz");
    }

    #[test]
    fn prefix_split_across_boundary() {
        let (geometry, mut map) = small();
        assert_eq!(Placement::of(geometry, 30, 3), Placement::SplitPrefix);
        let end = encode_at(&mut map, geometry, 30, b"xyz");
        assert_eq!(end, 25);
        assert_eq!(&map[30..32], &[0, 0]);
        assert_eq!(&map[20..22], &[0, 3]);
        assert_eq!(&map[22..25], b"xyz");

        let (payload, next) = decode_at(&map, geometry, 30, 7).expect("decode");
        assert_eq!(payload, b"xyz");
        assert_eq!(next, 25);
    }

    #[test]
    fn empty_payload_is_just_a_prefix() {
        let (geometry, mut map) = small();
        let end = encode_at(&mut map, geometry, 29, b"");
        assert_eq!(end, 21);
        let (payload, next) = decode_at(&map, geometry, 29, PREFIX_LEN).expect("decode");
        assert!(payload.is_empty());
        assert_eq!(next, 21);
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        let (geometry, mut map) = small();
        map[20..24].copy_from_slice(&100u32.to_be_bytes());
        let err = decode_at(&map, geometry, 20, 11).expect_err("corrupt length");
        assert_eq!(err.kind(), ErrorKind::InvalidQueue);

        map[20..24].copy_from_slice(&u32::MAX.to_be_bytes());
        let err = decode_at(&map, geometry, 20, 11).expect_err("overflowing length");
        assert_eq!(err.kind(), ErrorKind::InvalidQueue);
    }

    #[test]
    fn framed_len_adds_prefix() {
        assert_eq!(framed_len(0).expect("len"), 4);
        assert_eq!(framed_len(10).expect("len"), 14);
        assert!(framed_len(u32::MAX as usize).is_err());
    }
}
