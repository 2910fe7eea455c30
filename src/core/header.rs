// Persisted queue header: start/end cursors and record count, big-endian at fixed offsets.
use crate::core::error::{Error, ErrorKind};
use crate::core::ring::{RingGeometry, PREFIX_LEN};

pub const START_OFFSET: usize = 0;
pub const END_OFFSET: usize = 4;
pub const COUNT_OFFSET: usize = 16;
const FIELD_LEN: usize = 4;

/// First byte of the circular data region, immediately after the count field.
pub const DATA_START: u32 = (COUNT_OFFSET + FIELD_LEN) as u32;
pub const MAX_FILE_SIZE: u32 = 5 * 1024 * 1024;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Header {
    pub start: u32,
    pub end: u32,
    pub count: u32,
}

impl Header {
    /// Reads the header from the mapped bytes.
    ///
    /// A zero cursor means a fresh file. A cursor equal to the file size was left by a
    /// record ending exactly at the boundary and wraps to the data start.
    pub fn read(map: &[u8], geometry: RingGeometry) -> Self {
        let cursor = |offset| match read_u32(map, offset) {
            0 => geometry.data_start(),
            pos if pos == geometry.file_size() => geometry.data_start(),
            pos => pos,
        };
        Self {
            start: cursor(START_OFFSET),
            end: cursor(END_OFFSET),
            count: read_u32(map, COUNT_OFFSET),
        }
    }

    pub fn validate(&self, geometry: RingGeometry) -> Result<(), Error> {
        if !geometry.contains(self.start) {
            return Err(invalid("start cursor out of range", START_OFFSET));
        }
        if !geometry.contains(self.end) {
            return Err(invalid("end cursor out of range", END_OFFSET));
        }
        if self.count == 0 {
            if self.start != self.end {
                return Err(invalid("empty queue with distinct cursors", COUNT_OFFSET));
            }
            return Ok(());
        }
        let used = self.used_bytes(geometry);
        if u64::from(self.count) * u64::from(PREFIX_LEN) > u64::from(used) {
            return Err(invalid("record count exceeds stored bytes", COUNT_OFFSET));
        }
        Ok(())
    }

    /// Stored bytes; equal cursors with records present mean a completely full ring.
    pub fn used_bytes(&self, geometry: RingGeometry) -> u32 {
        if self.count > 0 && self.start == self.end {
            return geometry.capacity();
        }
        geometry.distance(self.start, self.end)
    }

    /// Bytes a new framed record may occupy.
    ///
    /// One byte stays unused so pushes never produce a full ring with `start == end`;
    /// older files may still hold one.
    pub fn free_bytes(&self, geometry: RingGeometry) -> u32 {
        geometry
            .capacity()
            .saturating_sub(self.used_bytes(geometry))
            .saturating_sub(1)
    }
}

pub fn write_start(map: &mut [u8], value: u32) {
    write_u32(map, START_OFFSET, value);
}

pub fn write_end(map: &mut [u8], value: u32) {
    write_u32(map, END_OFFSET, value);
}

pub fn write_count(map: &mut [u8], value: u32) {
    write_u32(map, COUNT_OFFSET, value);
}

fn invalid(message: &str, offset: usize) -> Error {
    Error::new(ErrorKind::InvalidQueue)
        .with_message(message)
        .with_offset(offset as u64)
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut out = [0u8; FIELD_LEN];
    out.copy_from_slice(&buf[offset..offset + FIELD_LEN]);
    u32::from_be_bytes(out)
}

fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + FIELD_LEN].copy_from_slice(&value.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::{write_count, write_end, write_start, Header, DATA_START, MAX_FILE_SIZE};
    use crate::core::error::ErrorKind;
    use crate::core::ring::RingGeometry;

    fn geometry() -> RingGeometry {
        RingGeometry::new(DATA_START, 64).expect("geometry")
    }

    fn header(start: u32, end: u32, count: u32) -> Header {
        Header { start, end, count }
    }

    #[test]
    fn layout_constants() {
        assert_eq!(DATA_START, 20);
        assert_eq!(MAX_FILE_SIZE, 5_242_880);
    }

    #[test]
    fn fresh_file_defaults_cursors_to_data_start() {
        let map = vec![0u8; 64];
        let header = Header::read(&map, geometry());
        assert_eq!(header, Header { start: 20, end: 20, count: 0 });
        header.validate(geometry()).expect("fresh header is valid");
    }

    #[test]
    fn fields_are_big_endian_at_fixed_offsets() {
        let mut map = vec![0u8; 64];
        write_start(&mut map, 0x0102_0304);
        write_end(&mut map, 40);
        write_count(&mut map, 7);
        assert_eq!(&map[0..4], &[1, 2, 3, 4]);
        assert_eq!(&map[4..8], &[0, 0, 0, 40]);
        assert_eq!(&map[8..16], &[0u8; 8]);
        assert_eq!(&map[16..20], &[0, 0, 0, 7]);

        let header = Header::read(&map, geometry());
        assert_eq!(header.start, 0x0102_0304);
        assert_eq!(header.end, 40);
        assert_eq!(header.count, 7);
    }

    #[test]
    fn start_past_end_on_empty_queue_is_invalid() {
        let err = header(40, 30, 0).validate(geometry()).expect_err("invalid");
        assert_eq!(err.kind(), ErrorKind::InvalidQueue);
    }

    #[test]
    fn wrapped_cursors_are_valid() {
        // end wrapped past data start while start has not.
        header(50, 30, 2).validate(geometry()).expect("mid-wrap header");
    }

    #[test]
    fn cursors_outside_data_region_are_invalid() {
        for bad in [header(10, 20, 0), header(20, 64, 1), header(70, 70, 0)] {
            let err = bad.validate(geometry()).expect_err("out of range");
            assert_eq!(err.kind(), ErrorKind::InvalidQueue);
        }
    }

    #[test]
    fn count_must_match_cursors() {
        let err = header(30, 30, 12).validate(geometry()).expect_err("too many records");
        assert_eq!(err.kind(), ErrorKind::InvalidQueue);
        let err = header(20, 27, 2).validate(geometry()).expect_err("too many records");
        assert_eq!(err.kind(), ErrorKind::InvalidQueue);
        header(20, 28, 2).validate(geometry()).expect("two empty records");
    }

    #[test]
    fn cursor_at_file_end_wraps_to_data_start() {
        let mut map = vec![0u8; 64];
        write_end(&mut map, 64);
        write_count(&mut map, 1);
        let header = Header::read(&map, geometry());
        assert_eq!(header, Header { start: 20, end: 20, count: 1 });
        header.validate(geometry()).expect("record filling the ring");

        write_start(&mut map, 64);
        write_count(&mut map, 0);
        let header = Header::read(&map, geometry());
        assert_eq!(header, Header { start: 20, end: 20, count: 0 });
    }

    #[test]
    fn equal_cursors_with_records_mean_full() {
        let geometry = geometry();
        let full = header(30, 30, 3);
        full.validate(geometry).expect("full ring");
        assert_eq!(full.used_bytes(geometry), 44);
        assert_eq!(full.free_bytes(geometry), 0);
    }

    #[test]
    fn free_bytes_reserves_one_byte() {
        let geometry = geometry();
        assert_eq!(header(20, 20, 0).free_bytes(geometry), 43);
        assert_eq!(header(20, 30, 1).free_bytes(geometry), 33);
        assert_eq!(header(50, 30, 2).free_bytes(geometry), 19);
    }
}
