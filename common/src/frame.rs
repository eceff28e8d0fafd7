use bytes::Bytes;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// One encoded JPEG image cut out of the ffmpeg stream.
///
/// `seq` is assigned by the boundary parser in arrival order, starting at 1.
/// It is the identity used in every pacing event, so it must never be reused
/// within a stream.
#[derive(Debug, Clone)]
pub struct Frame {
    pub jpeg: Bytes,
    pub captured_at_ms: i64,
    pub seq: u64,
}

impl Frame {
    pub fn new(jpeg: impl Into<Bytes>, captured_at_ms: i64, seq: u64) -> Self {
        Self {
            jpeg: jpeg.into(),
            captured_at_ms,
            seq,
        }
    }

    /// Create a frame stamped with the current wall clock.
    pub fn now(jpeg: impl Into<Bytes>, seq: u64) -> Self {
        Self::new(jpeg, chrono::Utc::now().timestamp_millis(), seq)
    }

    /// Returns the size of the encoded image in bytes.
    pub fn payload_size(&self) -> usize {
        self.jpeg.len()
    }

    /// Returns true if the payload starts with SOI and ends with EOI.
    pub fn is_complete_jpeg(&self) -> bool {
        self.jpeg.len() >= 4 && self.jpeg.starts_with(&SOI) && self.jpeg.ends_with(&EOI)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_jpeg_markers() {
        let frame = Frame::new(vec![0xFF, 0xD8, 0x00, 0xFF, 0xD9], 1708300000000, 1);
        assert!(frame.is_complete_jpeg());
        assert_eq!(frame.payload_size(), 5);
    }

    #[test]
    fn truncated_jpeg_not_complete() {
        let frame = Frame::new(vec![0xFF, 0xD8, 0x00, 0x01], 0, 2);
        assert!(!frame.is_complete_jpeg());
    }

    #[test]
    fn markers_alone_are_too_short() {
        assert!(!Frame::new(vec![0xFF, 0xD8, 0xD9], 0, 3).is_complete_jpeg());
        assert!(Frame::new(vec![0xFF, 0xD8, 0xFF, 0xD9], 0, 3).is_complete_jpeg());
    }

    #[test]
    fn now_stamps_wall_clock() {
        let before = chrono::Utc::now().timestamp_millis();
        let frame = Frame::now(Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xD9]), 7);
        assert!(frame.captured_at_ms >= before);
        assert_eq!(frame.seq, 7);
    }
}
