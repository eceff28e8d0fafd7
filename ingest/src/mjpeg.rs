use bytes::{Bytes, BytesMut};
use frame_pacer_common::frame::Frame;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::IngestError;

const SOI: &[u8] = &[0xFF, 0xD8];
const EOI: &[u8] = &[0xFF, 0xD9];

/// Parse state for a stream of back-to-back JPEG images.
enum ParseState {
    /// Looking for the start-of-image marker `FF D8`.
    SeekingStart,
    /// Inside an image, looking for the end-of-image marker `FF D9`.
    Collecting,
}

/// Splits an `image2pipe` MJPEG byte stream into complete JPEG buffers.
///
/// Bytes outside an SOI..EOI pair are discarded. A frame that grows past
/// `max_frame_bytes` without an EOI is abandoned and the splitter resyncs on
/// the next SOI.
pub struct JpegSplitter {
    buffer: BytesMut,
    state: ParseState,
    /// Offset to resume the EOI search from, so old bytes are not rescanned.
    scan_from: usize,
    max_frame_bytes: usize,
    oversized: u64,
}

impl JpegSplitter {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(256 * 1024),
            state: ParseState::SeekingStart,
            scan_from: 0,
            max_frame_bytes,
            oversized: 0,
        }
    }

    /// Feed a chunk and return every JPEG it completed, in stream order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        loop {
            match self.state {
                ParseState::SeekingStart => {
                    if let Some(pos) = find_subsequence(&self.buffer, SOI) {
                        if pos > 0 {
                            debug!(skipped = pos, "discarding bytes before SOI");
                        }
                        let _ = self.buffer.split_to(pos);
                        self.scan_from = SOI.len();
                        self.state = ParseState::Collecting;
                    } else {
                        // Keep a trailing 0xFF in case the marker spans chunks
                        if self.buffer.len() >= SOI.len() {
                            let _ = self.buffer.split_to(self.buffer.len() - (SOI.len() - 1));
                        }
                        break;
                    }
                }
                ParseState::Collecting => {
                    if let Some(pos) = find_subsequence(&self.buffer[self.scan_from..], EOI) {
                        let end = self.scan_from + pos + EOI.len();
                        frames.push(self.buffer.split_to(end).freeze());
                        self.state = ParseState::SeekingStart;
                    } else if self.buffer.len() > self.max_frame_bytes {
                        warn!(
                            bytes = self.buffer.len(),
                            max = self.max_frame_bytes,
                            "JPEG exceeded max frame size without EOI, resyncing"
                        );
                        self.oversized += 1;
                        // Drop the stale SOI so the search restarts past it
                        let _ = self.buffer.split_to(SOI.len());
                        self.state = ParseState::SeekingStart;
                    } else {
                        self.scan_from = self
                            .buffer
                            .len()
                            .saturating_sub(EOI.len() - 1)
                            .max(SOI.len());
                        break;
                    }
                }
            }
        }

        frames
    }

    /// Bytes currently held for an incomplete frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Number of frames abandoned for exceeding `max_frame_bytes`.
    pub fn oversized(&self) -> u64 {
        self.oversized
    }
}

/// Read `reader` to EOF, sending each complete JPEG as a [`Frame`].
///
/// Sequence numbers start at 1 and follow arrival order. Returns the number
/// of frames sent; stops early without error if the receiver is gone.
pub async fn read_frames<R>(
    mut reader: R,
    tx: mpsc::Sender<Frame>,
    max_frame_bytes: usize,
    chunk_bytes: usize,
) -> Result<u64, IngestError>
where
    R: AsyncRead + Unpin,
{
    let mut splitter = JpegSplitter::new(max_frame_bytes);
    let mut read_buf = vec![0u8; chunk_bytes.max(1)];
    let mut next_seq: u64 = 1;

    loop {
        let n = reader.read(&mut read_buf).await?;
        if n == 0 {
            break;
        }

        for jpeg in splitter.push(&read_buf[..n]) {
            let frame = Frame::now(jpeg, next_seq);
            debug!(seq = frame.seq, bytes = frame.payload_size(), "frame boundary");
            if tx.send(frame).await.is_err() {
                debug!("frame receiver closed, stopping reader");
                return Ok(next_seq - 1);
            }
            next_seq += 1;
        }
    }

    if splitter.buffered() > 0 {
        debug!(bytes = splitter.buffered(), "discarding incomplete trailing frame");
    }
    info!(
        frames = next_seq - 1,
        oversized = splitter.oversized(),
        "frame stream ended"
    );
    Ok(next_seq - 1)
}

/// Find the position of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
