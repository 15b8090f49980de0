//! `\r\n` terminated ASCII lines (INS2000 command console).

use crate::constants::MAX_LINE_LENGTH;
use crate::frame::{DecodeEvent, DecoderStats, FrameDecoder};
use crate::packet::Frame;

/// Encode an ASCII command, appending `\r\n`.
pub fn encode_line(line: &str) -> Vec<u8> {
    let line = line.trim_end();
    let mut bytes = Vec::with_capacity(line.len() + 2);
    bytes.extend_from_slice(line.as_bytes());
    bytes.extend_from_slice(b"\r\n");
    bytes
}

/// Splits a byte stream into trimmed, non-empty text lines.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    stats: DecoderStats,
}

impl LineDecoder {
    /// Create a decoder.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameDecoder for LineDecoder {
    fn feed(&mut self, chunk: &[u8], out: &mut Vec<DecodeEvent>) {
        for &byte in chunk {
            if byte == b'\n' {
                let text = String::from_utf8_lossy(&self.buffer).trim().to_string();
                self.buffer.clear();
                if !text.is_empty() {
                    log::trace!("line {:?}", text);
                    self.stats.frames += 1;
                    out.push(DecodeEvent::Frame(Frame::Text(text)));
                }
                continue;
            }
            self.buffer.push(byte);
            if self.buffer.len() > MAX_LINE_LENGTH {
                log::warn!("line exceeds {} bytes, dropping", MAX_LINE_LENGTH);
                self.stats.bytes_discarded += self.buffer.len() as u64;
                self.buffer.clear();
            }
        }
    }

    fn clear(&mut self) {
        self.buffer.clear();
    }

    fn stats(&self) -> DecoderStats {
        self.stats
    }
}
