//! SLIP framing for the serial radio modem link
//!
//! Every host/modem message travels as one SLIP frame. The decoder is
//! incremental so partial reads from the port can be fed in as they arrive.

pub const END: u8 = 0xC0;
pub const ESC: u8 = 0xDB;
pub const ESC_END: u8 = 0xDC;
pub const ESC_ESC: u8 = 0xDD;

/// Upper bound on a decoded frame; longer runs are discarded as line noise
pub const MAX_FRAME_LEN: usize = 256;

#[derive(Debug, Default)]
pub struct SlipDecoder {
    buf: Vec<u8>,
    escaped: bool,
    overflow: bool,
    discarded: u64,
}

impl SlipDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning every frame completed by them
    pub fn push(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        for &byte in data {
            if self.escaped {
                self.escaped = false;
                match byte {
                    ESC_END => self.accept(END),
                    ESC_ESC => self.accept(ESC),
                    _ => self.overflow = true,
                }
                continue;
            }
            match byte {
                END => {
                    if self.overflow {
                        self.discarded += 1;
                        self.buf.clear();
                        self.overflow = false;
                    } else if !self.buf.is_empty() {
                        frames.push(std::mem::take(&mut self.buf));
                    }
                }
                ESC => self.escaped = true,
                _ => self.accept(byte),
            }
        }
        frames
    }

    /// Frames thrown away for bad escapes or excess length
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    fn accept(&mut self, byte: u8) {
        if self.buf.len() >= MAX_FRAME_LEN {
            self.overflow = true;
        } else {
            self.buf.push(byte);
        }
    }
}

pub fn slip_encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 2);
    out.push(END);
    for &byte in payload {
        match byte {
            END => out.extend_from_slice(&[ESC, ESC_END]),
            ESC => out.extend_from_slice(&[ESC, ESC_ESC]),
            _ => out.push(byte),
        }
    }
    out.push(END);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_escapes_delimiters() {
        assert_eq!(
            slip_encode(&[0x46, END, 0x01, ESC]),
            vec![END, 0x46, ESC, ESC_END, 0x01, ESC, ESC_ESC, END]
        );
    }

    #[test]
    fn test_decoder_handles_split_reads() {
        let encoded = slip_encode(b"S\x04\x00T\xC0");
        let (head, tail) = encoded.split_at(4);

        let mut decoder = SlipDecoder::new();
        assert!(decoder.push(head).is_empty());
        assert_eq!(decoder.push(tail), vec![b"S\x04\x00T\xC0".to_vec()]);
    }

    #[test]
    fn test_decoder_yields_multiple_frames() {
        let mut stream = slip_encode(b"I\x01");
        stream.extend(slip_encode(b"F\x02\x00H"));

        let mut decoder = SlipDecoder::new();
        assert_eq!(
            decoder.push(&stream),
            vec![b"I\x01".to_vec(), b"F\x02\x00H".to_vec()]
        );
    }

    #[test]
    fn test_invalid_escape_discards_frame() {
        let mut decoder = SlipDecoder::new();
        let frames = decoder.push(&[END, 0x41, ESC, 0x00, END, 0x42, END]);
        assert_eq!(frames, vec![vec![0x42]]);
        assert_eq!(decoder.discarded(), 1);
    }

    #[test]
    fn test_oversized_frame_is_discarded() {
        let mut decoder = SlipDecoder::new();
        let mut stream = vec![0x41; MAX_FRAME_LEN + 1];
        stream.push(END);
        stream.extend(slip_encode(b"ok"));
        assert_eq!(decoder.push(&stream), vec![b"ok".to_vec()]);
        assert_eq!(decoder.discarded(), 1);
    }
}
