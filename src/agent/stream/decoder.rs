//! Newline framing over arbitrary byte chunks.

/// Splits a byte stream into lines, holding back the trailing partial line
/// until more bytes (or the end of the stream) arrive.
///
/// Bytes are buffered undecoded so a multi-byte character split across two
/// chunks still decodes correctly.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every complete, non-empty, trimmed line it closed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            if let Some(line) = decode(&self.buffer[start..end]) {
                lines.push(line);
            }
            start = end + 1;
        }
        self.buffer.drain(..start);
        lines
    }

    /// Flush the held-back partial line at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        decode(&rest)
    }

    /// Bytes currently held back
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn decode(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holds_back_partial_line() {
        let mut decoder = LineDecoder::new();
        assert_eq!(decoder.push(b"{\"type\":\"res"), Vec::<String>::new());
        assert_eq!(decoder.pending(), 12);
        assert_eq!(decoder.push(b"ult\"}\nnext"), vec!["{\"type\":\"result\"}"]);
        assert_eq!(decoder.finish(), Some("next".to_string()));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_skips_blank_lines_and_trims_crlf() {
        let mut decoder = LineDecoder::new();
        let lines = decoder.push(b"one\r\n\n   \ntwo\r\n");
        assert_eq!(lines, vec!["one", "two"]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_multibyte_split_across_chunks() {
        let mut decoder = LineDecoder::new();
        let bytes = "héllo\n".as_bytes();
        assert!(decoder.push(&bytes[..2]).is_empty());
        assert_eq!(decoder.push(&bytes[2..]), vec!["héllo"]);
    }
}
