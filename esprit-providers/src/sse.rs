//! Minimal Server-Sent-Events line framing shared by both dispatch modes.
//!
//! Providers send `data: <json>\n\n` frames over a chunked HTTP response.
//! `SseBuffer` accumulates raw bytes as they arrive from the network and
//! yields complete `data:` payloads as they become available, tolerating
//! chunk boundaries that split a frame mid-line.

/// Accumulates bytes from a streaming HTTP body and splits them into
/// complete SSE lines on demand.
#[derive(Debug, Default)]
pub struct SseBuffer {
    pending: String,
}

impl SseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds newly received bytes and returns every complete `data:` payload
    /// found so far (the literal `[DONE]` sentinel is filtered out).
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.push_str(&String::from_utf8_lossy(bytes));
        let mut payloads = Vec::new();

        loop {
            let Some(newline_pos) = self.pending.find('\n') else { break };
            let line = self.pending[..newline_pos].trim_end_matches('\r').to_string();
            self.pending.drain(..=newline_pos);

            let Some(data) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) else {
                continue;
            };
            let data = data.trim();
            if data.is_empty() || data == "[DONE]" {
                continue;
            }
            payloads.push(data.to_string());
        }

        payloads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_complete_lines_and_holds_partial() {
        let mut buf = SseBuffer::new();
        let payloads = buf.push(b"data: {\"a\":1}\ndata: {\"b\":2}\nda");
        assert_eq!(payloads, vec!["{\"a\":1}", "{\"b\":2}"]);
        let payloads = buf.push(b"ta: {\"c\":3}\n");
        assert_eq!(payloads, vec!["{\"c\":3}"]);
    }

    #[test]
    fn filters_done_sentinel() {
        let mut buf = SseBuffer::new();
        let payloads = buf.push(b"data: {\"a\":1}\ndata: [DONE]\n");
        assert_eq!(payloads, vec!["{\"a\":1}"]);
    }

    #[test]
    fn ignores_non_data_lines() {
        let mut buf = SseBuffer::new();
        let payloads = buf.push(b"event: message\ndata: {\"a\":1}\n\n");
        assert_eq!(payloads, vec!["{\"a\":1}"]);
    }
}
