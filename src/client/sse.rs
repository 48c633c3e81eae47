//! Minimal Server-Sent Events decoding, enough for the frames the bridge emits.

/// One dispatched event. `data` lines are joined with `\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Accumulates raw chunks and hands out complete frames. Chunks may split frames, lines and
/// even UTF-8 sequences anywhere.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = vec![];
        while let Some((end, separator)) = find_frame_end(&self.buffer) {
            let raw = self.buffer.drain(..end + separator).collect::<Vec<_>>();
            if let Some(frame) = parse_frame(&String::from_utf8_lossy(&raw[..end])) {
                frames.push(frame);
            }
        }
        frames
    }
}

/// Position of the first blank line and the length of the separator that forms it.
fn find_frame_end(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buffer.windows(4).position(|w| w == b"\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn parse_frame(raw: &str) -> Option<SseFrame> {
    let mut event = None;
    let mut data: Option<String> = None;
    for line in raw.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => event = Some(value.to_string()),
            "data" => match data.as_mut() {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => data = Some(value.to_string()),
            },
            _ => {}
        }
    }
    data.map(|data| SseFrame { event, data })
}

#[cfg(test)]
mod tests {
    use super::{SseDecoder, SseFrame};

    #[test]
    fn frames_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"event: entry\nda").is_empty());
        let frames = decoder.push(b"ta: {\"a\":1}\n\nevent: entry\ndata: 2\n\n");
        assert_eq!(
            frames,
            vec![
                SseFrame {
                    event: Some("entry".into()),
                    data: "{\"a\":1}".into()
                },
                SseFrame {
                    event: Some("entry".into()),
                    data: "2".into()
                },
            ]
        );
    }

    #[test]
    fn keep_alive_comments_are_skipped() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b":\n\n").is_empty());
        assert_eq!(
            decoder.push(b"data: a\r\ndata: b\r\n\r\n"),
            vec![SseFrame {
                event: None,
                data: "a\nb".into()
            }]
        );
    }
}
