use std::{fmt, io::Write as _, ops::Range};

use crate::error::WeatherError;

pub const SCRATCH_BUFFER_SIZE: usize = 2048;
pub const ENCODE_HEADROOM: usize = 12;

#[derive(Debug)]
pub struct ScratchBuffer {
    data: Box<[u8]>,
    len: usize,
}

impl ScratchBuffer {
    pub fn new() -> Self {
        Self::with_capacity(SCRATCH_BUFFER_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0_u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
        self.len = 0;
    }

    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.len..]
    }

    pub fn advance(&mut self, count: usize) {
        self.len = (self.len + count).min(self.data.len());
    }

    pub fn is_full(&self) -> bool {
        self.len == self.data.len()
    }

    pub(crate) fn bytes(&self, range: Range<usize>) -> &[u8] {
        &self.data[range]
    }

    pub(crate) fn raw_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub(crate) fn set_len(&mut self, len: usize) {
        self.len = len.min(self.data.len());
    }
}

impl Default for ScratchBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeatherQuery<'a> {
    pub provider: u8,
    pub location: &'a str,
    pub api_key: &'a str,
    pub provider_options: &'a str,
    pub firmware_version: u16,
}

impl fmt::Display for WeatherQuery<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.py?loc={}&key={}&wto={}&fwv={}",
            self.provider, self.location, self.api_key, self.provider_options, self.firmware_version
        )
    }
}

impl WeatherQuery<'_> {
    pub fn encoded_len(&self) -> usize {
        let spaces = [self.location, self.api_key, self.provider_options]
            .iter()
            .map(|part| part.bytes().filter(|&b| b == b' ').count())
            .sum::<usize>();
        self.to_string().len() + 2 * spaces
    }
}

pub fn encode_query(
    buffer: &mut ScratchBuffer,
    query: &WeatherQuery<'_>,
) -> Result<Range<usize>, WeatherError> {
    buffer.clear();
    let available = buffer.capacity().saturating_sub(ENCODE_HEADROOM);

    let written = {
        let mut cursor = &mut buffer.raw_mut()[..available];
        let before = cursor.len();
        if write!(cursor, "{query}").is_err() {
            buffer.clear();
            return Err(WeatherError::EncodingOverflow {
                required: query.encoded_len(),
                available,
            });
        }
        before - cursor.len()
    };
    buffer.set_len(written);

    let encoded = encode_spaces_in_place(buffer);
    if encoded.is_err() {
        buffer.clear();
    }
    encoded
}

/// Copies backwards so the encoded text ends `ENCODE_HEADROOM` bytes before the end.
pub fn encode_spaces_in_place(buffer: &mut ScratchBuffer) -> Result<Range<usize>, WeatherError> {
    let len = buffer.len();
    let end = buffer.capacity().saturating_sub(ENCODE_HEADROOM);
    let spaces = buffer.as_slice().iter().filter(|&&b| b == b' ').count();
    let required = len + 2 * spaces;

    if required > end {
        return Err(WeatherError::EncodingOverflow {
            required,
            available: end,
        });
    }

    let data = buffer.raw_mut();
    let mut read = len;
    let mut write = end;
    while read > 0 {
        read -= 1;
        let byte = data[read];
        if byte == b' ' {
            write -= 3;
            data[write..write + 3].copy_from_slice(b"%20");
        } else {
            write -= 1;
            data[write] = byte;
        }
        debug_assert!(write >= read);
    }

    Ok(write..end)
}

pub fn request_parts<'a>(
    buffer: &'a ScratchBuffer,
    query: Range<usize>,
    host: &'a str,
) -> [&'a [u8]; 5] {
    [
        b"GET /weather".as_slice(),
        buffer.bytes(query),
        b" HTTP/1.0\r\nHOST: ".as_slice(),
        host.as_bytes(),
        b"\r\n\r\n".as_slice(),
    ]
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn query<'a>(location: &'a str, api_key: &'a str) -> WeatherQuery<'a> {
        WeatherQuery {
            provider: 1,
            location,
            api_key,
            provider_options: "",
            firmware_version: 219,
        }
    }

    fn fill(buffer: &mut ScratchBuffer, text: &str) {
        buffer.clear();
        buffer.raw_mut()[..text.len()].copy_from_slice(text.as_bytes());
        buffer.set_len(text.len());
    }

    #[test]
    fn formats_query_and_encodes_spaces() {
        let mut buffer = ScratchBuffer::new();
        let range = encode_query(&mut buffer, &query("New York, NY", "a b")).unwrap();

        assert_eq!(
            std::str::from_utf8(buffer.bytes(range.clone())).unwrap(),
            "1.py?loc=New%20York,%20NY&key=a%20b&wto=&fwv=219"
        );
        assert_eq!(range.end, SCRATCH_BUFFER_SIZE - ENCODE_HEADROOM);
    }

    #[test]
    fn encoded_length_grows_two_bytes_per_space_and_decodes_back() {
        let inputs = ["", "plain", " ", "  lead", "trail  ", "a b c d", "   "];
        for input in inputs {
            let mut buffer = ScratchBuffer::with_capacity(64);
            fill(&mut buffer, input);
            let spaces = input.matches(' ').count();

            let range = encode_spaces_in_place(&mut buffer).unwrap();
            let encoded = std::str::from_utf8(buffer.bytes(range)).unwrap().to_string();

            assert_eq!(encoded.len(), input.len() + 2 * spaces);
            assert_eq!(encoded.replace("%20", " "), input);
        }
    }

    #[test]
    fn encoding_exactly_at_limit_succeeds() {
        let capacity = 32;
        let limit = capacity - ENCODE_HEADROOM;
        let text = "ab cd ef ghijk";
        assert_eq!(text.len() + 2 * 3, limit);

        let mut buffer = ScratchBuffer::with_capacity(capacity);
        fill(&mut buffer, text);
        let range = encode_spaces_in_place(&mut buffer).unwrap();

        assert_eq!(range, 0..limit);
        assert_eq!(buffer.bytes(range), b"ab%20cd%20ef%20ghijk");
    }

    #[test]
    fn encoding_one_byte_over_limit_fails_without_touching_buffer() {
        let capacity = 32;
        let text = "ab cd ef ghijkl";

        let mut buffer = ScratchBuffer::with_capacity(capacity);
        fill(&mut buffer, text);
        let err = encode_spaces_in_place(&mut buffer).unwrap_err();

        assert_eq!(
            err,
            WeatherError::EncodingOverflow {
                required: 21,
                available: 20,
            }
        );
        assert_eq!(buffer.as_slice(), text.as_bytes());
        assert!(buffer.bytes(text.len()..capacity).iter().all(|&b| b == 0));
    }

    #[test]
    fn oversized_query_is_rejected_and_buffer_cleared() {
        let location = "x".repeat(SCRATCH_BUFFER_SIZE);
        let mut buffer = ScratchBuffer::new();

        let err = encode_query(&mut buffer, &query(&location, "")).unwrap_err();

        assert!(matches!(err, WeatherError::EncodingOverflow { .. }));
        assert!(buffer.is_empty());
    }

    #[test]
    fn encoded_len_matches_encoder_output() {
        let q = query("San Jose CA", "k e y");
        let mut buffer = ScratchBuffer::new();
        let range = encode_query(&mut buffer, &q).unwrap();
        assert_eq!(range.len(), q.encoded_len());
    }

    #[test]
    fn request_parts_frame_http10_get() {
        let mut buffer = ScratchBuffer::new();
        let range = encode_query(&mut buffer, &query("Boston", "")).unwrap();

        let request: Vec<u8> = request_parts(&buffer, range, "weather.example.com").concat();

        assert_eq!(
            String::from_utf8(request).unwrap(),
            "GET /weather1.py?loc=Boston&key=&wto=&fwv=219 HTTP/1.0\r\nHOST: weather.example.com\r\n\r\n"
        );
    }
}
