use crate::encoder::ScratchBuffer;

/// The start of the buffer counts as a line start.
pub fn find_body_start(bytes: &[u8]) -> Option<usize> {
    let mut at_line_start = true;
    for (index, &byte) in bytes.iter().enumerate() {
        match byte {
            b'\n' if at_line_start => return Some(index + 1),
            b'\n' => at_line_start = true,
            b'\r' => {}
            _ => at_line_start = false,
        }
    }
    None
}

pub fn strip_http_header(buffer: &mut ScratchBuffer) -> Option<usize> {
    let len = buffer.len();
    let body_start = find_body_start(buffer.as_slice())?;
    let body_len = len - body_start;

    let data = buffer.raw_mut();
    data.copy_within(body_start..len, 0);
    data[body_len..len].fill(0);
    buffer.set_len(body_len);

    Some(body_len)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn buffer_with(bytes: &[u8]) -> ScratchBuffer {
        let mut buffer = ScratchBuffer::with_capacity(256);
        buffer.spare_mut()[..bytes.len()].copy_from_slice(bytes);
        buffer.advance(bytes.len());
        buffer
    }

    #[test]
    fn strips_crlf_headers() {
        let mut buffer = buffer_with(b"HTTP/1.0 200 OK\r\nContent-Type: text/plain\r\n\r\nBODY");

        assert_eq!(strip_http_header(&mut buffer), Some(4));
        assert_eq!(buffer.as_slice(), b"BODY");
    }

    #[test]
    fn strips_bare_lf_headers() {
        let mut buffer = buffer_with(b"HTTP/1.0 200 OK\nX: y\n\nok&scale=80");

        assert_eq!(strip_http_header(&mut buffer), Some(11));
        assert_eq!(buffer.as_slice(), b"ok&scale=80");
    }

    #[test]
    fn tolerates_mixed_line_endings() {
        let mut buffer = buffer_with(b"HTTP/1.0 200 OK\r\nX: y\n\r\nbody");

        assert_eq!(strip_http_header(&mut buffer), Some(4));
        assert_eq!(buffer.as_slice(), b"body");
    }

    #[test]
    fn zeroes_bytes_left_behind_by_the_shift() {
        let raw = b"HTTP/1.0 200 OK\r\n\r\nok";
        let mut buffer = buffer_with(raw);

        strip_http_header(&mut buffer);

        assert!(buffer.bytes(2..raw.len()).iter().all(|&b| b == 0));
    }

    #[test]
    fn empty_body_after_boundary() {
        let mut buffer = buffer_with(b"HTTP/1.0 204 No Content\r\n\r\n");

        assert_eq!(strip_http_header(&mut buffer), Some(0));
        assert!(buffer.is_empty());
    }

    #[test]
    fn missing_boundary_leaves_buffer_unchanged() {
        let raw = b"HTTP/1.0 200 OK\r\nContent-Type: text/plain\r\nok&sunrise=360";
        let mut buffer = buffer_with(raw);

        assert_eq!(strip_http_header(&mut buffer), None);
        assert_eq!(buffer.as_slice(), raw);
    }

    #[test]
    fn carriage_returns_alone_are_not_a_boundary() {
        assert_eq!(find_body_start(b"HTTP/1.0 200 OK\r\r\rbody"), None);
    }
}
