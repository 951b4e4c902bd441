pub const MAX_VALUE_LEN: usize = 32;

pub const KEY_SUNRISE: &str = "sunrise";
pub const KEY_SUNSET: &str = "sunset";
pub const KEY_EXTERNAL_IP: &str = "eip";
pub const KEY_SCALE: &str = "scale";
pub const KEY_TIMEZONE: &str = "tz";
pub const KEY_RAIN_DELAY: &str = "rd";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseFields<'a> {
    data: Option<&'a [u8]>,
}

impl<'a> ResponseFields<'a> {
    pub fn parse(body: &'a [u8]) -> Self {
        let data = body
            .iter()
            .position(|&b| b == b'&')
            .map(|first| &body[first..]);
        Self { data }
    }

    pub fn is_engaged(&self) -> bool {
        self.data.is_some()
    }

    pub fn get(&self, key: &str) -> Option<&'a str> {
        let data = self.data?;
        data.split(|&b| b == b'&')
            .filter_map(|token| {
                let eq = token.iter().position(|&b| b == b'=')?;
                (&token[..eq] == key.as_bytes()).then(|| &token[eq + 1..])
            })
            .map(value_prefix)
            .next()
    }
}

fn value_prefix(raw: &[u8]) -> &str {
    let end = raw
        .iter()
        .take(MAX_VALUE_LEN)
        .position(|b| matches!(b, 0 | b' ' | b'\r' | b'\n'))
        .unwrap_or_else(|| raw.len().min(MAX_VALUE_LEN));
    // Stop at the first non-UTF-8 byte instead of rejecting the whole value.
    match std::str::from_utf8(&raw[..end]) {
        Ok(value) => value,
        Err(err) => std::str::from_utf8(&raw[..err.valid_up_to()]).unwrap_or_default(),
    }
}
