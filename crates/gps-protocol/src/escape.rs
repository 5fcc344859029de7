//! Backslash-escape decoding for raw control strings given on the command line

use crate::error::EscapeError;

/// Decode C-style escapes (`\xHH`, `\e`, `\r`, `\n`, `\t`, ...) into bytes
pub fn decode_escapes(input: &str) -> Result<Vec<u8>, EscapeError> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }

        let offset = i;
        let Some(&code) = bytes.get(i + 1) else {
            return Err(EscapeError::Truncated(offset));
        };
        let decoded = match code {
            b'b' => 0x08,
            b'e' => 0x1B,
            b'f' => 0x0C,
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'v' => 0x0B,
            b'\\' => b'\\',
            b'x' => {
                let digits = bytes
                    .get(i + 2..i + 4)
                    .ok_or(EscapeError::Truncated(offset))?;
                let value = std::str::from_utf8(digits)
                    .ok()
                    .and_then(|s| u8::from_str_radix(s, 16).ok())
                    .ok_or(EscapeError::InvalidHex(offset))?;
                i += 2;
                value
            }
            other => {
                return Err(EscapeError::Unknown {
                    ch: char::from(other),
                    offset,
                })
            }
        };
        out.push(decoded);
        i += 2;
    }

    if out.is_empty() {
        return Err(EscapeError::Empty);
    }
    Ok(out)
}
