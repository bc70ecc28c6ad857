use std::fmt;
use std::io;
use std::str::FromStr;

/// Character encoding of record files.
///
/// Records are held as `String` in memory; the encoding only matters at the
/// file boundary, when a line is decoded on read and encoded on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Utf8,
    /// ISO-8859-1: every byte maps to the code point of the same value.
    Latin1,
    /// US-ASCII: bytes above 0x7F are rejected.
    Ascii,
}

impl Encoding {
    /// Canonical name, as accepted by `FromStr`.
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Utf8 => "UTF-8",
            Encoding::Latin1 => "ISO-8859-1",
            Encoding::Ascii => "US-ASCII",
        }
    }

    /// Decode one line (terminator already stripped) into a record.
    pub fn decode(self, bytes: &[u8]) -> io::Result<String> {
        match self {
            Encoding::Utf8 => match std::str::from_utf8(bytes) {
                Ok(s) => Ok(s.to_owned()),
                Err(e) => Err(invalid_data(format!(
                    "malformed UTF-8 input at byte {}",
                    e.valid_up_to()
                ))),
            },
            Encoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
            Encoding::Ascii => {
                if let Some(pos) = bytes.iter().position(|b| !b.is_ascii()) {
                    return Err(invalid_data(format!(
                        "non-ASCII byte 0x{:02X} at offset {}",
                        bytes[pos], pos
                    )));
                }
                // All bytes are ASCII, hence valid UTF-8.
                Ok(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }

    /// Append the encoded form of `record` to `out`.
    pub fn encode_into(self, record: &str, out: &mut Vec<u8>) -> io::Result<()> {
        match self {
            Encoding::Utf8 => {
                out.extend_from_slice(record.as_bytes());
                Ok(())
            }
            Encoding::Latin1 => encode_narrow(record, 0xFF, self, out),
            Encoding::Ascii => encode_narrow(record, 0x7F, self, out),
        }
    }
}

/// Single-byte encodings: fast path for pure ASCII, otherwise per-char check.
fn encode_narrow(record: &str, max: u32, enc: Encoding, out: &mut Vec<u8>) -> io::Result<()> {
    if record.is_ascii() {
        out.extend_from_slice(record.as_bytes());
        return Ok(());
    }
    out.reserve(record.len());
    for c in record.chars() {
        let cp = c as u32;
        if cp > max {
            return Err(invalid_data(format!(
                "character {:?} cannot be encoded as {}",
                c,
                enc.name()
            )));
        }
        out.push(cp as u8);
    }
    Ok(())
}

fn invalid_data(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match norm.as_str() {
            "utf8" => Ok(Encoding::Utf8),
            "iso88591" | "latin1" | "l1" => Ok(Encoding::Latin1),
            "usascii" | "ascii" => Ok(Encoding::Ascii),
            _ => Err(format!("unsupported encoding '{}'", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin1_decode_encode() {
        let record = Encoding::Latin1.decode(b"caf\xe9").unwrap();
        assert_eq!(record, "café");
        let mut out = Vec::new();
        Encoding::Latin1.encode_into(&record, &mut out).unwrap();
        assert_eq!(out, b"caf\xe9");
    }

    #[test]
    fn test_narrow_encodings_reject_wide_chars() {
        let mut out = Vec::new();
        assert!(Encoding::Latin1.encode_into("€", &mut out).is_err());
        assert!(Encoding::Ascii.encode_into("é", &mut out).is_err());
        assert!(Encoding::Ascii.decode(b"\x80").is_err());
        assert!(Encoding::Utf8.decode(b"\xff").is_err());
    }

    #[test]
    fn test_display_round_trips_through_from_str() {
        for enc in [Encoding::Utf8, Encoding::Latin1, Encoding::Ascii] {
            assert_eq!(enc.to_string().parse::<Encoding>(), Ok(enc));
        }
    }
}
