//! Growable big-endian byte buffer used for classfile emission

/// An append-only byte buffer writing all multi-byte values in big-endian
/// order, as the class file format requires.
///
/// The final emission pass creates one with [`ByteVector::with_capacity`] set
/// to the exact pre-computed image size, so no reallocation happens while the
/// class is written out.
#[derive(Debug, Default)]
pub struct ByteVector {
    data: Vec<u8>,
}

impl ByteVector {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Creates a buffer pre-sized to hold exactly `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { data: Vec::with_capacity(capacity) }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn put_u8(&mut self, b: u8) -> &mut Self {
        self.data.push(b);
        self
    }

    /// Puts two bytes.
    pub fn put_u11(&mut self, b1: u8, b2: u8) -> &mut Self {
        self.data.push(b1);
        self.data.push(b2);
        self
    }

    /// Puts one byte followed by one big-endian u16.
    pub fn put_u12(&mut self, b: u8, s: u16) -> &mut Self {
        self.data.push(b);
        self.put_u16(s)
    }

    /// Puts one byte followed by two big-endian u16 values.
    pub fn put_u122(&mut self, b: u8, s1: u16, s2: u16) -> &mut Self {
        self.put_u12(b, s1).put_u16(s2)
    }

    pub fn put_u16(&mut self, s: u16) -> &mut Self {
        self.data.extend_from_slice(&s.to_be_bytes());
        self
    }

    pub fn put_u32(&mut self, v: u32) -> &mut Self {
        self.data.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn put_u64(&mut self, v: u64) -> &mut Self {
        self.data.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn put_byte_array(&mut self, bytes: &[u8]) -> &mut Self {
        self.data.extend_from_slice(bytes);
        self
    }

    /// Puts a u16 length prefix followed by the string encoded in the JVM's
    /// modified UTF-8: NUL becomes the two-byte form and supplementary
    /// characters are written as CESU-8 surrogate pairs.
    ///
    /// Panics if the encoded form exceeds 65535 bytes; such strings cannot be
    /// represented in a constant pool and indicate a caller bug.
    pub fn put_utf8(&mut self, s: &str) -> &mut Self {
        let start = self.data.len();
        self.data.extend_from_slice(&[0, 0]);

        for c in s.chars() {
            let cp = c as u32;
            match cp {
                0x01..=0x7F => {
                    self.data.push(cp as u8);
                }
                0x00 | 0x80..=0x7FF => {
                    self.data.push(0xC0 | (cp >> 6) as u8);
                    self.data.push(0x80 | (cp & 0x3F) as u8);
                }
                0x800..=0xFFFF => {
                    self.put_three_byte(cp);
                }
                _ => {
                    // Supplementary plane: encode each UTF-16 surrogate half
                    let v = cp - 0x1_0000;
                    self.put_three_byte(0xD800 + (v >> 10));
                    self.put_three_byte(0xDC00 + (v & 0x3FF));
                }
            }
        }

        let len = self.data.len() - start - 2;
        assert!(len <= 0xFFFF, "UTF8 constant too long for the class file format: {len} bytes");
        self.data[start..start + 2].copy_from_slice(&(len as u16).to_be_bytes());
        self
    }

    fn put_three_byte(&mut self, cp: u32) {
        self.data.push(0xE0 | (cp >> 12) as u8);
        self.data.push(0x80 | ((cp >> 6) & 0x3F) as u8);
        self.data.push(0x80 | (cp & 0x3F) as u8);
    }
}

/// Decodes a modified UTF-8 run of `len` bytes starting at `offset`.
/// Used when scanning the constant pool of an existing class image.
pub(crate) fn decode_utf8(bytes: &[u8], offset: usize, len: usize) -> Option<String> {
    let end = offset + len;
    if end > bytes.len() {
        return None;
    }

    let mut out = String::with_capacity(len);
    let mut i = offset;
    let mut pending_high: Option<u32> = None;

    while i < end {
        let b = bytes[i];
        let (unit, width) = if b & 0x80 == 0 {
            (b as u32, 1)
        } else if b & 0xE0 == 0xC0 {
            if i + 1 >= end {
                return None;
            }
            (((b as u32 & 0x1F) << 6) | (bytes[i + 1] as u32 & 0x3F), 2)
        } else if b & 0xF0 == 0xE0 {
            if i + 2 >= end {
                return None;
            }
            (
                ((b as u32 & 0x0F) << 12)
                    | ((bytes[i + 1] as u32 & 0x3F) << 6)
                    | (bytes[i + 2] as u32 & 0x3F),
                3,
            )
        } else {
            return None;
        };
        i += width;

        match pending_high.take() {
            Some(high) => {
                if (0xDC00..=0xDFFF).contains(&unit) {
                    let cp = 0x1_0000 + ((high - 0xD800) << 10) + (unit - 0xDC00);
                    out.push(char::from_u32(cp)?);
                } else {
                    return None;
                }
            }
            None => {
                if (0xD800..=0xDBFF).contains(&unit) {
                    pending_high = Some(unit);
                } else {
                    out.push(char::from_u32(unit)?);
                }
            }
        }
    }

    if pending_high.is_some() {
        return None;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_puts() {
        let mut v = ByteVector::new();
        v.put_u8(0x01).put_u16(0x0203).put_u32(0x0405_0607);
        assert_eq!(v.as_slice(), &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07]);

        let mut v = ByteVector::new();
        v.put_u12(0x07, 0x0102).put_u122(0x09, 0x0A0B, 0x0C0D);
        assert_eq!(v.as_slice(), &[0x07, 0x01, 0x02, 0x09, 0x0A, 0x0B, 0x0C, 0x0D]);
    }

    #[test]
    fn test_utf8_ascii() {
        let mut v = ByteVector::new();
        v.put_utf8("java/lang/Object");
        assert_eq!(v.as_slice()[..2], [0, 16]);
        assert_eq!(&v.as_slice()[2..], b"java/lang/Object");
    }

    #[test]
    fn test_utf8_nul_uses_two_byte_form() {
        let mut v = ByteVector::new();
        v.put_utf8("a\0b");
        assert_eq!(v.as_slice(), &[0, 4, b'a', 0xC0, 0x80, b'b']);
    }

    #[test]
    fn test_utf8_roundtrip_multibyte() {
        let original = "π \u{0}\u{7FF}\u{FFFF}\u{10400} end";
        let mut v = ByteVector::new();
        v.put_utf8(original);
        let len = u16::from_be_bytes([v.as_slice()[0], v.as_slice()[1]]) as usize;
        let decoded = decode_utf8(v.as_slice(), 2, len).expect("decode");
        assert_eq!(decoded, original);
    }
}
