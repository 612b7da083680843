//! Character set table.
//!
//! Firebird identifies character sets by a small integer carried in the low
//! byte of a text column's subtype. A connection negotiates one charset
//! (`isc_dpb_lc_ctype`) and the server transliterates text columns into it;
//! with `NONE` the column's own charset applies.

use std::borrow::Cow;

use encoding_rs::Encoding;

use crate::error::TypeError;

/// A Firebird character set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Charset {
    id: i32,
    name: &'static str,
    bytes_per_char: u8,
}

const fn cs(id: i32, name: &'static str, bytes_per_char: u8) -> Charset {
    Charset {
        id,
        name,
        bytes_per_char,
    }
}

/// Character sets known to the client.
static CHARSETS: &[Charset] = &[
    cs(0, "NONE", 1),
    cs(1, "OCTETS", 1),
    cs(2, "ASCII", 1),
    cs(3, "UNICODE_FSS", 3),
    cs(4, "UTF8", 4),
    cs(5, "SJIS_0208", 2),
    cs(6, "EUCJ_0208", 2),
    cs(21, "ISO8859_1", 1),
    cs(22, "ISO8859_2", 1),
    cs(23, "ISO8859_3", 1),
    cs(34, "ISO8859_4", 1),
    cs(35, "ISO8859_5", 1),
    cs(36, "ISO8859_6", 1),
    cs(37, "ISO8859_7", 1),
    cs(38, "ISO8859_8", 1),
    cs(39, "ISO8859_9", 1),
    cs(40, "ISO8859_13", 1),
    cs(44, "KSC_5601", 2),
    cs(48, "DOS866", 1),
    cs(51, "WIN1250", 1),
    cs(52, "WIN1251", 1),
    cs(53, "WIN1252", 1),
    cs(54, "WIN1253", 1),
    cs(55, "WIN1254", 1),
    cs(56, "BIG_5", 2),
    cs(57, "GB_2312", 2),
    cs(58, "WIN1255", 1),
    cs(59, "WIN1256", 1),
    cs(60, "WIN1257", 1),
    cs(63, "KOI8R", 1),
    cs(64, "KOI8U", 1),
    cs(65, "WIN1258", 1),
    cs(66, "TIS620", 1),
    cs(67, "GBK", 2),
    cs(69, "GB18030", 4),
];

impl Charset {
    /// `NONE`: bytes are passed through untouched.
    pub const NONE: Charset = cs(0, "NONE", 1);
    /// `OCTETS`: binary data.
    pub const OCTETS: Charset = cs(1, "OCTETS", 1);
    /// `UTF8`.
    pub const UTF8: Charset = cs(4, "UTF8", 4);

    /// Look up a charset by its numeric id.
    #[must_use]
    pub fn from_id(id: i32) -> Option<Charset> {
        CHARSETS.iter().copied().find(|c| c.id == id)
    }

    /// Look up a charset by name, ignoring case.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Charset> {
        CHARSETS
            .iter()
            .copied()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Numeric id.
    #[must_use]
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Name as used in `isc_dpb_lc_ctype`.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Maximum bytes one character occupies.
    #[must_use]
    pub fn bytes_per_char(&self) -> u8 {
        self.bytes_per_char
    }

    /// Number of characters a column of `byte_length` bytes holds.
    #[must_use]
    pub fn char_count(&self, byte_length: i32) -> i32 {
        byte_length.max(0) / i32::from(self.bytes_per_char)
    }

    /// Whether values in this charset are binary.
    #[must_use]
    pub fn is_octets(&self) -> bool {
        self.id == Self::OCTETS.id
    }

    /// Text encoding, `None` for pass-through charsets.
    fn encoding(&self) -> Option<&'static Encoding> {
        match self.id {
            2 | 21 | 53 => Some(encoding_rs::WINDOWS_1252),
            3 | 4 => Some(encoding_rs::UTF_8),
            5 => Some(encoding_rs::SHIFT_JIS),
            6 => Some(encoding_rs::EUC_JP),
            22 => Some(encoding_rs::ISO_8859_2),
            23 => Some(encoding_rs::ISO_8859_3),
            34 => Some(encoding_rs::ISO_8859_4),
            35 => Some(encoding_rs::ISO_8859_5),
            36 => Some(encoding_rs::ISO_8859_6),
            37 => Some(encoding_rs::ISO_8859_7),
            38 => Some(encoding_rs::ISO_8859_8),
            39 | 55 => Some(encoding_rs::WINDOWS_1254),
            40 => Some(encoding_rs::ISO_8859_13),
            44 => Some(encoding_rs::EUC_KR),
            48 => Some(encoding_rs::IBM866),
            51 => Some(encoding_rs::WINDOWS_1250),
            52 => Some(encoding_rs::WINDOWS_1251),
            54 => Some(encoding_rs::WINDOWS_1253),
            56 => Some(encoding_rs::BIG5),
            57 | 67 => Some(encoding_rs::GBK),
            58 => Some(encoding_rs::WINDOWS_1255),
            59 => Some(encoding_rs::WINDOWS_1256),
            60 => Some(encoding_rs::WINDOWS_1257),
            63 => Some(encoding_rs::KOI8_R),
            64 => Some(encoding_rs::KOI8_U),
            65 => Some(encoding_rs::WINDOWS_1258),
            66 => Some(encoding_rs::WINDOWS_874),
            69 => Some(encoding_rs::GB18030),
            _ => None,
        }
    }

    /// Decode text received from the server.
    pub fn decode<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, str>, TypeError> {
        match self.encoding() {
            Some(encoding) => {
                let (text, had_errors) = encoding.decode_without_bom_handling(data);
                if had_errors {
                    return Err(TypeError::InvalidEncoding(format!(
                        "invalid {} sequence",
                        self.name
                    )));
                }
                Ok(text)
            }
            None => Ok(String::from_utf8_lossy(data)),
        }
    }

    /// Encode text for transmission.
    pub fn encode<'a>(&self, text: &'a str) -> Result<Cow<'a, [u8]>, TypeError> {
        match self.encoding() {
            Some(encoding) => {
                let (bytes, _, had_errors) = encoding.encode(text);
                if had_errors {
                    return Err(TypeError::InvalidEncoding(format!(
                        "text not representable in {}",
                        self.name
                    )));
                }
                Ok(bytes)
            }
            None => Ok(Cow::Borrowed(text.as_bytes())),
        }
    }

    /// Charset used for a column, given the connection charset.
    ///
    /// The server transliterates into the connection charset unless it is
    /// `NONE`, in which case the column's declared charset applies.
    #[must_use]
    pub fn for_column(connection: Charset, column_charset_id: i32) -> Charset {
        if column_charset_id == Self::OCTETS.id {
            return Self::OCTETS;
        }
        if connection.id != Self::NONE.id {
            return connection;
        }
        Self::from_id(column_charset_id).unwrap_or(Self::NONE)
    }
}

impl Default for Charset {
    fn default() -> Self {
        Self::NONE
    }
}

impl std::fmt::Display for Charset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name_and_id() {
        let utf8 = Charset::from_name("utf8").unwrap();
        assert_eq!(utf8.id(), 4);
        assert_eq!(utf8.bytes_per_char(), 4);
        assert_eq!(Charset::from_id(52).unwrap().name(), "WIN1251");
        assert!(Charset::from_name("KLINGON").is_none());
    }

    #[test]
    fn test_char_count() {
        assert_eq!(Charset::UTF8.char_count(40), 10);
        assert_eq!(Charset::NONE.char_count(40), 40);
    }

    #[test]
    fn test_win1251_round_trip() {
        let cs = Charset::from_name("WIN1251").unwrap();
        let encoded = cs.encode("Привет").unwrap();
        assert_eq!(encoded.len(), 6);
        assert_eq!(cs.decode(&encoded).unwrap(), "Привет");
    }

    #[test]
    fn test_unrepresentable_text() {
        let cs = Charset::from_name("WIN1252").unwrap();
        assert!(matches!(
            cs.encode("日本"),
            Err(TypeError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn test_column_charset_selection() {
        assert_eq!(Charset::for_column(Charset::UTF8, 52), Charset::UTF8);
        assert_eq!(Charset::for_column(Charset::NONE, 52).name(), "WIN1251");
        assert_eq!(Charset::for_column(Charset::UTF8, 1), Charset::OCTETS);
    }
}
