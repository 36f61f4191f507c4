// src/ndef.rs
use log::debug;

use crate::error::NdefError;
use crate::record::{self, RecordFlags};
use crate::types::{NdefRecord, Tnf};

pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 32 * 1024;

// URI identifier codes from the NFC Forum URI record type definition
const URI_PREFIXES: [&str; 36] = [
    "",
    "http://www.",
    "https://www.",
    "http://",
    "https://",
    "tel:",
    "mailto:",
    "ftp://anonymous:anonymous@",
    "ftp://ftp.",
    "ftps://",
    "sftp://",
    "smb://",
    "nfs://",
    "ftp://",
    "dav://",
    "news:",
    "telnet://",
    "imap:",
    "rtsp://",
    "urn:",
    "pop:",
    "sip:",
    "sips:",
    "tftp:",
    "btspp://",
    "btl2cap://",
    "btgoep://",
    "tcpobex://",
    "irdaobex://",
    "file://",
    "urn:epc:id:",
    "urn:epc:tag:",
    "urn:epc:pat:",
    "urn:epc:raw:",
    "urn:epc:",
    "urn:nfc:",
];

/// Message codec, bounded by a maximum total size so a hostile tag cannot
/// make us allocate arbitrarily.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NdefCodec {
    max_message_size: usize,
}

impl Default for NdefCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

impl NdefCodec {
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    pub fn encode(&self, records: &[NdefRecord]) -> Result<Vec<u8>, NdefError> {
        if records.is_empty() {
            return Err(NdefError::EmptyMessage);
        }

        let mut message = Vec::new();
        for (i, record) in records.iter().enumerate() {
            let flags = RecordFlags {
                message_begin: i == 0,
                message_end: i == records.len() - 1,
            };
            message.extend(record::encode_with_flags(record, flags)?);

            if message.len() > self.max_message_size {
                return Err(NdefError::MessageTooLarge {
                    size: message.len(),
                    max: self.max_message_size,
                });
            }
        }

        Ok(message)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<NdefRecord>, NdefError> {
        if bytes.len() > self.max_message_size {
            return Err(NdefError::MessageTooLarge {
                size: bytes.len(),
                max: self.max_message_size,
            });
        }

        let mut records = Vec::new();
        let mut cursor = 0;

        while cursor < bytes.len() {
            let decoded = record::decode(bytes, cursor)?;
            let index = records.len();

            // MB must be set on the first record and nowhere else
            if decoded.flags.message_begin != (index == 0) {
                return Err(NdefError::UnexpectedRecord { index });
            }

            cursor += decoded.consumed;
            records.push(decoded.record);

            if decoded.flags.message_end {
                if cursor < bytes.len() {
                    debug!(
                        "Ignoring {} trailing bytes after NDEF message end",
                        bytes.len() - cursor
                    );
                }
                return Ok(records);
            }
        }

        Err(NdefError::MissingMessageEnd)
    }
}

// Text Record payload: [Status Byte] + [Lang Code] + [Text]
pub fn text_record(lang: &str, text: &str) -> Result<NdefRecord, NdefError> {
    let lang = lang.as_bytes();
    // Bits 5-0 hold the lang length
    if lang.len() > 0x3F {
        return Err(NdefError::FieldTooLong {
            field: "lang",
            len: lang.len(),
        });
    }
    // Bit 7=0 (UTF-8)
    let status_byte = lang.len() as u8;

    let mut payload = Vec::with_capacity(1 + lang.len() + text.len());
    payload.push(status_byte);
    payload.extend_from_slice(lang);
    payload.extend_from_slice(text.as_bytes());

    Ok(NdefRecord::new(Tnf::WellKnown, b"T".to_vec(), payload))
}

// URI Record payload: [Prefix Code] + [Rest of URI]
pub fn uri_record(uri: &str) -> NdefRecord {
    let (code, prefix) = URI_PREFIXES
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, prefix)| uri.starts_with(*prefix))
        .max_by_key(|(_, prefix)| prefix.len())
        .map(|(code, prefix)| (code as u8, *prefix))
        .unwrap_or((0x00, ""));

    let mut payload = Vec::with_capacity(1 + uri.len() - prefix.len());
    payload.push(code);
    payload.extend_from_slice(&uri.as_bytes()[prefix.len()..]);

    NdefRecord::new(Tnf::WellKnown, b"U".to_vec(), payload)
}

impl NdefRecord {
    fn is_well_known(&self, record_type: &[u8]) -> bool {
        self.tnf == Tnf::WellKnown && self.record_type == record_type
    }

    /// Text of a well-known `T` record.
    pub fn text(&self) -> Option<String> {
        if !self.is_well_known(b"T") {
            return None;
        }

        let (&status_byte, rest) = self.payload.split_first()?;
        let lang_len = (status_byte & 0x3F) as usize;
        let text_bytes = rest.get(lang_len..)?;

        if status_byte & 0x80 == 0 {
            String::from_utf8(text_bytes.to_vec()).ok()
        } else {
            let units: Vec<u16> = text_bytes
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16(&units).ok()
        }
    }

    /// Expanded URI of a well-known `U` record, or of an absolute-URI record.
    pub fn uri(&self) -> Option<String> {
        if self.tnf == Tnf::Uri {
            return String::from_utf8(self.record_type.clone()).ok();
        }
        if !self.is_well_known(b"U") {
            return None;
        }

        let (&code, rest) = self.payload.split_first()?;
        let prefix = URI_PREFIXES.get(code as usize)?;
        let rest = std::str::from_utf8(rest).ok()?;
        Some(format!("{prefix}{rest}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hello_world() -> NdefRecord {
        NdefRecord::media("text/plain", b"Hello world".to_vec())
    }

    #[test]
    fn single_record_sets_both_flags() {
        let bytes = NdefCodec::default().encode(&[hello_world()]).unwrap();
        assert_eq!(bytes[0] & 0xC0, 0xC0);
    }

    #[test]
    fn multi_record_message_keeps_order() {
        let records = vec![
            text_record("en", "first").unwrap(),
            hello_world().with_id(vec![1]),
            uri_record("https://example.com"),
        ];
        let codec = NdefCodec::default();

        let bytes = codec.encode(&records).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), records);

        // Only the first header carries MB, only the last carries ME
        let first = record::decode(&bytes, 0).unwrap();
        let second = record::decode(&bytes, first.consumed).unwrap();
        assert_eq!(
            first.flags,
            RecordFlags {
                message_begin: true,
                message_end: false
            }
        );
        assert_eq!(second.flags, RecordFlags::default());
    }

    #[test]
    fn empty_message_is_rejected() {
        assert_eq!(NdefCodec::default().encode(&[]), Err(NdefError::EmptyMessage));
    }

    #[test]
    fn missing_message_end_is_rejected() {
        let codec = NdefCodec::default();
        let record = record::encode_with_flags(
            &hello_world(),
            RecordFlags {
                message_begin: true,
                message_end: false,
            },
        )
        .unwrap();

        assert_eq!(codec.decode(&record), Err(NdefError::MissingMessageEnd));
        assert_eq!(codec.decode(&[]), Err(NdefError::MissingMessageEnd));
    }

    #[test]
    fn begin_flag_mid_message_is_rejected() {
        let mut bytes = record::encode_with_flags(
            &hello_world(),
            RecordFlags {
                message_begin: true,
                message_end: false,
            },
        )
        .unwrap();
        bytes.extend(record::encode(&hello_world()).unwrap());

        assert_eq!(
            NdefCodec::default().decode(&bytes),
            Err(NdefError::UnexpectedRecord { index: 1 })
        );
    }

    #[test]
    fn first_record_without_begin_flag_is_rejected() {
        let bytes = record::encode_with_flags(
            &hello_world(),
            RecordFlags {
                message_begin: false,
                message_end: true,
            },
        )
        .unwrap();

        assert_eq!(
            NdefCodec::default().decode(&bytes),
            Err(NdefError::UnexpectedRecord { index: 0 })
        );
    }

    #[test]
    fn trailing_terminator_is_ignored() {
        let codec = NdefCodec::default();
        let mut bytes = codec.encode(&[hello_world()]).unwrap();
        bytes.extend([0xFE, 0x00, 0x00]);
        assert_eq!(codec.decode(&bytes).unwrap(), vec![hello_world()]);
    }

    #[test]
    fn size_limit_applies_both_ways() {
        let codec = NdefCodec::new(16);
        let big = NdefRecord::media("text/plain", vec![b'x'; 32]);

        assert_eq!(
            codec.encode(&[big.clone()]),
            Err(NdefError::MessageTooLarge { size: 45, max: 16 })
        );

        let bytes = NdefCodec::default().encode(&[big]).unwrap();
        assert!(matches!(
            codec.decode(&bytes),
            Err(NdefError::MessageTooLarge { size: 45, max: 16 })
        ));
    }

    #[test]
    fn record_errors_propagate_from_encode() {
        let records = vec![
            hello_world(),
            NdefRecord::new(Tnf::Reserved, Vec::new(), Vec::new()),
        ];
        assert_eq!(
            NdefCodec::default().encode(&records),
            Err(NdefError::InvalidTnf(7))
        );
    }

    #[test]
    fn text_record_layout() {
        let record = text_record("en", "hi").unwrap();
        assert_eq!(record.payload, vec![0x02, b'e', b'n', b'h', b'i']);
        assert_eq!(record.text().as_deref(), Some("hi"));
        assert_eq!(hello_world().text(), None);
    }

    #[test]
    fn text_record_lang_fits_status_byte() {
        let record = text_record(&"x".repeat(63), "hello").unwrap();
        assert_eq!(record.payload[0], 0x3F);
        assert_eq!(record.text().as_deref(), Some("hello"));

        assert_eq!(
            text_record(&"x".repeat(64), "hello"),
            Err(NdefError::FieldTooLong {
                field: "lang",
                len: 64,
            })
        );
    }

    #[test]
    fn utf16_text_is_decoded() {
        let record = NdefRecord::new(
            Tnf::WellKnown,
            b"T".to_vec(),
            vec![0x82, b'd', b'e', 0x00, b'o', 0x00, b'k'],
        );
        assert_eq!(record.text().as_deref(), Some("ok"));
    }

    #[test]
    fn uri_record_uses_longest_prefix() {
        let record = uri_record("https://www.example.com");
        assert_eq!(record.payload[0], 0x02);
        assert_eq!(&record.payload[1..], b"example.com");
        assert_eq!(record.uri().as_deref(), Some("https://www.example.com"));

        let record = uri_record("urn:epc:id:sgtin:1");
        assert_eq!(record.payload[0], 0x1E);

        let record = uri_record("custom:thing");
        assert_eq!(record.payload[0], 0x00);
        assert_eq!(record.uri().as_deref(), Some("custom:thing"));
    }
}
