// src/record.rs
use crate::error::NdefError;
use crate::types::{NdefRecord, Tnf};

// Header byte: Bit 7: MB, Bit 6: ME, Bit 5: CF, Bit 4: SR, Bit 3: IL, Bits 2-0: TNF
pub const FLAG_MB: u8 = 0x80;
pub const FLAG_ME: u8 = 0x40;
pub const FLAG_CF: u8 = 0x20;
pub const FLAG_SR: u8 = 0x10;
pub const FLAG_IL: u8 = 0x08;
pub const TNF_MASK: u8 = 0x07;

/// Message position bits of a record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordFlags {
    pub message_begin: bool,
    pub message_end: bool,
}

impl RecordFlags {
    pub const SOLE: RecordFlags = RecordFlags {
        message_begin: true,
        message_end: true,
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord {
    pub record: NdefRecord,
    pub flags: RecordFlags,
    pub consumed: usize,
}

/// Encodes a standalone record (both MB and ME set).
pub fn encode(record: &NdefRecord) -> Result<Vec<u8>, NdefError> {
    encode_with_flags(record, RecordFlags::SOLE)
}

pub fn encode_with_flags(record: &NdefRecord, flags: RecordFlags) -> Result<Vec<u8>, NdefError> {
    if record.tnf == Tnf::Reserved {
        return Err(NdefError::InvalidTnf(record.tnf.into()));
    }

    let type_field = type_field(record)?;
    check_type_shape(record.tnf, type_field, &record.id, &record.payload)?;

    if type_field.len() > u8::MAX as usize {
        return Err(NdefError::FieldTooLong {
            field: "type",
            len: type_field.len(),
        });
    }
    if record.id.len() > u8::MAX as usize {
        return Err(NdefError::FieldTooLong {
            field: "id",
            len: record.id.len(),
        });
    }
    let payload_len = u32::try_from(record.payload.len()).map_err(|_| NdefError::FieldTooLong {
        field: "payload",
        len: record.payload.len(),
    })?;

    let short_record = payload_len <= u8::MAX as u32;
    let has_id = !record.id.is_empty();

    let mut header = u8::from(record.tnf);
    if flags.message_begin {
        header |= FLAG_MB;
    }
    if flags.message_end {
        header |= FLAG_ME;
    }
    if short_record {
        header |= FLAG_SR;
    }
    if has_id {
        header |= FLAG_IL;
    }

    let mut out = Vec::with_capacity(
        7 + type_field.len() + record.id.len() + record.payload.len(),
    );
    out.push(header);
    out.push(type_field.len() as u8);
    if short_record {
        out.push(payload_len as u8);
    } else {
        out.extend_from_slice(&payload_len.to_be_bytes());
    }
    if has_id {
        out.push(record.id.len() as u8);
    }
    out.extend_from_slice(type_field);
    out.extend_from_slice(&record.id);
    out.extend_from_slice(&record.payload);

    Ok(out)
}

/// Decodes the record starting at `offset`.
pub fn decode(bytes: &[u8], offset: usize) -> Result<DecodedRecord, NdefError> {
    let mut reader = Reader::new(bytes, offset);

    let header = reader.u8()?;
    let tnf = Tnf::try_from(header & TNF_MASK)?;

    if header & FLAG_CF != 0 {
        return Err(malformed(offset, header, "chunked records are not supported"));
    }

    let type_len = reader.u8()? as usize;
    let payload_len = if header & FLAG_SR != 0 {
        reader.u8()? as usize
    } else {
        let raw = reader.take(4)?;
        u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize
    };
    let id_len = if header & FLAG_IL != 0 {
        reader.u8()? as usize
    } else {
        0
    };

    match tnf {
        Tnf::Empty if type_len != 0 || id_len != 0 || payload_len != 0 => {
            return Err(malformed(offset, header, "EMPTY record with non-zero lengths"));
        }
        Tnf::Unknown | Tnf::Unchanged if type_len != 0 => {
            return Err(malformed(offset, header, "type length must be zero for this TNF"));
        }
        Tnf::Media if type_len == 0 => {
            return Err(NdefError::InvalidMimeType("MEDIA record needs a mime type".into()));
        }
        _ => {}
    }

    let type_field = reader.take(type_len)?;
    let id = reader.take(id_len)?.to_vec();
    let payload = reader.take(payload_len)?.to_vec();

    let (mime_type, record_type) = if tnf == Tnf::Media {
        let mime = std::str::from_utf8(type_field)
            .map_err(|_| NdefError::InvalidMimeType("type field is not UTF-8".into()))?;
        (Some(mime.to_string()), Vec::new())
    } else {
        (None, type_field.to_vec())
    };

    Ok(DecodedRecord {
        record: NdefRecord {
            id,
            tnf,
            mime_type,
            record_type,
            payload,
        },
        flags: RecordFlags {
            message_begin: header & FLAG_MB != 0,
            message_end: header & FLAG_ME != 0,
        },
        consumed: reader.consumed(),
    })
}

fn type_field(record: &NdefRecord) -> Result<&[u8], NdefError> {
    match (record.tnf, record.mime_type.as_deref()) {
        (Tnf::Media, Some(mime)) if !mime.is_empty() => {
            if !record.record_type.is_empty() {
                return Err(NdefError::InvalidMimeType(
                    "MEDIA record carries its type in the mime type".into(),
                ));
            }
            Ok(mime.as_bytes())
        }
        (Tnf::Media, _) => Err(NdefError::InvalidMimeType(
            "MEDIA record needs a mime type".into(),
        )),
        (tnf, Some(mime)) => Err(NdefError::InvalidMimeType(format!(
            "{mime:?} set on a record with TNF {}",
            u8::from(tnf)
        ))),
        (_, None) => Ok(&record.record_type),
    }
}

fn check_type_shape(tnf: Tnf, type_field: &[u8], id: &[u8], payload: &[u8]) -> Result<(), NdefError> {
    let reason = match tnf {
        Tnf::Empty if !type_field.is_empty() || !id.is_empty() || !payload.is_empty() => {
            "EMPTY record must not carry type, id or payload"
        }
        Tnf::Unknown | Tnf::Unchanged if !type_field.is_empty() => "record type must be empty",
        _ => return Ok(()),
    };
    Err(NdefError::InvalidRecordType {
        tnf: tnf.into(),
        reason,
    })
}

fn malformed(offset: usize, header: u8, reason: &'static str) -> NdefError {
    NdefError::MalformedHeader {
        offset,
        header,
        reason,
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    start: usize,
    cursor: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8], start: usize) -> Self {
        Self {
            bytes,
            start,
            cursor: start,
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], NdefError> {
        let remaining = self.bytes.len().saturating_sub(self.cursor);
        if len > remaining {
            return Err(NdefError::TruncatedRecord {
                offset: self.start,
                needed: self.consumed() + len,
                available: self.bytes.len().saturating_sub(self.start),
            });
        }
        let slice = &self.bytes[self.cursor..self.cursor + len];
        self.cursor += len;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, NdefError> {
        Ok(self.take(1)?[0])
    }

    fn consumed(&self) -> usize {
        self.cursor - self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hello_world() -> NdefRecord {
        NdefRecord::media("text/plain", b"Hello world".to_vec())
    }

    #[test]
    fn encodes_short_media_record() {
        let bytes = encode(&hello_world()).unwrap();

        // MB | ME | SR | TNF=MEDIA
        assert_eq!(bytes[0], 0xD2);
        assert_eq!(bytes[1], 10);
        assert_eq!(bytes[2], 11);
        assert_eq!(&bytes[3..13], b"text/plain");
        assert_eq!(&bytes[13..], b"Hello world");
    }

    #[test]
    fn round_trips_every_encodable_tnf() {
        let records = vec![
            NdefRecord::new(Tnf::Empty, Vec::new(), Vec::new()),
            NdefRecord::new(Tnf::WellKnown, b"T".to_vec(), b"\x02enhi".to_vec()),
            hello_world().with_id(b"rec-1".to_vec()),
            NdefRecord::new(Tnf::Uri, b"https://example.com/x".to_vec(), vec![]),
            NdefRecord::new(Tnf::ExternalType, b"android.com:pkg".to_vec(), b"org.app".to_vec()),
            NdefRecord::new(Tnf::Unknown, Vec::new(), vec![0xde, 0xad]),
            NdefRecord::new(Tnf::Unchanged, Vec::new(), vec![1]),
        ];

        for record in records {
            let bytes = encode(&record).unwrap();
            let decoded = decode(&bytes, 0).unwrap();
            assert_eq!(decoded.record, record);
            assert_eq!(decoded.consumed, bytes.len());
            assert_eq!(decoded.flags, RecordFlags::SOLE);
        }
    }

    #[test]
    fn long_payload_uses_four_byte_length() {
        let record = NdefRecord::media("application/octet-stream", vec![0xAB; 300]);
        let bytes = encode(&record).unwrap();

        assert_eq!(bytes[0] & FLAG_SR, 0);
        assert_eq!(&bytes[2..6], &300u32.to_be_bytes());
        assert_eq!(decode(&bytes, 0).unwrap().record, record);
    }

    #[test]
    fn id_sets_il_flag_and_length() {
        let bytes = encode(&hello_world().with_id(vec![9, 8, 7])).unwrap();
        assert_ne!(bytes[0] & FLAG_IL, 0);
        assert_eq!(bytes[3], 3);

        let bytes = encode(&hello_world()).unwrap();
        assert_eq!(bytes[0] & FLAG_IL, 0);
    }

    #[test]
    fn rejects_reserved_tnf_on_encode() {
        let record = NdefRecord::new(Tnf::Reserved, Vec::new(), vec![1]);
        assert_eq!(encode(&record), Err(NdefError::InvalidTnf(7)));
    }

    #[test]
    fn accepts_reserved_tnf_on_decode() {
        let bytes = [FLAG_MB | FLAG_ME | FLAG_SR | 0x07, 0, 1, 0x42];
        let decoded = decode(&bytes, 0).unwrap();
        assert_eq!(decoded.record.tnf, Tnf::Reserved);
        assert_eq!(decoded.record.payload, vec![0x42]);
    }

    #[test]
    fn mime_type_only_allowed_on_media() {
        let mut record = NdefRecord::new(Tnf::WellKnown, b"T".to_vec(), vec![]);
        record.mime_type = Some("text/plain".into());
        assert!(matches!(encode(&record), Err(NdefError::InvalidMimeType(_))));

        let mut record = hello_world();
        record.mime_type = None;
        assert!(matches!(encode(&record), Err(NdefError::InvalidMimeType(_))));

        let mut record = hello_world();
        record.record_type = b"T".to_vec();
        assert!(matches!(encode(&record), Err(NdefError::InvalidMimeType(_))));
    }

    #[test]
    fn empty_record_must_be_empty() {
        let record = NdefRecord::new(Tnf::Empty, Vec::new(), vec![1]);
        assert!(matches!(
            encode(&record),
            Err(NdefError::InvalidRecordType { tnf: 0, .. })
        ));
    }

    #[test]
    fn rejects_oversized_type_field() {
        let record = NdefRecord::new(Tnf::ExternalType, vec![b'a'; 256], vec![]);
        assert_eq!(
            encode(&record),
            Err(NdefError::FieldTooLong {
                field: "type",
                len: 256
            })
        );
    }

    #[test]
    fn truncated_payload_is_reported() {
        let mut bytes = encode(&hello_world()).unwrap();
        bytes.truncate(bytes.len() - 3);
        assert_eq!(
            decode(&bytes, 0),
            Err(NdefError::TruncatedRecord {
                offset: 0,
                needed: 24,
                available: 21,
            })
        );
    }

    #[test]
    fn truncated_header_is_reported() {
        assert!(matches!(
            decode(&[0xD2], 0),
            Err(NdefError::TruncatedRecord { .. })
        ));
        assert!(matches!(
            decode(&[], 0),
            Err(NdefError::TruncatedRecord { .. })
        ));
    }

    #[test]
    fn chunked_records_are_malformed() {
        let bytes = [FLAG_MB | FLAG_CF | FLAG_SR | 0x02, 0, 0];
        assert!(matches!(
            decode(&bytes, 0),
            Err(NdefError::MalformedHeader { offset: 0, .. })
        ));
    }

    #[test]
    fn empty_tnf_with_payload_is_malformed() {
        let bytes = [FLAG_MB | FLAG_ME | FLAG_SR, 0, 1, 0xFF];
        assert!(matches!(
            decode(&bytes, 0),
            Err(NdefError::MalformedHeader { .. })
        ));
    }

    #[test]
    fn media_without_mime_type_is_rejected() {
        let bytes = [FLAG_MB | FLAG_ME | FLAG_SR | 0x02, 0, 1, b'A'];
        assert!(matches!(
            decode(&bytes, 0),
            Err(NdefError::InvalidMimeType(_))
        ));
    }

    #[test]
    fn tolerates_zero_length_id_and_payload() {
        // IL set with a zero id length
        let bytes = [FLAG_MB | FLAG_ME | FLAG_SR | FLAG_IL | 0x01, 1, 0, 0, b'U'];
        let decoded = decode(&bytes, 0).unwrap();
        assert!(decoded.record.id.is_empty());
        assert!(decoded.record.payload.is_empty());
        assert_eq!(decoded.record.record_type, b"U".to_vec());
        assert_eq!(decoded.consumed, 5);
    }

    #[test]
    fn decodes_from_offset() {
        let mut bytes = vec![0xAA, 0xBB];
        bytes.extend(encode(&hello_world()).unwrap());
        let decoded = decode(&bytes, 2).unwrap();
        assert_eq!(decoded.record, hello_world());
        assert_eq!(decoded.consumed, bytes.len() - 2);
    }
}
