// src/types.rs
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::{NdefError, SessionError};

/// Type Name Format, the 3-bit type namespace of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Tnf {
    Empty = 0x00,
    WellKnown = 0x01,
    Media = 0x02,
    Uri = 0x03,
    ExternalType = 0x04,
    Unknown = 0x05,
    Unchanged = 0x06,
    Reserved = 0x07,
}

impl TryFrom<u8> for Tnf {
    type Error = NdefError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x00 => Tnf::Empty,
            0x01 => Tnf::WellKnown,
            0x02 => Tnf::Media,
            0x03 => Tnf::Uri,
            0x04 => Tnf::ExternalType,
            0x05 => Tnf::Unknown,
            0x06 => Tnf::Unchanged,
            0x07 => Tnf::Reserved,
            other => return Err(NdefError::InvalidTnf(other)),
        })
    }
}

impl From<Tnf> for u8 {
    fn from(tnf: Tnf) -> u8 {
        tnf as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NdefRecord {
    #[serde(default)]
    pub id: Vec<u8>,
    pub tnf: Tnf,
    #[serde(default)]
    pub mime_type: Option<String>,
    // Type field for everything but MEDIA, e.g. b"T" for a well-known text record
    #[serde(default)]
    pub record_type: Vec<u8>,
    #[serde(default, alias = "ndefData")]
    pub payload: Vec<u8>,
}

impl NdefRecord {
    pub fn new(tnf: Tnf, record_type: Vec<u8>, payload: Vec<u8>) -> Self {
        Self {
            id: Vec::new(),
            tnf,
            mime_type: None,
            record_type,
            payload,
        }
    }

    pub fn media(mime_type: &str, payload: Vec<u8>) -> Self {
        Self {
            id: Vec::new(),
            tnf: Tnf::Media,
            mime_type: Some(mime_type.to_string()),
            record_type: Vec::new(),
            payload,
        }
    }

    pub fn with_id(mut self, id: Vec<u8>) -> Self {
        self.id = id;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionMode {
    Read,
    Write,
    ReadThenWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a successful `beginSession` hands back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagScan {
    pub tag_serial: String,
    pub records: Vec<NdefRecord>,
}

/// Formats a tag UID as `12:AB:FF:33:CD:D0:B2`.
pub fn format_tag_serial(uid: &[u8]) -> String {
    let hex = hex::encode_upper(uid);
    let mut serial = String::with_capacity(hex.len() + uid.len().saturating_sub(1));
    for (i, digit) in hex.chars().enumerate() {
        if i > 0 && i % 2 == 0 {
            serial.push(':');
        }
        serial.push(digit);
    }
    serial
}

pub type Responder<T> = oneshot::Sender<Result<T, SessionError>>;

/// Instructions from the session machine to the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioAction {
    BeginPolling {
        session: SessionId,
        alert_message: Option<String>,
    },
    WriteMessage {
        session: SessionId,
        tag_serial: String,
        message: Vec<u8>,
    },
    Invalidate {
        session: SessionId,
        alert_message: Option<String>,
    },
}

/// Hardware happenings reported by the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    TagDetected {
        session: SessionId,
        uid: Vec<u8>,
        message: Vec<u8>,
    },
    WriteCompleted {
        session: SessionId,
        result: Result<(), String>,
    },
    UserCanceled {
        session: SessionId,
    },
    RadioError {
        session: SessionId,
        error: String,
    },
}

impl RadioEvent {
    pub fn session(&self) -> SessionId {
        match self {
            RadioEvent::TagDetected { session, .. }
            | RadioEvent::WriteCompleted { session, .. }
            | RadioEvent::UserCanceled { session }
            | RadioEvent::RadioError { session, .. } => *session,
        }
    }
}

// Commands sent from the bridge and the radio -> NFC thread
#[derive(Debug)]
pub enum NfcCommand {
    HasNfc {
        reply: Responder<bool>,
    },
    BeginSession {
        mode: SessionMode,
        keep_alive_after_read: bool,
        alert_message: Option<String>,
        reply: Responder<TagScan>,
    },
    Write {
        records: Vec<NdefRecord>,
        alert_message: Option<String>,
        written_alert_message: Option<String>,
        reply: Responder<()>,
    },
    EndSession {
        reply: Responder<()>,
    },
    Radio(RadioEvent),
}

// Messages received FROM a WebSocket client (caller or radio host)
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum IncomingMessage {
    HasNfc {
        request_id: u64,
    },
    BeginSession {
        request_id: u64,
        mode: SessionMode,
        #[serde(default)]
        keep_alive_after_read: bool,
        alert_message: Option<String>,
    },
    Write {
        request_id: u64,
        records: Vec<NdefRecord>,
        alert_message: Option<String>,
        written_alert_message: Option<String>,
    },
    EndSession {
        request_id: u64,
    },
    TagDetected {
        session_id: SessionId,
        tag_id: Vec<u8>,
        #[serde(default)]
        message: Vec<u8>,
    },
    TagWritten {
        session_id: SessionId,
        error: Option<String>,
    },
    UserCanceled {
        session_id: SessionId,
    },
    RadioError {
        session_id: SessionId,
        error: String,
    },
}

// Messages sent TO WebSocket clients
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum OutgoingMessage {
    NfcSupport {
        request_id: u64,
        enabled: bool,
    },
    TagRead {
        request_id: u64,
        tag: TagScan,
    },
    Written {
        request_id: u64,
    },
    SessionEnded {
        request_id: u64,
    },
    RequestFailed {
        request_id: u64,
        code: &'static str,
        detail: Option<String>,
    },
    ProtocolError {
        error: String,
    },
    BeginPolling {
        session_id: SessionId,
        alert_message: Option<String>,
    },
    WriteTag {
        session_id: SessionId,
        tag_serial: String,
        message: Vec<u8>,
    },
    Invalidate {
        session_id: SessionId,
        alert_message: Option<String>,
    },
}

impl OutgoingMessage {
    pub fn failed(request_id: u64, err: &SessionError) -> Self {
        OutgoingMessage::RequestFailed {
            request_id,
            code: err.code(),
            detail: err.detail(),
        }
    }
}

impl From<RadioAction> for OutgoingMessage {
    fn from(action: RadioAction) -> Self {
        match action {
            RadioAction::BeginPolling {
                session,
                alert_message,
            } => OutgoingMessage::BeginPolling {
                session_id: session,
                alert_message,
            },
            RadioAction::WriteMessage {
                session,
                tag_serial,
                message,
            } => OutgoingMessage::WriteTag {
                session_id: session,
                tag_serial,
                message,
            },
            RadioAction::Invalidate {
                session,
                alert_message,
            } => OutgoingMessage::Invalidate {
                session_id: session,
                alert_message,
            },
        }
    }
}
