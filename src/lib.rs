// src/lib.rs
//! NFC bridge service: NDEF record and message codec, a single-session state
//! machine driven by radio events, and the caller-facing bridge on top.

pub mod bridge;
pub mod config;
pub mod error;
pub mod ndef;
pub mod nfc_service;
pub mod record;
pub mod session;
pub mod types;
pub mod ws;

pub use bridge::{NfcBridge, RadioEvents};
pub use config::ServiceConfig;
pub use error::{NdefError, SessionError};
pub use ndef::NdefCodec;
pub use nfc_service::TagRadio;
pub use types::{NdefRecord, SessionMode, TagScan, Tnf};
