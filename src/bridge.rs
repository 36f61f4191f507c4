// src/bridge.rs
use std::io;
use std::thread::JoinHandle;

use crossbeam_channel::{Sender, unbounded};
use log::warn;
use tokio::sync::oneshot;

use crate::config::ServiceConfig;
use crate::error::SessionError;
use crate::nfc_service::{NfcService, TagRadio};
use crate::types::{NdefRecord, NfcCommand, RadioEvent, Responder, SessionMode, TagScan};

/// Caller-facing handle to the NFC service thread.
///
/// Every method resolves exactly once, with either the result or a failure
/// signal. Cloning is cheap; the service stops once every handle is dropped.
#[derive(Debug, Clone)]
pub struct NfcBridge {
    commands: Sender<NfcCommand>,
}

/// Where the radio reports what happened at the hardware.
#[derive(Debug, Clone)]
pub struct RadioEvents {
    commands: Sender<NfcCommand>,
}

impl NfcBridge {
    /// Starts the service on its own OS thread; the session loop blocks
    /// between events so it stays off the async runtime.
    pub fn spawn<R: TagRadio>(radio: R, config: &ServiceConfig) -> io::Result<(Self, JoinHandle<()>)> {
        let (cmd_tx, cmd_rx) = unbounded::<NfcCommand>();
        let service = NfcService::new(radio, config);

        let handle = std::thread::Builder::new()
            .name("nfc-service".into())
            .spawn(move || service.run(cmd_rx))?;

        Ok((Self { commands: cmd_tx }, handle))
    }

    pub fn radio_events(&self) -> RadioEvents {
        RadioEvents {
            commands: self.commands.clone(),
        }
    }

    pub async fn has_nfc_support(&self) -> Result<bool, SessionError> {
        self.request(|reply| NfcCommand::HasNfc { reply }).await
    }

    pub async fn begin_session(
        &self,
        mode: SessionMode,
        keep_alive_after_read: bool,
        alert_message: Option<String>,
    ) -> Result<TagScan, SessionError> {
        self.request(|reply| NfcCommand::BeginSession {
            mode,
            keep_alive_after_read,
            alert_message,
            reply,
        })
        .await
    }

    pub async fn write(
        &self,
        records: Vec<NdefRecord>,
        alert_message: Option<String>,
        written_alert_message: Option<String>,
    ) -> Result<(), SessionError> {
        self.request(|reply| NfcCommand::Write {
            records,
            alert_message,
            written_alert_message,
            reply,
        })
        .await
    }

    pub async fn end_session(&self) -> Result<(), SessionError> {
        self.request(|reply| NfcCommand::EndSession { reply }).await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Responder<T>) -> NfcCommand,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();

        if self.commands.send(command(reply)).is_err() {
            return Err(unavailable());
        }
        rx.await.unwrap_or_else(|_| Err(unavailable()))
    }
}

impl RadioEvents {
    /// Returns false when the service is no longer running.
    pub fn post(&self, event: RadioEvent) -> bool {
        match self.commands.send(NfcCommand::Radio(event)) {
            Ok(()) => true,
            Err(err) => {
                warn!("NFC service gone, dropping {:?}", err.into_inner());
                false
            }
        }
    }
}

fn unavailable() -> SessionError {
    SessionError::Failed("nfc service unavailable".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RadioAction;

    struct Unsupported;

    impl TagRadio for Unsupported {
        fn has_nfc(&self) -> Result<bool, String> {
            Err("no NFC controller".into())
        }

        fn perform(&mut self, _action: RadioAction) {}
    }

    #[tokio::test]
    async fn support_check_failure_is_a_failed_signal() {
        let (bridge, _handle) = NfcBridge::spawn(Unsupported, &ServiceConfig::default()).unwrap();

        assert_eq!(
            bridge.has_nfc_support().await,
            Err(SessionError::Failed("no NFC controller".into()))
        );
    }

    #[tokio::test]
    async fn end_session_without_session_succeeds() {
        let (bridge, _handle) = NfcBridge::spawn(Unsupported, &ServiceConfig::default()).unwrap();

        assert_eq!(bridge.end_session().await, Ok(()));
        assert_eq!(bridge.end_session().await, Ok(()));
    }

    #[tokio::test]
    async fn dead_service_fails_requests() {
        let (cmd_tx, cmd_rx) = unbounded::<NfcCommand>();
        drop(cmd_rx);
        let bridge = NfcBridge { commands: cmd_tx };

        assert_eq!(
            bridge.begin_session(SessionMode::Read, false, None).await,
            Err(unavailable())
        );
        assert!(!bridge.radio_events().post(RadioEvent::UserCanceled {
            session: crate::types::SessionId(1),
        }));
    }
}
