// src/nfc_service.rs
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::error::SessionError;
use crate::ndef::NdefCodec;
use crate::session::{Session, SessionOptions, Termination, resolve};
use crate::types::{
    NdefRecord, NfcCommand, RadioAction, RadioEvent, Responder, SessionId, SessionMode, TagScan,
};

// Upper bound on how long the loop sleeps when no session is waiting for a tag
const IDLE_TICK: Duration = Duration::from_millis(500);

/// The platform side that owns the NFC hardware.
///
/// Actions are fire-and-forget; outcomes come back as `RadioEvent`s through
/// the bridge.
pub trait TagRadio: Send + 'static {
    fn has_nfc(&self) -> Result<bool, String>;

    fn perform(&mut self, action: RadioAction);
}

/// Owns the one active session of the process and applies commands to it in
/// arrival order.
pub struct NfcService<R> {
    radio: R,
    codec: NdefCodec,
    tag_timeout: Duration,
    active: Option<Session>,
    last_id: u64,
}

impl<R: TagRadio> NfcService<R> {
    pub fn new(radio: R, config: &ServiceConfig) -> Self {
        Self {
            radio,
            codec: NdefCodec::new(config.max_message_size),
            tag_timeout: config.tag_timeout,
            active: None,
            last_id: 0,
        }
    }

    pub fn active_session(&self) -> Option<&Session> {
        self.active.as_ref()
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.active.as_ref().and_then(Session::deadline)
    }

    pub fn run(mut self, rx: Receiver<NfcCommand>) {
        info!("Starting NFC Service (Event Driven)...");

        loop {
            // 1. Wait for a command or the next session deadline
            let wait = self
                .next_deadline()
                .map(|deadline| deadline.saturating_duration_since(Instant::now()))
                .unwrap_or(IDLE_TICK)
                .min(IDLE_TICK);

            match rx.recv_timeout(wait) {
                Ok(cmd) => self.handle(cmd, Instant::now()),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    info!("Every bridge handle is gone, stopping NFC service");
                    self.shutdown();
                    return;
                }
            }

            // 2. Expire sessions that waited too long
            self.tick(Instant::now());
        }
    }

    pub fn handle(&mut self, cmd: NfcCommand, now: Instant) {
        match cmd {
            NfcCommand::HasNfc { reply } => {
                resolve(reply, self.radio.has_nfc().map_err(SessionError::Failed));
            }
            NfcCommand::BeginSession {
                mode,
                keep_alive_after_read,
                alert_message,
                reply,
            } => self.begin_session(mode, keep_alive_after_read, alert_message, reply, now),
            NfcCommand::Write {
                records,
                alert_message,
                written_alert_message,
                reply,
            } => self.write(&records, alert_message, written_alert_message, reply, now),
            NfcCommand::EndSession { reply } => {
                self.end_active(Termination::Ended);
                resolve(reply, Ok(()));
            }
            NfcCommand::Radio(event) => self.radio_event(event),
        }
    }

    pub fn tick(&mut self, now: Instant) {
        if let Some(session) = self.active.as_mut() {
            let actions = session.check_timeout(now);
            self.dispatch(actions);
        }
    }

    pub fn shutdown(&mut self) {
        self.end_active(Termination::Ended);
    }

    fn begin_session(
        &mut self,
        mode: SessionMode,
        keep_alive_after_read: bool,
        alert_message: Option<String>,
        reply: Responder<TagScan>,
        now: Instant,
    ) {
        // The old occupant hears ENDED before the new session starts polling
        self.end_active(Termination::Ended);

        let mut session = self.new_session(SessionOptions {
            mode,
            keep_alive_after_read,
            alert_message,
            tag_timeout: self.tag_timeout,
        });
        let actions = session.begin(now, Some(reply));
        self.active = Some(session);
        self.dispatch(actions);
    }

    fn write(
        &mut self,
        records: &[NdefRecord],
        alert_message: Option<String>,
        written_alert_message: Option<String>,
        reply: Responder<()>,
        now: Instant,
    ) {
        let message = match self.codec.encode(records) {
            Ok(message) => message,
            Err(err) => {
                warn!("Refusing write: {}", err);
                resolve(reply, Err(SessionError::Encode(err)));
                return;
            }
        };

        if let Some(session) = self.active.as_mut() {
            let actions = session.request_write(message, written_alert_message, reply);
            self.dispatch(actions);
            return;
        }

        debug!("No open session, starting a write-only one");
        let mut session = self.new_session(SessionOptions {
            mode: SessionMode::Write,
            keep_alive_after_read: false,
            alert_message,
            tag_timeout: self.tag_timeout,
        });
        let mut actions = session.request_write(message, written_alert_message, reply);
        actions.extend(session.begin(now, None));
        self.active = Some(session);
        self.dispatch(actions);
    }

    fn radio_event(&mut self, event: RadioEvent) {
        let Some(session) = self
            .active
            .as_mut()
            .filter(|session| session.id() == event.session())
        else {
            debug!("Dropping stale radio event for session {}", event.session());
            return;
        };

        let actions = match event {
            RadioEvent::TagDetected { uid, message, .. } => {
                session.on_tag_detected(&uid, &message, &self.codec)
            }
            RadioEvent::WriteCompleted { result, .. } => session.on_write_completed(result),
            RadioEvent::UserCanceled { .. } => session.terminate(Termination::Canceled, false),
            RadioEvent::RadioError { error, .. } => {
                session.terminate(Termination::Failed(error), false)
            }
        };
        self.dispatch(actions);
    }

    fn end_active(&mut self, termination: Termination) {
        if let Some(mut session) = self.active.take() {
            let actions = session.terminate(termination, true);
            self.radio_perform(actions);
        }
    }

    fn new_session(&mut self, options: SessionOptions) -> Session {
        self.last_id += 1;
        Session::new(SessionId(self.last_id), options)
    }

    // Hand actions to the radio, then drop the session if it just finished
    fn dispatch(&mut self, actions: Vec<RadioAction>) {
        self.radio_perform(actions);

        if self.active.as_ref().is_some_and(Session::is_terminal) {
            if let Some(session) = self.active.take() {
                info!("Session {} finished as {:?}", session.id(), session.state());
            }
        }
    }

    fn radio_perform(&mut self, actions: Vec<RadioAction>) {
        for action in actions {
            debug!("Radio <- {:?}", action);
            self.radio.perform(action);
        }
    }
}
