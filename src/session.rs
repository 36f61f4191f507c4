// src/session.rs
//! Lifecycle of one tag interaction.
//!
//! A `Session` never touches hardware. Every input (caller request or radio
//! event) is applied as one transition and returns the `RadioAction`s the
//! service must hand to the radio. Pending caller results live inside the
//! session and are resolved exactly once, always before the radio is told to
//! tear anything down.

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::error::SessionError;
use crate::ndef::NdefCodec;
use crate::types::{
    RadioAction, Responder, SessionId, SessionMode, TagScan, format_tag_serial,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingTag,
    TagDetected,
    Reading,
    ReadComplete,
    WriteReady,
    Writing,
    Closed,
    Canceled,
    TimedOut,
    Ended,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Closed
                | SessionState::Canceled
                | SessionState::TimedOut
                | SessionState::Ended
                | SessionState::Failed
        )
    }
}

/// Ways a session stops short of `Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    Canceled,
    TimedOut,
    Ended,
    Failed(String),
}

impl Termination {
    fn state(&self) -> SessionState {
        match self {
            Termination::Canceled => SessionState::Canceled,
            Termination::TimedOut => SessionState::TimedOut,
            Termination::Ended => SessionState::Ended,
            Termination::Failed(_) => SessionState::Failed,
        }
    }

    fn error(&self) -> SessionError {
        match self {
            Termination::Canceled => SessionError::Canceled,
            Termination::TimedOut => SessionError::TimedOut,
            Termination::Ended => SessionError::Ended,
            Termination::Failed(detail) => SessionError::Failed(detail.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub mode: SessionMode,
    pub keep_alive_after_read: bool,
    pub alert_message: Option<String>,
    pub tag_timeout: Duration,
}

#[derive(Debug)]
struct PendingWrite {
    message: Vec<u8>,
    written_alert_message: Option<String>,
    reply: Responder<()>,
}

#[derive(Debug)]
pub struct Session {
    id: SessionId,
    mode: SessionMode,
    state: SessionState,
    keep_alive_after_read: bool,
    alert_message: Option<String>,
    tag_timeout: Duration,
    tag_serial: Option<String>,
    deadline: Option<Instant>,
    pending_scan: Option<Responder<TagScan>>,
    pending_write: Option<PendingWrite>,
}

impl Session {
    pub fn new(id: SessionId, options: SessionOptions) -> Self {
        Self {
            id,
            mode: options.mode,
            state: SessionState::Idle,
            keep_alive_after_read: options.keep_alive_after_read,
            alert_message: options.alert_message,
            tag_timeout: options.tag_timeout,
            tag_serial: None,
            deadline: None,
            pending_scan: None,
            pending_write: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn tag_serial(&self) -> Option<&str> {
        self.tag_serial.as_deref()
    }

    /// When the wait for a tag gives up; only set while awaiting one.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    // READ_THEN_WRITE exists to write after reading, so it never closes early
    fn keeps_alive(&self) -> bool {
        self.keep_alive_after_read || self.mode == SessionMode::ReadThenWrite
    }

    /// IDLE -> AWAITING_TAG. `reply` receives the scan result, if anyone asked.
    pub fn begin(&mut self, now: Instant, reply: Option<Responder<TagScan>>) -> Vec<RadioAction> {
        if self.state != SessionState::Idle {
            warn!("Session {} already started ({:?})", self.id, self.state);
            if let Some(reply) = reply {
                resolve(reply, Err(SessionError::Failed("session already started".into())));
            }
            return Vec::new();
        }

        info!("Session {} awaiting tag ({:?})", self.id, self.mode);
        self.pending_scan = reply;
        self.state = SessionState::AwaitingTag;
        self.deadline = Some(now + self.tag_timeout);

        vec![RadioAction::BeginPolling {
            session: self.id,
            alert_message: self.alert_message.clone(),
        }]
    }

    pub fn on_tag_detected(&mut self, uid: &[u8], message: &[u8], codec: &NdefCodec) -> Vec<RadioAction> {
        if self.state != SessionState::AwaitingTag {
            debug!("Session {} ignoring tag while {:?}", self.id, self.state);
            return Vec::new();
        }

        let serial = format_tag_serial(uid);
        info!("Session {} detected tag {}", self.id, serial);
        self.state = SessionState::TagDetected;
        self.deadline = None;
        self.tag_serial = Some(serial.clone());

        match self.mode {
            SessionMode::Read | SessionMode::ReadThenWrite => self.read(serial, message, codec),
            SessionMode::Write => match &self.pending_write {
                Some(pending) => {
                    self.state = SessionState::Writing;
                    // A Write session can queue its write before the tag shows up
                    if let Some(reply) = self.pending_scan.take() {
                        resolve(
                            reply,
                            Ok(TagScan {
                                tag_serial: serial.clone(),
                                records: Vec::new(),
                            }),
                        );
                    }
                    vec![RadioAction::WriteMessage {
                        session: self.id,
                        tag_serial: serial,
                        message: pending.message.clone(),
                    }]
                }
                None => {
                    self.state = SessionState::WriteReady;
                    if let Some(reply) = self.pending_scan.take() {
                        resolve(
                            reply,
                            Ok(TagScan {
                                tag_serial: serial,
                                records: Vec::new(),
                            }),
                        );
                    }
                    Vec::new()
                }
            },
        }
    }

    fn read(&mut self, serial: String, message: &[u8], codec: &NdefCodec) -> Vec<RadioAction> {
        self.state = SessionState::Reading;

        // A formatted but blank tag holds no message at all
        let decoded = if message.is_empty() {
            Ok(Vec::new())
        } else {
            codec.decode(message)
        };

        let records = match decoded {
            Ok(records) => records,
            Err(err) => {
                warn!("Session {} could not decode tag {}: {}", self.id, serial, err);
                return self.terminate(Termination::Failed(err.to_string()), true);
            }
        };

        debug!("Session {} read {} record(s)", self.id, records.len());
        self.state = SessionState::ReadComplete;
        if let Some(reply) = self.pending_scan.take() {
            resolve(
                reply,
                Ok(TagScan {
                    tag_serial: serial,
                    records,
                }),
            );
        }

        if self.keeps_alive() {
            self.state = SessionState::WriteReady;
            Vec::new()
        } else {
            self.state = SessionState::Closed;
            vec![RadioAction::Invalidate {
                session: self.id,
                alert_message: None,
            }]
        }
    }

    /// Takes an already encoded message. From WRITE_READY the write goes out
    /// at once; a WRITE session that has not met its tag yet queues it.
    pub fn request_write(
        &mut self,
        message: Vec<u8>,
        written_alert_message: Option<String>,
        reply: Responder<()>,
    ) -> Vec<RadioAction> {
        let pending = PendingWrite {
            message,
            written_alert_message,
            reply,
        };

        match self.state {
            SessionState::WriteReady => {
                let Some(tag_serial) = self.tag_serial.clone() else {
                    resolve(pending.reply, Err(SessionError::Failed("no tag connected".into())));
                    return Vec::new();
                };
                info!("Session {} writing {} bytes", self.id, pending.message.len());
                let action = RadioAction::WriteMessage {
                    session: self.id,
                    tag_serial,
                    message: pending.message.clone(),
                };
                self.state = SessionState::Writing;
                self.pending_write = Some(pending);
                vec![action]
            }
            SessionState::Idle | SessionState::AwaitingTag
                if self.mode == SessionMode::Write && self.pending_write.is_none() =>
            {
                debug!("Session {} queued write until a tag shows up", self.id);
                self.pending_write = Some(pending);
                Vec::new()
            }
            state => {
                warn!("Session {} rejected write while {:?}", self.id, state);
                resolve(
                    pending.reply,
                    Err(SessionError::Failed(format!("session busy ({state:?})"))),
                );
                Vec::new()
            }
        }
    }

    pub fn on_write_completed(&mut self, result: Result<(), String>) -> Vec<RadioAction> {
        if self.state != SessionState::Writing {
            debug!("Session {} ignoring write completion while {:?}", self.id, self.state);
            return Vec::new();
        }
        let Some(pending) = self.pending_write.take() else {
            return self.terminate(Termination::Failed("write completed without a request".into()), true);
        };

        match result {
            Ok(()) => {
                info!("Session {} write complete", self.id);
                self.state = SessionState::Closed;
                resolve(pending.reply, Ok(()));
                vec![RadioAction::Invalidate {
                    session: self.id,
                    alert_message: pending.written_alert_message,
                }]
            }
            Err(err) => {
                warn!("Session {} write failed: {}", self.id, err);
                self.state = SessionState::Failed;
                resolve(pending.reply, Err(SessionError::Failed(err)));
                if let Some(reply) = self.pending_scan.take() {
                    resolve(reply, Err(SessionError::Failed("write failed".into())));
                }
                vec![RadioAction::Invalidate {
                    session: self.id,
                    alert_message: None,
                }]
            }
        }
    }

    /// Moves a live session to a terminal state, failing whatever is still
    /// pending. No-op once terminal. `notify_radio` is false when the radio
    /// itself reported the end.
    pub fn terminate(&mut self, termination: Termination, notify_radio: bool) -> Vec<RadioAction> {
        if self.is_terminal() {
            return Vec::new();
        }

        info!("Session {} terminated: {:?}", self.id, termination);
        self.state = termination.state();
        self.deadline = None;

        if let Some(reply) = self.pending_scan.take() {
            resolve(reply, Err(termination.error()));
        }
        if let Some(pending) = self.pending_write.take() {
            resolve(pending.reply, Err(termination.error()));
        }

        if notify_radio {
            vec![RadioAction::Invalidate {
                session: self.id,
                alert_message: None,
            }]
        } else {
            Vec::new()
        }
    }

    pub fn check_timeout(&mut self, now: Instant) -> Vec<RadioAction> {
        match self.deadline {
            Some(deadline) if self.state == SessionState::AwaitingTag && now >= deadline => {
                self.terminate(Termination::TimedOut, true)
            }
            _ => Vec::new(),
        }
    }
}

pub(crate) fn resolve<T>(reply: Responder<T>, result: Result<T, SessionError>) {
    if reply.send(result).is_err() {
        debug!("Caller went away before its result was delivered");
    }
}
