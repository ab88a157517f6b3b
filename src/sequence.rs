//! Sequence-id loss detection.
//!
//! The tracker only classifies; it never reorders or asks for retransmission. A sender restart
//! is recognised only from an explicit session change, never from the id values themselves.

use crate::frame::{SequenceId, SessionId};

/// Classification of one observed sequence id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequenceEvent {
    /// First id seen by this tracker.
    First,
    /// Exactly `last + 1`.
    InOrder,
    /// Anything other than `last + 1` within one session.
    Gap {
        expected: SequenceId,
        actual: SequenceId,
    },
    /// The sender started a new session; tracking starts over at this id.
    Restart {
        previous: SequenceId,
        session: SessionId,
    },
}

#[derive(Clone, Debug, Default)]
pub struct SequenceTracker {
    last: Option<SequenceId>,
    session: Option<SessionId>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<SequenceId> {
        self.last
    }

    pub fn session(&self) -> Option<SessionId> {
        self.session
    }

    /// Record `id` from a sender without a session and classify it.
    pub fn observe(&mut self, id: SequenceId) -> SequenceEvent {
        self.observe_session(None, id)
    }

    /// Record `id` tagged with the sender's `session` and classify it.
    ///
    /// A session different from the one already seen resets the tracker. Untagged ids never
    /// change the current session.
    pub fn observe_session(&mut self, session: Option<SessionId>, id: SequenceId) -> SequenceEvent {
        if let (Some(current), Some(incoming)) = (self.session, session) {
            if current != incoming {
                let previous = self.last;
                self.reset();
                self.session = Some(incoming);
                self.last = Some(id);
                return match previous {
                    Some(previous) => SequenceEvent::Restart {
                        previous,
                        session: incoming,
                    },
                    None => SequenceEvent::First,
                };
            }
        }
        if session.is_some() {
            self.session = session;
        }

        let event = match self.last {
            None => SequenceEvent::First,
            Some(last) => {
                // u64::MAX -> 0 counts as in order.
                let expected = last.wrapping_add(1);
                if id == expected {
                    SequenceEvent::InOrder
                } else {
                    SequenceEvent::Gap {
                        expected,
                        actual: id,
                    }
                }
            }
        };
        self.last = Some(id);
        event
    }

    /// Forget the last id and session.
    pub fn reset(&mut self) {
        self.last = None;
        self.session = None;
    }
}
