//! Balancing transaction state machines.
//!
//! One transaction per step per link decides which side gives up a
//! two-column slice. The machines do no IO: they consume messages and return
//! the [`Action`]s the link task must carry out, so they can be driven in
//! memory as easily as over a socket.
//!
//! ```text
//! initiator (right link)                 responder (left link)
//! Idle --start/TIME--> WaitForTime       Idle --start/TIME--> WaitForDecision
//! WaitForTime --TIME, slower--> DATA     WaitForDecision --REQUEST--> DATA, WaitForAck
//!     WaitForAck --ACK--> Idle (lost)    WaitForDecision --DATA--> ACK, Idle (gained)
//! WaitForTime --TIME, faster--> REQUEST  WaitForAck --ACK--> Idle (lost)
//!     WaitForData --DATA--> ACK, Idle (gained)
//! ```
//!
//! A `TIME` that reaches the initiator while idle is buffered and decides the
//! next transaction immediately when it starts.

use std::fmt;

use petri_protocols::ExchangeMessage;

use crate::error::{Error, Result};
use crate::types::{Outcome, Slice};

/// What the link task must do after feeding a machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Send(ExchangeMessage),
    Complete(Outcome),
}

/// Common contract for both roles.
pub trait TransactionMachine: Send + 'static {
    /// Begin this step's transaction with our boundary slice and step time.
    fn start(&mut self, boundary: Slice, step_nanos: u64) -> Result<Vec<Action>>;

    /// Feed one message from the neighbor.
    fn receive(&mut self, message: ExchangeMessage) -> Result<Vec<Action>>;

    /// No transaction in flight.
    fn is_idle(&self) -> bool;
}

/// Initiator states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitiatorState {
    Idle,
    WaitForTime,
    WaitForData,
    WaitForAck,
}

impl fmt::Display for InitiatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::WaitForTime => write!(f, "WaitForTime"),
            Self::WaitForData => write!(f, "WaitForData"),
            Self::WaitForAck => write!(f, "WaitForAck"),
        }
    }
}

/// Runs on the dialing end of a link, managing the right neighbor.
#[derive(Debug)]
pub struct Initiator {
    state: InitiatorState,
    height: usize,
    own_time: u64,
    peer_time: Option<u64>,
    boundary: Option<Slice>,
}

impl Initiator {
    pub fn new(height: usize) -> Self {
        Self {
            state: InitiatorState::Idle,
            height,
            own_time: 0,
            peer_time: None,
            boundary: None,
        }
    }

    pub fn state(&self) -> InitiatorState {
        self.state
    }

    /// The slower side gives; ties go to the responder.
    fn decide(&mut self, peer_time: u64) -> Result<Vec<Action>> {
        self.peer_time = None;
        if self.own_time > peer_time {
            let boundary = self.boundary.take().ok_or(Error::NoTransaction)?;
            self.transition(InitiatorState::WaitForAck);
            Ok(vec![Action::Send(ExchangeMessage::Data(boundary.to_bytes()))])
        } else {
            self.transition(InitiatorState::WaitForData);
            Ok(vec![Action::Send(ExchangeMessage::Request)])
        }
    }

    fn finish(&mut self, outcome: Outcome) -> Vec<Action> {
        self.boundary = None;
        self.transition(InitiatorState::Idle);
        vec![Action::Complete(outcome)]
    }

    fn transition(&mut self, next: InitiatorState) {
        tracing::trace!(from = %self.state, to = %next, "Initiator transition");
        self.state = next;
    }
}

impl TransactionMachine for Initiator {
    fn start(&mut self, boundary: Slice, step_nanos: u64) -> Result<Vec<Action>> {
        if self.state != InitiatorState::Idle {
            return Err(Error::TransactionInFlight);
        }
        self.own_time = step_nanos;
        self.boundary = Some(boundary);

        let mut actions = vec![Action::Send(ExchangeMessage::Time(step_nanos))];
        match self.peer_time {
            Some(peer_time) => actions.extend(self.decide(peer_time)?),
            None => self.transition(InitiatorState::WaitForTime),
        }
        Ok(actions)
    }

    fn receive(&mut self, message: ExchangeMessage) -> Result<Vec<Action>> {
        match (self.state, message) {
            (InitiatorState::Idle, ExchangeMessage::Time(peer_time)) if self.peer_time.is_none() => {
                self.peer_time = Some(peer_time);
                Ok(Vec::new())
            }
            (InitiatorState::WaitForTime, ExchangeMessage::Time(peer_time)) => {
                self.decide(peer_time)
            }
            (InitiatorState::WaitForData, ExchangeMessage::Data(payload)) => {
                let slice = Slice::from_bytes(self.height, &payload)?;
                let mut actions = vec![Action::Send(ExchangeMessage::Ack)];
                actions.extend(self.finish(Outcome::Gained(slice)));
                Ok(actions)
            }
            (InitiatorState::WaitForAck, ExchangeMessage::Ack) => Ok(self.finish(Outcome::Lost)),
            (state, message) => Err(Error::violation(state, message.opcode())),
        }
    }

    fn is_idle(&self) -> bool {
        self.state == InitiatorState::Idle
    }
}

/// Responder states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderState {
    Idle,
    WaitForDecision,
    WaitForAck,
}

impl fmt::Display for ResponderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::WaitForDecision => write!(f, "WaitForDecision"),
            Self::WaitForAck => write!(f, "WaitForAck"),
        }
    }
}

/// Runs on the accepting end of a link, managing the left neighbor.
#[derive(Debug)]
pub struct Responder {
    state: ResponderState,
    height: usize,
    /// The initiator's time for the current transaction. Informational: the
    /// initiator makes the decision.
    peer_time: Option<u64>,
    boundary: Option<Slice>,
}

impl Responder {
    pub fn new(height: usize) -> Self {
        Self {
            state: ResponderState::Idle,
            height,
            peer_time: None,
            boundary: None,
        }
    }

    pub fn state(&self) -> ResponderState {
        self.state
    }

    pub fn peer_time(&self) -> Option<u64> {
        self.peer_time
    }

    fn finish(&mut self, outcome: Outcome) -> Vec<Action> {
        self.boundary = None;
        self.peer_time = None;
        self.transition(ResponderState::Idle);
        vec![Action::Complete(outcome)]
    }

    fn transition(&mut self, next: ResponderState) {
        tracing::trace!(from = %self.state, to = %next, "Responder transition");
        self.state = next;
    }
}

impl TransactionMachine for Responder {
    fn start(&mut self, boundary: Slice, step_nanos: u64) -> Result<Vec<Action>> {
        if self.state != ResponderState::Idle {
            return Err(Error::TransactionInFlight);
        }
        self.boundary = Some(boundary);
        self.transition(ResponderState::WaitForDecision);
        Ok(vec![Action::Send(ExchangeMessage::Time(step_nanos))])
    }

    fn receive(&mut self, message: ExchangeMessage) -> Result<Vec<Action>> {
        let decided = self.peer_time.is_some();
        match (self.state, message) {
            (
                ResponderState::Idle | ResponderState::WaitForDecision,
                ExchangeMessage::Time(peer_time),
            ) if !decided => {
                self.peer_time = Some(peer_time);
                Ok(Vec::new())
            }
            (ResponderState::WaitForDecision, ExchangeMessage::Request) if decided => {
                let boundary = self.boundary.take().ok_or(Error::NoTransaction)?;
                self.transition(ResponderState::WaitForAck);
                Ok(vec![Action::Send(ExchangeMessage::Data(boundary.to_bytes()))])
            }
            (ResponderState::WaitForDecision, ExchangeMessage::Data(payload)) if decided => {
                let slice = Slice::from_bytes(self.height, &payload)?;
                let mut actions = vec![Action::Send(ExchangeMessage::Ack)];
                actions.extend(self.finish(Outcome::Gained(slice)));
                Ok(actions)
            }
            (ResponderState::WaitForAck, ExchangeMessage::Ack) => Ok(self.finish(Outcome::Lost)),
            (state, message) => Err(Error::violation(state, message.opcode())),
        }
    }

    fn is_idle(&self) -> bool {
        self.state == ResponderState::Idle
    }
}
