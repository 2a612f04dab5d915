//! Turn state machine
//!
//! Deterministic finite state machine for one user turn:
//! - Safety: no invalid states reachable
//! - Liveness: every path ends in Done or Error
//! - Determinism: unique next state per event
//! - Bounded re-planning: the Replan state is entered at most once

use crate::errors::{AgentError, Result};
use serde::{Deserialize, Serialize};

/// Corrective rounds allowed per turn
pub const MAX_REPLANS: usize = 1;

/// Turn execution states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TurnState {
    /// Turn accepted, nothing done yet
    Start,

    /// Deciding whether the message is chit-chat
    ChitchatCheck,

    /// Answering chit-chat without retrieval
    ChitchatReply,

    /// Acquiring a rate-limit permit for the caller
    RateLimitCheck,

    /// Model is producing the tool plan
    Planning,

    /// Tool calls are running
    ToolExecution,

    /// Judging whether the results answer the question
    Evaluation,

    /// Building the single corrective plan
    Replan,

    /// Streaming the final answer
    Synthesis,

    /// Turn finished with an answer (terminal)
    Done,

    /// Turn finished with an error (terminal)
    Error,
}

/// Events that trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEvent {
    Begin,
    ChitchatDetected,
    RetrievalNeeded,
    PermitGranted,
    PlanReady,
    ToolsFinished,
    Sufficient,
    Insufficient,
    ReplanReady,
    NoCorrection,
    ReplyComplete,
    Failure,
}

impl TurnState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnState::Done | TurnState::Error)
    }

    /// Transition function T: S × Event → Result<S>
    ///
    /// ```text
    /// Start          → ChitchatCheck   (Begin)
    /// ChitchatCheck  → ChitchatReply   (ChitchatDetected)
    /// ChitchatCheck  → RateLimitCheck  (RetrievalNeeded)
    /// RateLimitCheck → Planning        (PermitGranted)
    /// Planning       → ToolExecution   (PlanReady)
    /// ToolExecution  → Evaluation      (ToolsFinished)
    /// Evaluation     → Synthesis       (Sufficient)
    /// Evaluation     → Replan          (Insufficient)
    /// Replan         → ToolExecution   (ReplanReady)
    /// Replan         → Synthesis       (NoCorrection)
    /// ChitchatReply  → Done            (ReplyComplete)
    /// Synthesis      → Done            (ReplyComplete)
    /// *              → Error           (Failure)
    /// Done, Error    → self            (terminal)
    /// ```
    pub fn transition(&self, event: TurnEvent) -> Result<TurnState> {
        use TurnEvent::*;
        use TurnState::*;

        let next_state = match (self, event) {
            // Terminal states absorb everything
            (Done, _) => Done,
            (TurnState::Error, _) => TurnState::Error,

            (_, Failure) => TurnState::Error,

            (Start, Begin) => ChitchatCheck,

            (ChitchatCheck, ChitchatDetected) => ChitchatReply,
            (ChitchatCheck, RetrievalNeeded) => RateLimitCheck,

            (RateLimitCheck, PermitGranted) => Planning,

            (Planning, PlanReady) => ToolExecution,

            (ToolExecution, ToolsFinished) => Evaluation,

            (Evaluation, Sufficient) => Synthesis,
            (Evaluation, Insufficient) => Replan,

            (Replan, ReplanReady) => ToolExecution,
            (Replan, NoCorrection) => Synthesis,

            (ChitchatReply, ReplyComplete) => Done,
            (Synthesis, ReplyComplete) => Done,

            (from, event) => {
                return Err(AgentError::InvalidTransition {
                    from: format!("{:?}", from),
                    to: format!("(via {:?})", event),
                    reason: format!("No valid transition from {:?} on {:?}", from, event),
                });
            }
        };

        Ok(next_state)
    }

    /// Human-readable state name
    pub fn display_name(&self) -> &'static str {
        match self {
            TurnState::Start => "Starting",
            TurnState::ChitchatCheck => "Classifying",
            TurnState::ChitchatReply => "Replying",
            TurnState::RateLimitCheck => "Checking rate limit",
            TurnState::Planning => "Planning",
            TurnState::ToolExecution => "Executing tools",
            TurnState::Evaluation => "Evaluating results",
            TurnState::Replan => "Re-planning",
            TurnState::Synthesis => "Synthesizing",
            TurnState::Done => "Completed",
            TurnState::Error => "Error",
        }
    }
}

/// Tracks one turn's path through the states
#[derive(Debug, Clone)]
pub struct TurnStateMachine {
    state: TurnState,
    replans: usize,
    trace: Vec<TurnState>,
}

impl TurnStateMachine {
    pub fn new() -> Self {
        Self {
            state: TurnState::Start,
            replans: 0,
            trace: vec![TurnState::Start],
        }
    }

    /// Apply an event. An `Insufficient` verdict once the replan budget is
    /// spent is accepted as final and leads to synthesis.
    pub fn apply(&mut self, event: TurnEvent) -> Result<TurnState> {
        let event = if event == TurnEvent::Insufficient && !self.can_replan() {
            TurnEvent::Sufficient
        } else {
            event
        };

        let next = self.state.transition(event)?;
        if next == TurnState::Replan {
            self.replans += 1;
        }
        if next != self.state {
            self.trace.push(next);
        }
        self.state = next;
        Ok(next)
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn can_replan(&self) -> bool {
        self.replans < MAX_REPLANS
    }

    pub fn replans(&self) -> usize {
        self.replans
    }

    /// States visited so far, in order
    pub fn trace(&self) -> &[TurnState] {
        &self.trace
    }
}

impl Default for TurnStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieval_path() {
        let mut machine = TurnStateMachine::new();
        for event in [
            TurnEvent::Begin,
            TurnEvent::RetrievalNeeded,
            TurnEvent::PermitGranted,
            TurnEvent::PlanReady,
            TurnEvent::ToolsFinished,
            TurnEvent::Sufficient,
            TurnEvent::ReplyComplete,
        ] {
            machine.apply(event).unwrap();
        }
        assert_eq!(machine.state(), TurnState::Done);
        assert_eq!(machine.trace().len(), 8);
    }

    #[test]
    fn test_chitchat_path() {
        let mut machine = TurnStateMachine::new();
        machine.apply(TurnEvent::Begin).unwrap();
        machine.apply(TurnEvent::ChitchatDetected).unwrap();
        machine.apply(TurnEvent::ReplyComplete).unwrap();
        assert_eq!(
            machine.trace(),
            &[TurnState::Start, TurnState::ChitchatCheck, TurnState::ChitchatReply, TurnState::Done]
        );
    }

    #[test]
    fn test_second_insufficiency_is_accepted() {
        let mut machine = TurnStateMachine::new();
        for event in [
            TurnEvent::Begin,
            TurnEvent::RetrievalNeeded,
            TurnEvent::PermitGranted,
            TurnEvent::PlanReady,
            TurnEvent::ToolsFinished,
        ] {
            machine.apply(event).unwrap();
        }

        assert_eq!(machine.apply(TurnEvent::Insufficient).unwrap(), TurnState::Replan);
        assert!(!machine.can_replan());
        machine.apply(TurnEvent::ReplanReady).unwrap();
        machine.apply(TurnEvent::ToolsFinished).unwrap();

        assert_eq!(machine.apply(TurnEvent::Insufficient).unwrap(), TurnState::Synthesis);
        assert_eq!(machine.replans(), 1);
    }

    #[test]
    fn test_failure_from_any_state() {
        for state in [
            TurnState::Start,
            TurnState::ChitchatCheck,
            TurnState::RateLimitCheck,
            TurnState::Planning,
            TurnState::ToolExecution,
            TurnState::Evaluation,
            TurnState::Replan,
            TurnState::Synthesis,
        ] {
            assert_eq!(state.transition(TurnEvent::Failure).unwrap(), TurnState::Error);
        }
    }

    #[test]
    fn test_terminal_states_absorb() {
        assert!(TurnState::Done.is_terminal());
        assert!(TurnState::Error.is_terminal());
        assert!(!TurnState::Synthesis.is_terminal());

        assert_eq!(TurnState::Done.transition(TurnEvent::Failure).unwrap(), TurnState::Done);
        assert_eq!(TurnState::Error.transition(TurnEvent::Begin).unwrap(), TurnState::Error);
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(TurnState::Start.transition(TurnEvent::PlanReady).is_err());
        assert!(TurnState::ChitchatReply.transition(TurnEvent::ToolsFinished).is_err());
        assert!(TurnState::Planning.transition(TurnEvent::Sufficient).is_err());
    }
}
