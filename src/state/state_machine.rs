use std::time::Instant;

use thiserror::Error;
use uuid::Uuid;

/// High-level phases a hosted session can be in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// Session created; participants may join but no question has run.
    Waiting,
    /// Host has started the session; sub-phase tracks the question cycle.
    Active(QuestionPhase),
    /// Terminal state; no further transitions or mutations are accepted.
    Ended,
}

/// Fine-grained phase of the question cycle while the session is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionPhase {
    /// No question is live (session started without a configured list).
    Idle,
    /// A question is live, the countdown is running, answers are accepted.
    Collecting,
    /// Correct answer shown; submissions for this question are closed.
    Revealed,
    /// Ranked standings have been broadcast for the current question.
    Ranked,
}

/// What caused a reveal: the host's explicit command or the countdown expiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealTrigger {
    /// Host pressed "show results".
    Host,
    /// The per-question timer elapsed without an explicit reveal.
    Timeout,
}

/// Events that can be applied to the session state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Host starts the session from the waiting state.
    Start {
        /// Whether a question list is configured; with questions the session
        /// enters collecting for index 0 immediately.
        has_questions: bool,
    },
    /// Host moves to the next question after a reveal or leaderboard.
    AdvanceQuestion,
    /// Close answer collection and expose the correct answer.
    Reveal(RevealTrigger),
    /// Broadcast ranked standings after a reveal.
    ShowLeaderboard,
    /// Terminate the session from any non-terminal state.
    End,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: SessionPhase,
    /// The event that cannot be applied from this phase.
    pub event: SessionEvent,
}

/// Errors that can occur when planning a state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    AlreadyPending,
    /// The requested transition is not valid from the current phase.
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
    /// State machine phase changed since the plan was created.
    PhaseMismatch {
        /// Phase when plan was created.
        expected: SessionPhase,
        /// Current phase.
        actual: SessionPhase,
    },
    /// State machine version changed since the plan was created.
    VersionMismatch {
        /// Version when plan was created.
        expected: usize,
        /// Current version.
        actual: usize,
    },
}

/// Errors that can occur when aborting a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Unique identifier for a planned state transition.
pub type PlanId = Uuid;

/// A planned transition that has been validated but not yet applied.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Phase the state machine is currently in.
    pub from: SessionPhase,
    /// Phase the state machine will transition to.
    pub to: SessionPhase,
    /// Event that triggered this transition.
    pub event: SessionEvent,
    /// Version number after applying this transition.
    pub version_next: usize,
    /// Timestamp when this plan was created.
    pub pending_since: Instant,
}

/// Snapshot of the current state machine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Current phase of the state machine.
    pub phase: SessionPhase,
    /// Version number of the state machine (increments on each transition).
    pub version: usize,
    /// Pending transition phase, if a transition is planned but not applied.
    pub pending: Option<SessionPhase>,
}

/// State machine driving the waiting/active/ended lifecycle of one session.
///
/// Transitions follow a plan/apply protocol: [`plan`](Self::plan) reserves a
/// validated transition, the caller performs its durable work, then
/// [`apply`](Self::apply) commits or [`abort`](Self::abort) releases the
/// reservation. Broadcasts happen after apply, so clients never observe a
/// phase whose backing writes failed.
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    phase: SessionPhase,
    version: usize,
    pending: Option<Plan>,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Waiting,
            version: 0,
            pending: None,
        }
    }
}

impl SessionStateMachine {
    /// Create a new state machine initialised in the waiting state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase.clone()
    }

    /// Whether answers are currently being collected.
    pub fn is_collecting(&self) -> bool {
        matches!(self.phase, SessionPhase::Active(QuestionPhase::Collecting))
    }

    /// Create a snapshot of the current state machine state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase.clone(),
            version: self.version,
            pending: self.pending.as_ref().map(|plan| plan.to.clone()),
        }
    }

    /// Plan a transition by validating that the event can be applied from the
    /// current phase. Returns a Plan that can later be applied or aborted.
    pub fn plan(&mut self, event: SessionEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self
            .compute_transition(event.clone())
            .map_err(PlanError::InvalidTransition)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.phase.clone(),
            to: next,
            event,
            version_next: self.version + 1,
            pending_since: Instant::now(),
        };

        self.pending = Some(plan.clone());

        Ok(plan)
    }

    /// Apply a planned transition, moving the state machine to the next phase.
    /// Returns the new phase after the transition.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<SessionPhase, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected_plan_id = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected: expected_plan_id,
                got: plan_id,
            });
        }

        if self.phase != plan.from {
            return Err(ApplyError::PhaseMismatch {
                expected: plan.from,
                actual: self.phase.clone(),
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.phase = plan.to;
        self.version = plan.version_next;
        self.pending = None;

        Ok(self.phase.clone())
    }

    /// Abort a planned transition without applying it.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    /// Compute a transition from an event if the transition is valid.
    fn compute_transition(&self, event: SessionEvent) -> Result<SessionPhase, InvalidTransition> {
        let next = match (self.phase.clone(), event) {
            (SessionPhase::Waiting, SessionEvent::Start { has_questions: true }) => {
                SessionPhase::Active(QuestionPhase::Collecting)
            }
            (SessionPhase::Waiting, SessionEvent::Start { has_questions: false }) => {
                SessionPhase::Active(QuestionPhase::Idle)
            }
            (
                SessionPhase::Active(QuestionPhase::Revealed | QuestionPhase::Ranked),
                SessionEvent::AdvanceQuestion,
            ) => SessionPhase::Active(QuestionPhase::Collecting),
            (SessionPhase::Active(QuestionPhase::Collecting), SessionEvent::Reveal(..)) => {
                SessionPhase::Active(QuestionPhase::Revealed)
            }
            (SessionPhase::Active(QuestionPhase::Revealed), SessionEvent::ShowLeaderboard) => {
                SessionPhase::Active(QuestionPhase::Ranked)
            }
            (SessionPhase::Waiting | SessionPhase::Active(_), SessionEvent::End) => {
                SessionPhase::Ended
            }
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(sm: &mut SessionStateMachine, event: SessionEvent) -> SessionPhase {
        let plan = sm.plan(event).unwrap();
        sm.apply(plan.id).unwrap()
    }

    #[test]
    fn initial_state_is_waiting() {
        let sm = SessionStateMachine::new();
        assert_eq!(sm.phase(), SessionPhase::Waiting);
    }

    #[test]
    fn full_happy_path_through_session() {
        let mut sm = SessionStateMachine::new();

        assert_eq!(
            apply(&mut sm, SessionEvent::Start { has_questions: true }),
            SessionPhase::Active(QuestionPhase::Collecting)
        );
        assert_eq!(
            apply(&mut sm, SessionEvent::Reveal(RevealTrigger::Host)),
            SessionPhase::Active(QuestionPhase::Revealed)
        );
        assert_eq!(
            apply(&mut sm, SessionEvent::ShowLeaderboard),
            SessionPhase::Active(QuestionPhase::Ranked)
        );
        assert_eq!(
            apply(&mut sm, SessionEvent::AdvanceQuestion),
            SessionPhase::Active(QuestionPhase::Collecting)
        );
        assert_eq!(
            apply(&mut sm, SessionEvent::Reveal(RevealTrigger::Timeout)),
            SessionPhase::Active(QuestionPhase::Revealed)
        );
        assert_eq!(apply(&mut sm, SessionEvent::End), SessionPhase::Ended);
    }

    #[test]
    fn advance_allowed_straight_from_reveal() {
        let mut sm = SessionStateMachine::new();
        apply(&mut sm, SessionEvent::Start { has_questions: true });
        apply(&mut sm, SessionEvent::Reveal(RevealTrigger::Host));

        assert_eq!(
            apply(&mut sm, SessionEvent::AdvanceQuestion),
            SessionPhase::Active(QuestionPhase::Collecting)
        );
    }

    #[test]
    fn start_without_questions_enters_idle() {
        let mut sm = SessionStateMachine::new();
        assert_eq!(
            apply(&mut sm, SessionEvent::Start { has_questions: false }),
            SessionPhase::Active(QuestionPhase::Idle)
        );
    }

    #[test]
    fn end_is_terminal() {
        let mut sm = SessionStateMachine::new();
        apply(&mut sm, SessionEvent::Start { has_questions: true });
        apply(&mut sm, SessionEvent::End);

        for event in [
            SessionEvent::Start { has_questions: true },
            SessionEvent::AdvanceQuestion,
            SessionEvent::Reveal(RevealTrigger::Host),
            SessionEvent::ShowLeaderboard,
            SessionEvent::End,
        ] {
            let err = sm.plan(event.clone()).unwrap_err();
            match err {
                PlanError::InvalidTransition(invalid) => {
                    assert_eq!(invalid.from, SessionPhase::Ended);
                    assert_eq!(invalid.event, event);
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn reveal_rejected_outside_collecting() {
        let mut sm = SessionStateMachine::new();
        let err = sm.plan(SessionEvent::Reveal(RevealTrigger::Timeout)).unwrap_err();
        match err {
            PlanError::InvalidTransition(invalid) => {
                assert_eq!(invalid.from, SessionPhase::Waiting);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        apply(&mut sm, SessionEvent::Start { has_questions: true });
        apply(&mut sm, SessionEvent::Reveal(RevealTrigger::Host));
        assert!(sm.plan(SessionEvent::Reveal(RevealTrigger::Timeout)).is_err());
    }

    #[test]
    fn plan_while_pending_is_rejected() {
        let mut sm = SessionStateMachine::new();
        let _plan = sm.plan(SessionEvent::Start { has_questions: true }).unwrap();
        assert_eq!(
            sm.plan(SessionEvent::End).unwrap_err(),
            PlanError::AlreadyPending
        );

        let snapshot = sm.snapshot();
        assert_eq!(snapshot.phase, SessionPhase::Waiting);
        assert_eq!(snapshot.version, 0);
        assert_eq!(
            snapshot.pending,
            Some(SessionPhase::Active(QuestionPhase::Collecting))
        );
    }

    #[test]
    fn abort_clears_pending() {
        let mut sm = SessionStateMachine::new();
        let plan = sm.plan(SessionEvent::Start { has_questions: true }).unwrap();
        sm.abort(plan.id).unwrap();
        assert!(sm.pending.is_none());
        assert_eq!(sm.phase(), SessionPhase::Waiting);
    }

    #[test]
    fn apply_with_wrong_id_keeps_pending() {
        let mut sm = SessionStateMachine::new();
        let plan = sm.plan(SessionEvent::Start { has_questions: true }).unwrap();
        let err = sm.apply(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ApplyError::IdMismatch { .. }));

        // Original plan still applies cleanly afterwards.
        assert_eq!(
            sm.apply(plan.id).unwrap(),
            SessionPhase::Active(QuestionPhase::Collecting)
        );
    }
}
