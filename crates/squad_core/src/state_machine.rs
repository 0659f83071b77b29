//! Per-unit movement state machine.
//!
//! Four states model the spin-up and spin-down of heavy equipment:
//!
//! ```text
//!            MoveTo                 CommitMove
//! Engaged ----------> PreparingToMove ----------> Moving
//!    ^                  |    ^                      |
//!    |     CommitInPlace|    |ResumeQueued          |Arrived
//!    |                  v    |                      v
//!    +-------------- PreparingToEngage <------------+
//!      CommitEngage
//! ```
//!
//! Legality lives in one table, [`transition`]. Delays are countdowns
//! advanced by [`MovementMachine::tick`], so they follow the simulation
//! clock and pause whenever the simulation pauses.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MovementState {
    /// Stationary; allowed to fire.
    #[default]
    Engaged,
    /// Spinning up; the queued path has not been committed.
    PreparingToMove,
    /// Following the active path.
    Moving,
    /// Spinning down after arrival.
    PreparingToEngage,
}

impl MovementState {
    /// Delay armed on entering this state, if any.
    #[must_use]
    pub const fn delay(self) -> Option<DelayKind> {
        match self {
            Self::PreparingToMove => Some(DelayKind::Move),
            Self::PreparingToEngage => Some(DelayKind::Engage),
            Self::Engaged | Self::Moving => None,
        }
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementEvent {
    /// A new path was issued for the unit.
    MoveTo,
    /// The move delay elapsed and the destination differs from the anchor.
    CommitMove,
    /// The move delay elapsed but there is nowhere to go.
    CommitInPlace,
    /// The active path is exhausted and the unit sits on its anchor.
    Arrived,
    /// The engage delay elapsed with nothing queued.
    CommitEngage,
    /// The engage delay elapsed with a path waiting in the queue.
    ResumeQueued,
}

/// Side effect the owner must carry out for a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementAction {
    /// Store the new path as the queued path.
    QueuePath,
    /// Replace the queued path, keeping the running delay.
    ReplaceQueuedPath,
    /// Swap anchors and promote the queued path to active.
    CommitQueuedPath,
    /// Drop the queued path without moving.
    DiscardQueuedPath,
    /// Replace the active path immediately.
    RedirectActivePath,
    /// Nothing beyond the state change.
    None,
}

/// Which preparation delay elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DelayKind {
    /// Armed by `PreparingToMove`.
    Move,
    /// Armed by `PreparingToEngage`.
    Engage,
}

/// The transition table: `(state, event) -> (next state, action)`.
///
/// Pairs not listed are illegal and return `None`.
#[must_use]
pub const fn transition(
    state: MovementState,
    event: MovementEvent,
) -> Option<(MovementState, MovementAction)> {
    use MovementAction as A;
    use MovementEvent as E;
    use MovementState as S;

    match (state, event) {
        (S::Engaged, E::MoveTo) => Some((S::PreparingToMove, A::QueuePath)),

        (S::PreparingToMove, E::MoveTo) => Some((S::PreparingToMove, A::ReplaceQueuedPath)),
        (S::PreparingToMove, E::CommitMove) => Some((S::Moving, A::CommitQueuedPath)),
        (S::PreparingToMove, E::CommitInPlace) => {
            Some((S::PreparingToEngage, A::DiscardQueuedPath))
        }

        (S::Moving, E::MoveTo) => Some((S::Moving, A::RedirectActivePath)),
        (S::Moving, E::Arrived) => Some((S::PreparingToEngage, A::None)),

        (S::PreparingToEngage, E::MoveTo) => Some((S::PreparingToEngage, A::QueuePath)),
        (S::PreparingToEngage, E::CommitEngage) => Some((S::Engaged, A::None)),
        (S::PreparingToEngage, E::ResumeQueued) => Some((S::PreparingToMove, A::None)),

        _ => None,
    }
}

/// One state machine instance, owned by a unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MovementMachine {
    state: MovementState,
    running: bool,
    /// Pending delay and ticks left on it.
    armed: Option<(DelayKind, u32)>,
    move_delay_ticks: u32,
    engage_delay_ticks: u32,
}

impl MovementMachine {
    /// Create a stopped machine in `Engaged`.
    #[must_use]
    pub const fn new(move_delay_ticks: u32, engage_delay_ticks: u32) -> Self {
        Self {
            state: MovementState::Engaged,
            running: false,
            armed: None,
            move_delay_ticks,
            engage_delay_ticks,
        }
    }

    /// Begin accepting events.
    pub fn start(&mut self) {
        self.running = true;
    }

    /// Stop the machine. Later events and ticks are no-ops.
    pub fn stop(&mut self) {
        self.running = false;
        self.armed = None;
    }

    /// Whether the machine is running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> MovementState {
        self.state
    }

    /// Ticks left on the armed delay, if any.
    #[must_use]
    pub fn remaining_delay(&self) -> Option<u32> {
        self.armed.map(|(_, ticks)| ticks)
    }

    /// Feed an event through the table.
    ///
    /// Returns the action to perform, or `None` if the machine is stopped
    /// or the event is illegal in the current state. Entering a preparing
    /// state arms its delay; staying in one does not re-arm it.
    pub fn dispatch(&mut self, event: MovementEvent) -> Option<MovementAction> {
        if !self.running {
            tracing::debug!(?event, "event ignored by stopped machine");
            return None;
        }

        let Some((next, action)) = transition(self.state, event) else {
            tracing::debug!(state = ?self.state, ?event, "illegal movement event");
            return None;
        };

        if next != self.state {
            tracing::trace!(from = ?self.state, to = ?next, ?event, "movement transition");
            self.state = next;
            self.armed = next.delay().map(|kind| (kind, self.delay_ticks(kind)));
        }

        Some(action)
    }

    /// Advance the armed delay by one tick.
    ///
    /// Returns the delay kind on the tick it elapses. A zero-length delay
    /// elapses on the first tick after it was armed.
    pub fn tick(&mut self) -> Option<DelayKind> {
        if !self.running {
            return None;
        }

        let (kind, ticks) = self.armed?;
        let left = ticks.saturating_sub(1);
        if left == 0 {
            self.armed = None;
            Some(kind)
        } else {
            self.armed = Some((kind, left));
            None
        }
    }

    const fn delay_ticks(&self, kind: DelayKind) -> u32 {
        match kind {
            DelayKind::Move => self.move_delay_ticks,
            DelayKind::Engage => self.engage_delay_ticks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running(move_ticks: u32, engage_ticks: u32) -> MovementMachine {
        let mut m = MovementMachine::new(move_ticks, engage_ticks);
        m.start();
        m
    }

    fn tick_until_elapsed(m: &mut MovementMachine, limit: u32) -> (u32, Option<DelayKind>) {
        for n in 1..=limit {
            if let Some(kind) = m.tick() {
                return (n, Some(kind));
            }
        }
        (limit, None)
    }

    #[test]
    fn test_table_only_allows_listed_pairs() {
        use MovementEvent as E;
        use MovementState as S;

        let states = [S::Engaged, S::PreparingToMove, S::Moving, S::PreparingToEngage];
        let events = [
            E::MoveTo,
            E::CommitMove,
            E::CommitInPlace,
            E::Arrived,
            E::CommitEngage,
            E::ResumeQueued,
        ];

        let legal: usize = states
            .iter()
            .flat_map(|&s| events.iter().map(move |&e| transition(s, e)))
            .filter(Option::is_some)
            .count();
        assert_eq!(legal, 9);

        // Every state accepts a move command.
        for s in states {
            assert!(transition(s, E::MoveTo).is_some(), "{s:?} rejects MoveTo");
        }
        assert_eq!(transition(S::Engaged, E::Arrived), None);
        assert_eq!(transition(S::Moving, E::CommitMove), None);
    }

    #[test]
    fn test_move_delay_counts_host_ticks() {
        let mut m = running(5, 3);
        assert_eq!(m.dispatch(MovementEvent::MoveTo), Some(MovementAction::QueuePath));
        assert_eq!(m.state(), MovementState::PreparingToMove);

        let (ticks, kind) = tick_until_elapsed(&mut m, 10);
        assert_eq!((ticks, kind), (5, Some(DelayKind::Move)));
    }

    #[test]
    fn test_second_move_does_not_restart_delay() {
        let mut m = running(5, 3);
        m.dispatch(MovementEvent::MoveTo);
        m.tick();
        m.tick();
        assert_eq!(
            m.dispatch(MovementEvent::MoveTo),
            Some(MovementAction::ReplaceQueuedPath)
        );
        assert_eq!(m.remaining_delay(), Some(3));

        let (ticks, _) = tick_until_elapsed(&mut m, 10);
        assert_eq!(ticks, 3);
    }

    #[test]
    fn test_full_cycle() {
        let mut m = running(2, 2);
        m.dispatch(MovementEvent::MoveTo);
        tick_until_elapsed(&mut m, 5);
        assert_eq!(
            m.dispatch(MovementEvent::CommitMove),
            Some(MovementAction::CommitQueuedPath)
        );
        assert_eq!(m.state(), MovementState::Moving);
        assert_eq!(m.remaining_delay(), None);

        assert_eq!(
            m.dispatch(MovementEvent::MoveTo),
            Some(MovementAction::RedirectActivePath)
        );
        assert_eq!(m.state(), MovementState::Moving);

        m.dispatch(MovementEvent::Arrived);
        assert_eq!(m.state(), MovementState::PreparingToEngage);
        assert_eq!(tick_until_elapsed(&mut m, 5).1, Some(DelayKind::Engage));
        m.dispatch(MovementEvent::CommitEngage);
        assert_eq!(m.state(), MovementState::Engaged);
    }

    #[test]
    fn test_move_while_preparing_to_engage_is_queued() {
        let mut m = running(2, 4);
        m.dispatch(MovementEvent::MoveTo);
        tick_until_elapsed(&mut m, 5);
        m.dispatch(MovementEvent::CommitInPlace);
        assert_eq!(m.state(), MovementState::PreparingToEngage);

        assert_eq!(m.dispatch(MovementEvent::MoveTo), Some(MovementAction::QueuePath));
        assert_eq!(m.state(), MovementState::PreparingToEngage);
        assert_eq!(tick_until_elapsed(&mut m, 10), (4, Some(DelayKind::Engage)));

        m.dispatch(MovementEvent::ResumeQueued);
        assert_eq!(m.state(), MovementState::PreparingToMove);
        assert_eq!(m.remaining_delay(), Some(2));
    }

    #[test]
    fn test_stopped_machine_ignores_everything() {
        let mut m = running(1, 1);
        m.dispatch(MovementEvent::MoveTo);
        m.stop();

        assert_eq!(m.tick(), None);
        assert_eq!(m.dispatch(MovementEvent::CommitMove), None);
        assert_eq!(m.state(), MovementState::PreparingToMove);
    }

    #[test]
    fn test_zero_delay_elapses_next_tick() {
        let mut m = running(0, 0);
        m.dispatch(MovementEvent::MoveTo);
        assert_eq!(m.tick(), Some(DelayKind::Move));
        assert_eq!(m.tick(), None);
    }
}
