//! Operator interaction state machine
//!
//! Each UI event maps to exactly one transition. Transitions are pure: they
//! only decide the next state and which [`Action`] the session should carry
//! out. Rendering and storage stay outside.

use crate::geometry::Point;
use crate::pairing::TubeIdx;
use crate::types::Side;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum InteractionState {
    #[default]
    Idle,
    /// First tube of a pair has been clicked
    AwaitingSecondTube(TubeIdx),
    /// Pointer moves along the conduit of this side to place a split point
    PickingSplitPoint(Side),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InteractionEvent {
    TubeClicked(TubeIdx),
    StartSplitPick(Side),
    PointerMoved(Point),
    LeftClick(Point),
    RightClick,
    /// Another map tool was activated
    ToolChanged,
}

/// What the session must do for a transition
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    None,
    SelectTube(TubeIdx),
    ClearSelection,
    PairTubes(TubeIdx, TubeIdx),
    TrackSplit(Side, Point),
    FixSplit(Side, Point),
    CancelSplit(Side),
}

impl InteractionState {
    /// Next state for `event`
    ///
    /// `side_of` resolves the side of a clicked tube; unknown tubes are
    /// ignored.
    pub fn next(self, event: InteractionEvent, side_of: impl Fn(TubeIdx) -> Option<Side>) -> (Self, Action) {
        use InteractionEvent as E;
        use InteractionState as S;

        match (self, event) {
            (_, E::StartSplitPick(side)) => (S::PickingSplitPoint(side), Action::None),

            (S::Idle, E::TubeClicked(tube)) => match side_of(tube) {
                Some(_) => (S::AwaitingSecondTube(tube), Action::SelectTube(tube)),
                None => (S::Idle, Action::None),
            },

            (S::AwaitingSecondTube(first), E::TubeClicked(tube)) => {
                if tube == first {
                    return (S::Idle, Action::ClearSelection);
                }
                match (side_of(first), side_of(tube)) {
                    (Some(a), Some(b)) if a == b => (S::AwaitingSecondTube(tube), Action::SelectTube(tube)),
                    (Some(_), Some(_)) => (S::Idle, Action::PairTubes(first, tube)),
                    _ => (self, Action::None),
                }
            }
            (S::AwaitingSecondTube(_), E::RightClick | E::ToolChanged) => (S::Idle, Action::ClearSelection),

            (S::PickingSplitPoint(side), E::PointerMoved(p)) => (self, Action::TrackSplit(side, p)),
            (S::PickingSplitPoint(side), E::LeftClick(p)) => (S::Idle, Action::FixSplit(side, p)),
            (S::PickingSplitPoint(side), E::RightClick | E::ToolChanged) => (S::Idle, Action::CancelSplit(side)),

            _ => (self, Action::None),
        }
    }
}
