//! CHTL-JS parse state machine.
//!
//! The parser drives this machine at construct boundaries; transitions are
//! validated against a rule table keyed by `(from_state, trigger)`. An
//! invalid transition is recorded and the machine resets to `Initial` so
//! parsing can continue.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JsState {
    Initial,
    ParseEnhancedSelector,
    ParseVirtualObject,
    ParseListen,
    ParseDelegate,
    ParseAnimate,
    ParseArrowAccess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JsTrigger {
    SelectorOpen,
    SelectorClose,
    VirKeyword,
    StatementEnd,
    ListenOpen,
    DelegateOpen,
    AnimateOpen,
    CloseParen,
    ArrowOperator,
    ChainEnd,
}

const TRANSITIONS: &[(JsState, JsTrigger, JsState)] = &[
    (JsState::Initial, JsTrigger::SelectorOpen, JsState::ParseEnhancedSelector),
    (JsState::ParseEnhancedSelector, JsTrigger::SelectorClose, JsState::Initial),
    (JsState::Initial, JsTrigger::VirKeyword, JsState::ParseVirtualObject),
    (JsState::ParseVirtualObject, JsTrigger::StatementEnd, JsState::Initial),
    // A vir initialiser that ran through listen/animate already returned to
    // Initial before its statement end.
    (JsState::Initial, JsTrigger::StatementEnd, JsState::Initial),
    (JsState::ParseVirtualObject, JsTrigger::ListenOpen, JsState::ParseListen),
    (JsState::ParseVirtualObject, JsTrigger::AnimateOpen, JsState::ParseAnimate),
    (JsState::ParseArrowAccess, JsTrigger::ListenOpen, JsState::ParseListen),
    (JsState::ParseArrowAccess, JsTrigger::DelegateOpen, JsState::ParseDelegate),
    (JsState::ParseListen, JsTrigger::CloseParen, JsState::Initial),
    (JsState::ParseDelegate, JsTrigger::CloseParen, JsState::Initial),
    (JsState::Initial, JsTrigger::AnimateOpen, JsState::ParseAnimate),
    (JsState::ParseAnimate, JsTrigger::CloseParen, JsState::Initial),
    (JsState::Initial, JsTrigger::ArrowOperator, JsState::ParseArrowAccess),
    (JsState::ParseArrowAccess, JsTrigger::ArrowOperator, JsState::ParseArrowAccess),
    (JsState::ParseArrowAccess, JsTrigger::ChainEnd, JsState::Initial),
];

#[derive(Debug, Clone, PartialEq)]
pub struct InvalidTransition {
    pub from: JsState,
    pub trigger: JsTrigger,
}

#[derive(Debug)]
pub struct StateMachine {
    state: JsState,
}

impl StateMachine {
    pub fn new() -> Self {
        StateMachine { state: JsState::Initial }
    }

    pub fn state(&self) -> JsState {
        self.state
    }

    pub fn transition(&mut self, trigger: JsTrigger) -> Result<JsState, InvalidTransition> {
        for (from, when, to) in TRANSITIONS {
            if *from == self.state && *when == trigger {
                self.state = *to;
                return Ok(*to);
            }
        }
        let err = InvalidTransition { from: self.state, trigger };
        self.state = JsState::Initial;
        Err(err)
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
