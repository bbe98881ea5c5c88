//! Pure transition table of the contactor machine.
//!
//! [`next`] maps `(state, substate, request)` to the following state and
//! substate, the dwell before the next step and the actuation actions to
//! run. It touches no hardware, so every sequence can be checked in
//! isolation.

use super::state::{ContState, ContSubstate, PowerLine, StateRequest};
use super::{ContactorId, Direction};
use crate::config::{ContactorTiming, OscillationGuardScope};
use heapless::Vec;

pub const MAX_ACTIONS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Assert the coil (latching) or switch the level (non-latching).
    BeginSwitch(ContactorId, Direction),
    /// Release the coil and record the new set value.
    CompleteSwitch(ContactorId),
    /// Both phases at once, for level-held contactors.
    SetLevel(ContactorId, Direction),
    /// End every coil pulse still running.
    ReleaseCoils,
    ArmOscillationGuard,
    ResetPrechargeTries,
    CountPrechargeAttempt,
    SetPowerLine(PowerLine),
    FinishInitialization,
    /// A consumed request this position cannot serve.
    Discard(StateRequest),
}

/// Named dwell times, resolved against [`ContactorTiming`] by the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dwell {
    /// Run again on the next trigger.
    None,
    Short,
    PulseWidth,
    WaitAfterClosingMinus,
    PrechargeTime,
    WaitAfterClosingPlus,
    WaitAfterOpeningPrecharge,
}

impl Dwell {
    pub const fn millis(self, timing: &ContactorTiming) -> u16 {
        match self {
            Dwell::None => 0,
            Dwell::Short => timing.short_time_ms,
            Dwell::PulseWidth => timing.latching_pulse_width_ms,
            Dwell::WaitAfterClosingMinus => timing.wait_after_closing_minus_ms,
            Dwell::PrechargeTime => timing.precharge_time_ms,
            Dwell::WaitAfterClosingPlus => timing.wait_after_closing_plus_ms,
            Dwell::WaitAfterOpeningPrecharge => timing.wait_after_opening_precharge_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineView {
    pub state: ContState,
    pub substate: ContSubstate,
    /// The oscillation counter has not run down yet.
    pub oscillation_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: ContState,
    pub substate: ContSubstate,
    pub dwell: Dwell,
    pub actions: Vec<Action, MAX_ACTIONS>,
}

impl Transition {
    fn to(state: ContState, substate: ContSubstate, dwell: Dwell) -> Self {
        Self {
            state,
            substate,
            dwell,
            actions: Vec::new(),
        }
    }

    fn stay(view: &MachineView, dwell: Dwell) -> Self {
        Self::to(view.state, view.substate, dwell)
    }

    fn with(mut self, action: Action) -> Self {
        let pushed = self.actions.push(action);
        debug_assert!(pushed.is_ok(), "transition action list overflow");
        self
    }
}

/// Positions in which the machine takes the pending request out of the
/// slot. Everywhere else a request stays pending.
pub const fn consumes_requests(state: ContState, substate: ContSubstate) -> bool {
    match state {
        ContState::Uninitialized => true,
        ContState::Standby | ContState::Error => matches!(substate, ContSubstate::Standby | ContSubstate::Error),
        _ => state.is_precharge() || state.is_operating(),
    }
}

pub fn next(
    view: &MachineView,
    request: Option<StateRequest>,
    scope: OscillationGuardScope,
) -> Transition {
    match view.state {
        ContState::Uninitialized => match request {
            Some(StateRequest::Init) => {
                Transition::to(ContState::Initialization, ContSubstate::Entry, Dwell::Short)
            }
            Some(other) => Transition::stay(view, Dwell::None).with(Action::Discard(other)),
            None => Transition::stay(view, Dwell::None),
        },
        ContState::Initialization => {
            Transition::to(ContState::Initialized, ContSubstate::Entry, Dwell::Short)
        }
        ContState::Initialized => Transition::to(ContState::Idle, ContSubstate::Entry, Dwell::Short),
        ContState::Idle => Transition::to(ContState::Standby, ContSubstate::Entry, Dwell::Short)
            .with(Action::FinishInitialization),
        ContState::Standby => standby(view, request),
        ContState::NormalPrecharge | ContState::ChargePrecharge | ContState::EnginePrecharge => {
            match request {
                Some(StateRequest::Standby) => abort_to(ContState::OpenContactors),
                Some(StateRequest::Error) => abort_to(ContState::Error),
                Some(other) => precharge(view, scope).with(Action::Discard(other)),
                None => precharge(view, scope),
            }
        }
        ContState::Normal | ContState::Charge | ContState::Engine => match request {
            Some(StateRequest::Standby) => {
                Transition::to(ContState::OpenContactors, ContSubstate::Entry, Dwell::Short)
            }
            Some(StateRequest::Error) => {
                Transition::to(ContState::Error, ContSubstate::Entry, Dwell::Short)
            }
            Some(other) => Transition::stay(view, Dwell::None).with(Action::Discard(other)),
            None => Transition::stay(view, Dwell::None),
        },
        ContState::OpenContactors => open_contactors(view),
        ContState::Error => error(view, request),
        ContState::Undefined => Transition::to(ContState::Error, ContSubstate::Entry, Dwell::Short),
    }
}

fn standby(view: &MachineView, request: Option<StateRequest>) -> Transition {
    if view.substate == ContSubstate::Entry {
        return Transition::to(ContState::Standby, ContSubstate::Standby, Dwell::Short)
            .with(Action::ArmOscillationGuard)
            .with(Action::SetPowerLine(PowerLine::None));
    }

    let target = match request {
        Some(StateRequest::Normal) => ContState::NormalPrecharge,
        Some(StateRequest::Charge) => ContState::ChargePrecharge,
        Some(StateRequest::Engine) => ContState::EnginePrecharge,
        Some(StateRequest::Error) => ContState::Error,
        Some(StateRequest::Standby) | None => return Transition::stay(view, Dwell::None),
        Some(other @ StateRequest::Init) => {
            return Transition::stay(view, Dwell::None).with(Action::Discard(other))
        }
    };
    Transition::to(target, ContSubstate::Entry, Dwell::Short)
}

/// Leaves a precharge sequence between steps. A coil still asserted from
/// the previous step is released first.
fn abort_to(state: ContState) -> Transition {
    Transition::to(state, ContSubstate::Entry, Dwell::Short).with(Action::ReleaseCoils)
}

fn precharge(view: &MachineView, scope: OscillationGuardScope) -> Transition {
    let state = view.state;
    let step = |substate, dwell| Transition::to(state, substate, dwell);

    match view.substate {
        ContSubstate::Entry => {
            if view.oscillation_active && scope == OscillationGuardScope::AllSequences {
                return Transition::stay(view, Dwell::Short);
            }
            let first = if state == ContState::EnginePrecharge {
                ContSubstate::CloseEngine
            } else {
                ContSubstate::CloseMinusStep1
            };
            step(first, Dwell::Short).with(Action::ResetPrechargeTries)
        }
        ContSubstate::CloseEngine => step(ContSubstate::CloseMinusStep1, Dwell::WaitAfterClosingMinus)
            .with(Action::SetLevel(ContactorId::Engine, Direction::Close)),
        ContSubstate::CloseMinusStep1 => step(ContSubstate::CloseMinusStep2, Dwell::PulseWidth)
            .with(Action::BeginSwitch(ContactorId::MainMinus, Direction::Close)),
        ContSubstate::CloseMinusStep2 => step(ContSubstate::ClosePrecharge, Dwell::WaitAfterClosingMinus)
            .with(Action::CompleteSwitch(ContactorId::MainMinus))
            .with(Action::CountPrechargeAttempt),
        ContSubstate::ClosePrecharge => step(ContSubstate::ClosePlusStep1, Dwell::PrechargeTime)
            .with(Action::SetLevel(ContactorId::Precharge, Direction::Close)),
        ContSubstate::ClosePlusStep1 => step(ContSubstate::ClosePlusStep2, Dwell::PulseWidth)
            .with(Action::BeginSwitch(ContactorId::MainPlus, Direction::Close)),
        ContSubstate::ClosePlusStep2 => step(ContSubstate::OpenPrecharge, Dwell::WaitAfterClosingPlus)
            .with(Action::CompleteSwitch(ContactorId::MainPlus)),
        ContSubstate::OpenPrecharge => {
            let (operating, line) = match state {
                ContState::ChargePrecharge => (ContState::Charge, PowerLine::Line1),
                ContState::EnginePrecharge => (ContState::Engine, PowerLine::Line0),
                _ => (ContState::Normal, PowerLine::Line0),
            };
            Transition::to(operating, ContSubstate::Standby, Dwell::WaitAfterOpeningPrecharge)
                .with(Action::SetLevel(ContactorId::Precharge, Direction::Open))
                .with(Action::SetPowerLine(line))
        }
        // Not part of a precharge sequence; drop whatever may be closed.
        _ => abort_to(ContState::OpenContactors),
    }
}

fn open_contactors(view: &MachineView) -> Transition {
    let step = |substate, dwell| Transition::to(ContState::OpenContactors, substate, dwell);

    match view.substate {
        ContSubstate::Entry => {
            if view.oscillation_active {
                return Transition::stay(view, Dwell::Short);
            }
            step(ContSubstate::OpenPlusStep1, Dwell::Short)
                .with(Action::SetLevel(ContactorId::Engine, Direction::Open))
                .with(Action::SetLevel(ContactorId::Precharge, Direction::Open))
                .with(Action::ResetPrechargeTries)
        }
        ContSubstate::OpenPlusStep1 => step(ContSubstate::OpenPlusStep2, Dwell::PulseWidth)
            .with(Action::BeginSwitch(ContactorId::MainPlus, Direction::Open)),
        ContSubstate::OpenPlusStep2 => step(ContSubstate::OpenMinusStep1, Dwell::Short)
            .with(Action::CompleteSwitch(ContactorId::MainPlus)),
        ContSubstate::OpenMinusStep1 => step(ContSubstate::OpenMinusStep2, Dwell::PulseWidth)
            .with(Action::BeginSwitch(ContactorId::MainMinus, Direction::Open)),
        ContSubstate::OpenMinusStep2 => {
            Transition::to(ContState::Standby, ContSubstate::Entry, Dwell::Short)
                .with(Action::CompleteSwitch(ContactorId::MainMinus))
                .with(Action::SetPowerLine(PowerLine::None))
        }
        _ => step(ContSubstate::Entry, Dwell::Short).with(Action::ReleaseCoils),
    }
}

fn error(view: &MachineView, request: Option<StateRequest>) -> Transition {
    if view.substate != ContSubstate::Error {
        return Transition::to(ContState::Error, ContSubstate::Error, Dwell::Short);
    }
    match request {
        Some(StateRequest::Standby) => {
            Transition::to(ContState::OpenContactors, ContSubstate::Entry, Dwell::Short)
        }
        Some(StateRequest::Error) | None => Transition::stay(view, Dwell::None),
        Some(other) => Transition::stay(view, Dwell::None).with(Action::Discard(other)),
    }
}

/// Steps of the precharge sequence run for `state`, starting after Entry.
pub fn precharge_steps(state: ContState) -> &'static [ContSubstate] {
    const NORMAL: [ContSubstate; 6] = [
        ContSubstate::CloseMinusStep1,
        ContSubstate::CloseMinusStep2,
        ContSubstate::ClosePrecharge,
        ContSubstate::ClosePlusStep1,
        ContSubstate::ClosePlusStep2,
        ContSubstate::OpenPrecharge,
    ];
    const ENGINE: [ContSubstate; 7] = [
        ContSubstate::CloseEngine,
        ContSubstate::CloseMinusStep1,
        ContSubstate::CloseMinusStep2,
        ContSubstate::ClosePrecharge,
        ContSubstate::ClosePlusStep1,
        ContSubstate::ClosePlusStep2,
        ContSubstate::OpenPrecharge,
    ];
    match state {
        ContState::EnginePrecharge => &ENGINE,
        ContState::NormalPrecharge | ContState::ChargePrecharge => &NORMAL,
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(state: ContState, substate: ContSubstate) -> MachineView {
        MachineView {
            state,
            substate,
            oscillation_active: false,
        }
    }

    #[test]
    fn test_normal_precharge_walks_documented_order() {
        let mut current = view(ContState::NormalPrecharge, ContSubstate::Entry);
        let mut visited = std::vec::Vec::new();
        while current.state == ContState::NormalPrecharge {
            let t = next(&current, None, OscillationGuardScope::AllSequences);
            current = view(t.state, t.substate);
            visited.push(t.substate);
        }
        assert_eq!(current.state, ContState::Normal);
        assert_eq!(current.substate, ContSubstate::Standby);
        assert_eq!(&visited[..6], precharge_steps(ContState::NormalPrecharge));
    }

    #[test]
    fn test_engine_closes_engine_before_minus() {
        let t = next(
            &view(ContState::EnginePrecharge, ContSubstate::Entry),
            None,
            OscillationGuardScope::AllSequences,
        );
        assert_eq!(t.substate, ContSubstate::CloseEngine);
        let t = next(&view(t.state, t.substate), None, OscillationGuardScope::AllSequences);
        assert_eq!(t.substate, ContSubstate::CloseMinusStep1);
        assert_eq!(t.actions[0], Action::SetLevel(ContactorId::Engine, Direction::Close));
    }

    #[test]
    fn test_guard_scope_controls_precharge_entry() {
        let guarded = MachineView {
            oscillation_active: true,
            ..view(ContState::ChargePrecharge, ContSubstate::Entry)
        };
        let stalled = next(&guarded, None, OscillationGuardScope::AllSequences);
        assert_eq!(stalled.substate, ContSubstate::Entry);
        let started = next(&guarded, None, OscillationGuardScope::OpenOnly);
        assert_eq!(started.substate, ContSubstate::CloseMinusStep1);

        let opening = MachineView {
            oscillation_active: true,
            ..view(ContState::OpenContactors, ContSubstate::Entry)
        };
        let stalled = next(&opening, None, OscillationGuardScope::OpenOnly);
        assert_eq!(stalled.substate, ContSubstate::Entry);
        assert!(stalled.actions.is_empty());
    }

    #[test]
    fn test_error_request_preempts_precharge() {
        let t = next(
            &view(ContState::NormalPrecharge, ContSubstate::ClosePrecharge),
            Some(StateRequest::Error),
            OscillationGuardScope::AllSequences,
        );
        assert_eq!(t.state, ContState::Error);
        assert_eq!(t.substate, ContSubstate::Entry);
        assert_eq!(t.actions[0], Action::ReleaseCoils);
    }

    #[test]
    fn test_request_consumption_positions() {
        assert!(consumes_requests(ContState::Uninitialized, ContSubstate::Entry));
        assert!(!consumes_requests(ContState::Initialization, ContSubstate::Entry));
        assert!(!consumes_requests(ContState::Standby, ContSubstate::Entry));
        assert!(consumes_requests(ContState::Standby, ContSubstate::Standby));
        assert!(consumes_requests(ContState::EnginePrecharge, ContSubstate::ClosePlusStep2));
        assert!(consumes_requests(ContState::Charge, ContSubstate::Standby));
        assert!(!consumes_requests(ContState::OpenContactors, ContSubstate::OpenMinusStep1));
        assert!(!consumes_requests(ContState::Error, ContSubstate::Entry));
        assert!(consumes_requests(ContState::Error, ContSubstate::Error));
    }
}
