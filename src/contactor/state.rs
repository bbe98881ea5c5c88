use serde::{Deserialize, Serialize};

/// Code a bus master sends when it has nothing to request.
pub const NO_REQUEST_CODE: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContState {
    Uninitialized,
    Initialization,
    Initialized,
    Idle,
    Standby,
    NormalPrecharge,
    Normal,
    ChargePrecharge,
    Charge,
    EnginePrecharge,
    Engine,
    OpenContactors,
    Undefined,
    Error,
}

impl ContState {
    pub const fn code(self) -> u8 {
        match self {
            ContState::Uninitialized => 0,
            ContState::Initialization => 1,
            ContState::Initialized => 2,
            ContState::Idle => 3,
            ContState::Standby => 4,
            ContState::NormalPrecharge => 5,
            ContState::Normal => 6,
            ContState::ChargePrecharge => 7,
            ContState::Charge => 8,
            ContState::EnginePrecharge => 9,
            ContState::Engine => 10,
            ContState::OpenContactors => 11,
            ContState::Undefined => 20,
            ContState::Error => 0xF0,
        }
    }

    pub const fn is_precharge(self) -> bool {
        matches!(
            self,
            ContState::NormalPrecharge | ContState::ChargePrecharge | ContState::EnginePrecharge
        )
    }

    pub const fn is_operating(self) -> bool {
        matches!(self, ContState::Normal | ContState::Charge | ContState::Engine)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContSubstate {
    Entry,
    Standby,
    CloseEngine,
    CloseMinusStep1,
    CloseMinusStep2,
    ClosePrecharge,
    ClosePlusStep1,
    ClosePlusStep2,
    OpenPrecharge,
    OpenPlusStep1,
    OpenPlusStep2,
    OpenMinusStep1,
    OpenMinusStep2,
    Error,
}

impl ContSubstate {
    pub const fn code(self) -> u8 {
        match self {
            ContSubstate::Entry => 0,
            ContSubstate::Standby => 1,
            ContSubstate::CloseEngine => 2,
            ContSubstate::CloseMinusStep1 => 3,
            ContSubstate::CloseMinusStep2 => 4,
            ContSubstate::ClosePrecharge => 5,
            ContSubstate::ClosePlusStep1 => 6,
            ContSubstate::ClosePlusStep2 => 7,
            ContSubstate::OpenPrecharge => 8,
            ContSubstate::OpenPlusStep1 => 9,
            ContSubstate::OpenPlusStep2 => 10,
            ContSubstate::OpenMinusStep1 => 11,
            ContSubstate::OpenMinusStep2 => 12,
            ContSubstate::Error => 0xF0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateRequest {
    Init,
    Standby,
    Normal,
    Charge,
    Engine,
    Error,
}

impl StateRequest {
    pub const fn code(self) -> u8 {
        match self {
            StateRequest::Init => 1,
            StateRequest::Standby => 4,
            StateRequest::Normal => 6,
            StateRequest::Charge => 8,
            StateRequest::Engine => 10,
            StateRequest::Error => 0xF0,
        }
    }

    /// Unknown codes and [`NO_REQUEST_CODE`] map to `None`.
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(StateRequest::Init),
            4 => Some(StateRequest::Standby),
            6 => Some(StateRequest::Normal),
            8 => Some(StateRequest::Charge),
            10 => Some(StateRequest::Engine),
            0xF0 => Some(StateRequest::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestOutcome {
    Ok,
    /// A request is already waiting to be consumed.
    RequestPending,
    /// Valid request, not allowed from the current state.
    RequestImpossible,
    IllegalRequest,
    AlreadyInitialized,
}

impl RequestOutcome {
    pub const fn code(self) -> u8 {
        match self {
            RequestOutcome::Ok => 0,
            RequestOutcome::RequestPending => 2,
            RequestOutcome::RequestImpossible => 3,
            RequestOutcome::IllegalRequest => 4,
            RequestOutcome::AlreadyInitialized => 30,
        }
    }

    pub const fn is_accepted(self) -> bool {
        matches!(self, RequestOutcome::Ok)
    }
}

/// Power line currently connected to the pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PowerLine {
    #[default]
    None,
    /// Traction line.
    Line0,
    /// Charge line.
    Line1,
}

/// Legality of `request` given the machine state and the pending slot.
///
/// Error requests always pass and replace whatever is pending.
pub fn check_request(
    state: ContState,
    pending: Option<StateRequest>,
    request: StateRequest,
) -> RequestOutcome {
    if request == StateRequest::Error {
        return RequestOutcome::Ok;
    }
    if pending.is_some() {
        return RequestOutcome::RequestPending;
    }

    match request {
        StateRequest::Init => {
            if state == ContState::Uninitialized {
                RequestOutcome::Ok
            } else {
                RequestOutcome::AlreadyInitialized
            }
        }
        StateRequest::Standby => {
            if state == ContState::Standby {
                RequestOutcome::IllegalRequest
            } else {
                RequestOutcome::Ok
            }
        }
        StateRequest::Normal | StateRequest::Charge | StateRequest::Engine => {
            if state == ContState::Standby {
                RequestOutcome::Ok
            } else {
                RequestOutcome::RequestImpossible
            }
        }
        StateRequest::Error => RequestOutcome::Ok,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_codes_round_trip() {
        for request in [
            StateRequest::Init,
            StateRequest::Standby,
            StateRequest::Normal,
            StateRequest::Charge,
            StateRequest::Engine,
            StateRequest::Error,
        ] {
            assert_eq!(StateRequest::from_code(request.code()), Some(request));
        }
        assert_eq!(StateRequest::from_code(NO_REQUEST_CODE), None);
        assert_eq!(StateRequest::from_code(0x42), None);
    }

    #[test]
    fn test_request_codes_match_target_states() {
        assert_eq!(StateRequest::Standby.code(), ContState::Standby.code());
        assert_eq!(StateRequest::Normal.code(), ContState::Normal.code());
        assert_eq!(StateRequest::Charge.code(), ContState::Charge.code());
        assert_eq!(StateRequest::Engine.code(), ContState::Engine.code());
        assert_eq!(StateRequest::Error.code(), ContState::Error.code());
    }
}
