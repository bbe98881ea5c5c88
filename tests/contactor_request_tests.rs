use bmscore::config::BmsConfig;
use bmscore::contactor::{
    check_request, ContState, ContSubstate, ContactorStateMachine, RequestOutcome, SimulatedPins,
    StateRequest,
};
use bmscore::diag::DiagRecorder;
use bmscore::store::{ContactorStateRecord, MemoryStore, Store};

fn machine() -> ContactorStateMachine<SimulatedPins> {
    ContactorStateMachine::new(SimulatedPins::new(), &BmsConfig::default())
}

fn run_until(
    machine: &mut ContactorStateMachine<SimulatedPins>,
    store: &MemoryStore,
    diag: &mut DiagRecorder,
    state: ContState,
    substate: ContSubstate,
) -> bool {
    for _ in 0..10_000 {
        machine.trigger(store, diag);
        if machine.state() == state && machine.substate() == substate {
            return true;
        }
    }
    false
}

#[test]
fn test_legality_from_uninitialized() {
    let state = ContState::Uninitialized;
    assert_eq!(check_request(state, None, StateRequest::Init), RequestOutcome::Ok);
    assert_eq!(check_request(state, None, StateRequest::Standby), RequestOutcome::Ok);
    assert_eq!(check_request(state, None, StateRequest::Normal), RequestOutcome::RequestImpossible);
    assert_eq!(check_request(state, None, StateRequest::Error), RequestOutcome::Ok);
}

#[test]
fn test_legality_from_standby() {
    let state = ContState::Standby;
    assert_eq!(check_request(state, None, StateRequest::Init), RequestOutcome::AlreadyInitialized);
    assert_eq!(check_request(state, None, StateRequest::Standby), RequestOutcome::IllegalRequest);
    assert_eq!(check_request(state, None, StateRequest::Normal), RequestOutcome::Ok);
    assert_eq!(check_request(state, None, StateRequest::Charge), RequestOutcome::Ok);
    assert_eq!(check_request(state, None, StateRequest::Engine), RequestOutcome::Ok);
}

#[test]
fn test_legality_from_operating_states() {
    for state in [ContState::Normal, ContState::Charge, ContState::Engine, ContState::NormalPrecharge] {
        assert_eq!(check_request(state, None, StateRequest::Charge), RequestOutcome::RequestImpossible);
        assert_eq!(check_request(state, None, StateRequest::Standby), RequestOutcome::Ok);
        assert_eq!(check_request(state, None, StateRequest::Init), RequestOutcome::AlreadyInitialized);
    }
}

#[test]
fn test_occupied_slot_only_yields_to_error() {
    let pending = Some(StateRequest::Normal);
    assert_eq!(
        check_request(ContState::Standby, pending, StateRequest::Charge),
        RequestOutcome::RequestPending
    );
    assert_eq!(check_request(ContState::Standby, pending, StateRequest::Error), RequestOutcome::Ok);
}

#[test]
fn test_outcome_codes() {
    assert_eq!(RequestOutcome::Ok.code(), 0);
    assert_eq!(RequestOutcome::RequestPending.code(), 2);
    assert_eq!(RequestOutcome::RequestImpossible.code(), 3);
    assert_eq!(RequestOutcome::IllegalRequest.code(), 4);
    assert_eq!(RequestOutcome::AlreadyInitialized.code(), 30);
}

#[test]
fn test_error_request_overwrites_pending() {
    let machine = machine();
    let handle = machine.request_handle();
    assert_eq!(handle.submit(StateRequest::Init), RequestOutcome::Ok);
    assert_eq!(handle.submit(StateRequest::Error), RequestOutcome::Ok);
    assert_eq!(handle.pending(), Some(StateRequest::Error));
    assert_eq!(handle.rejected_count(), 0);
}

#[test]
fn test_unknown_codes_are_illegal_and_counted() {
    let machine = machine();
    let handle = machine.request_handle();
    assert_eq!(handle.submit_code(0x80), RequestOutcome::IllegalRequest);
    assert_eq!(handle.submit_code(0x42), RequestOutcome::IllegalRequest);
    assert_eq!(handle.rejected_count(), 2);
    assert_eq!(handle.pending(), None);
    assert_eq!(machine.rejected_requests(), 2);
}

#[test]
fn test_init_walks_to_standby() {
    let store = MemoryStore::new();
    let mut diag = DiagRecorder::new();
    let mut machine = machine();
    machine.request_handle().submit(StateRequest::Init);

    assert!(!machine.is_initialized());
    assert!(run_until(&mut machine, &store, &mut diag, ContState::Standby, ContSubstate::Standby));
    assert!(machine.is_initialized());
    assert_eq!(machine.oscillation_counter(), machine.timing().oscillation_limit);

    let record: ContactorStateRecord = store.read_block();
    assert_eq!(record.state, ContState::Standby);
    assert_eq!(record.substate, ContSubstate::Standby);
}

#[test]
fn test_rejected_request_leaves_state_alone() {
    let store = MemoryStore::new();
    let mut diag = DiagRecorder::new();
    let mut machine = machine();
    let handle = machine.request_handle();
    handle.submit(StateRequest::Init);
    assert!(run_until(&mut machine, &store, &mut diag, ContState::Standby, ContSubstate::Standby));

    assert_eq!(handle.submit(StateRequest::Init), RequestOutcome::AlreadyInitialized);
    assert_eq!(handle.submit(StateRequest::Standby), RequestOutcome::IllegalRequest);
    for _ in 0..10 {
        machine.trigger(&store, &mut diag);
    }
    assert_eq!(machine.state(), ContState::Standby);
    assert_eq!(machine.substate(), ContSubstate::Standby);
    assert_eq!(machine.rejected_requests(), 2);
}

#[test]
fn test_error_request_in_uninitialized_is_discarded() {
    let store = MemoryStore::new();
    let mut diag = DiagRecorder::new();
    let mut machine = machine();
    let handle = machine.request_handle();

    assert_eq!(handle.submit(StateRequest::Error), RequestOutcome::Ok);
    machine.trigger(&store, &mut diag);
    assert_eq!(machine.state(), ContState::Uninitialized);
    assert_eq!(handle.pending(), None);
    assert_eq!(machine.rejected_requests(), 1);
}

#[test]
fn test_error_state_leaves_through_open_sequence() {
    let store = MemoryStore::new();
    let mut diag = DiagRecorder::new();
    let mut machine = machine();
    let handle = machine.request_handle();
    handle.submit(StateRequest::Init);
    assert!(run_until(&mut machine, &store, &mut diag, ContState::Standby, ContSubstate::Standby));

    assert_eq!(handle.submit(StateRequest::Error), RequestOutcome::Ok);
    assert!(run_until(&mut machine, &store, &mut diag, ContState::Error, ContSubstate::Error));

    // ignored without counting
    assert_eq!(handle.submit(StateRequest::Error), RequestOutcome::Ok);
    machine.trigger(&store, &mut diag);
    assert_eq!(machine.state(), ContState::Error);
    assert_eq!(machine.rejected_requests(), 0);

    assert_eq!(handle.submit(StateRequest::Normal), RequestOutcome::RequestImpossible);
    assert_eq!(handle.submit(StateRequest::Standby), RequestOutcome::Ok);
    machine.trigger(&store, &mut diag);
    assert_eq!(machine.state(), ContState::OpenContactors);
    assert!(run_until(&mut machine, &store, &mut diag, ContState::Standby, ContSubstate::Standby));
}

#[test]
fn test_requests_stay_pending_during_initialization() {
    let store = MemoryStore::new();
    let mut diag = DiagRecorder::new();
    let mut machine = machine();
    let handle = machine.request_handle();
    handle.submit(StateRequest::Init);
    machine.trigger(&store, &mut diag);
    assert_eq!(machine.state(), ContState::Initialization);

    assert_eq!(handle.submit(StateRequest::Error), RequestOutcome::Ok);
    machine.trigger(&store, &mut diag);
    machine.trigger(&store, &mut diag);
    assert_eq!(machine.state(), ContState::Idle);
    assert_eq!(handle.pending(), Some(StateRequest::Error));

    assert!(run_until(&mut machine, &store, &mut diag, ContState::Error, ContSubstate::Error));
}
