use bmscore::config::BmsConfig;
use bmscore::contactor::{
    check_fuse, check_precharge, ContState, ContSubstate, ContactorId, ContactorStateMachine,
    FuseState, PowerLine, SimulatedPins, StateRequest, SwitchState,
};
use bmscore::diag::{DiagChannel, DiagEvent, DiagRecorder};
use bmscore::store::{ContactorFeedback, CurrentSensor, ErrorState, MemoryStore, Store};

fn config() -> BmsConfig {
    let mut config = BmsConfig::default();
    config.contactor.oscillation_limit = 0;
    config
}

fn run_until(
    machine: &mut ContactorStateMachine<SimulatedPins>,
    store: &MemoryStore,
    diag: &mut DiagRecorder,
    state: ContState,
    substate: ContSubstate,
) -> bool {
    for _ in 0..20_000 {
        machine.trigger(store, diag);
        if machine.state() == state && machine.substate() == substate {
            return true;
        }
    }
    false
}

fn normal_machine(store: &MemoryStore, diag: &mut DiagRecorder) -> ContactorStateMachine<SimulatedPins> {
    let mut machine = ContactorStateMachine::new(SimulatedPins::new(), &config());
    let handle = machine.request_handle();
    handle.submit(StateRequest::Init);
    assert!(run_until(&mut machine, store, diag, ContState::Standby, ContSubstate::Standby));
    handle.submit(StateRequest::Normal);
    assert!(run_until(&mut machine, store, diag, ContState::Normal, ContSubstate::Standby));
    // one more trigger samples feedback after the precharge contactor opened
    machine.trigger(store, diag);
    machine
}

#[test]
fn test_feedback_matches_set_values_in_normal() {
    let store = MemoryStore::new();
    let mut diag = DiagRecorder::new();
    let machine = normal_machine(&store, &mut diag);

    for id in ContactorId::ALL {
        assert_eq!(diag.last_event(DiagChannel::ContactorFeedback(id)), Some(DiagEvent::Ok), "{id:?}");
    }
    assert_eq!(machine.bank().status(ContactorId::MainPlus).feedback, SwitchState::On);

    let feedback: ContactorFeedback = store.read_block();
    let expected = ContactorId::MainPlus.feedback_bit() | ContactorId::MainMinus.feedback_bit();
    assert_eq!(feedback.bitmap, expected);
    assert!(feedback.timestamp_ms > feedback.previous_timestamp_ms);
}

#[test]
fn test_stuck_feedback_reports_nok_without_transition() {
    let store = MemoryStore::new();
    let mut diag = DiagRecorder::new();
    let mut machine = normal_machine(&store, &mut diag);

    machine
        .bank_mut()
        .pins_mut()
        .force_feedback(ContactorId::MainPlus, Some(SwitchState::Off));
    machine.trigger(&store, &mut diag);
    machine.trigger(&store, &mut diag);

    let channel = DiagChannel::ContactorFeedback(ContactorId::MainPlus);
    assert_eq!(diag.last_event(channel), Some(DiagEvent::Nok));
    assert_eq!(diag.nok_count(channel), 2);
    assert_eq!(machine.state(), ContState::Normal);
    assert_eq!(machine.substate(), ContSubstate::Standby);

    let feedback: ContactorFeedback = store.read_block();
    assert_eq!(feedback.bitmap & ContactorId::MainPlus.feedback_bit(), 0);
    assert_ne!(feedback.bitmap & ContactorId::MainMinus.feedback_bit(), 0);

    machine.bank_mut().pins_mut().force_feedback(ContactorId::MainPlus, None);
    machine.trigger(&store, &mut diag);
    assert_eq!(diag.last_event(channel), Some(DiagEvent::Ok));
}

#[test]
fn test_opening_under_load_is_reported() {
    let store = MemoryStore::new();
    let mut diag = DiagRecorder::new();
    let mut machine = normal_machine(&store, &mut diag);

    store.update_block::<CurrentSensor>(|sensor| sensor.current_ma = 50_000);
    machine.request_handle().submit(StateRequest::Standby);
    assert!(run_until(&mut machine, &store, &mut diag, ContState::Standby, ContSubstate::Standby));

    assert!(diag.nok_count(DiagChannel::ContactorSwitchOff(ContactorId::MainPlus)) >= 1);
    assert!(diag.nok_count(DiagChannel::ContactorSwitchOff(ContactorId::MainMinus)) >= 1);
}

#[test]
fn test_opening_without_load_is_ok() {
    let store = MemoryStore::new();
    let mut diag = DiagRecorder::new();
    let mut machine = normal_machine(&store, &mut diag);

    store.update_block::<CurrentSensor>(|sensor| sensor.current_ma = -200);
    machine.request_handle().submit(StateRequest::Standby);
    assert!(run_until(&mut machine, &store, &mut diag, ContState::Standby, ContSubstate::Standby));

    let channel = DiagChannel::ContactorSwitchOff(ContactorId::MainPlus);
    assert_eq!(diag.last_event(channel), Some(DiagEvent::Ok));
    assert_eq!(diag.nok_count(channel), 0);
}

#[test]
fn test_power_line_checks_after_precharge() {
    let store = MemoryStore::new();
    let mut diag = DiagRecorder::new();
    let machine = normal_machine(&store, &mut diag);
    let limits = BmsConfig::default().limits;
    let line = machine.power_line();
    assert_eq!(line, PowerLine::Line0);

    store.update_block::<CurrentSensor>(|sensor| {
        sensor.voltage_mv = [400_000.0, 400_000.0, 399_500.0];
        sensor.current_ma = 10;
    });
    assert!(check_precharge(&store, line, &limits));
    assert_eq!(check_fuse(&store, line, &limits, &mut diag, 10), FuseState::Intact);
    assert_eq!(diag.last_event(DiagChannel::FuseNormal), Some(DiagEvent::Ok));

    store.update_block::<CurrentSensor>(|sensor| {
        sensor.voltage_mv = [400_000.0, 390_000.0, 390_000.0];
        sensor.current_ma = 3_000;
    });
    assert!(!check_precharge(&store, line, &limits));
    assert_eq!(check_fuse(&store, line, &limits, &mut diag, 20), FuseState::Blown);
    assert_eq!(diag.last_event(DiagChannel::FuseNormal), Some(DiagEvent::Nok));
    let errors: ErrorState = store.read_block();
    assert!(errors.fuse_state_normal);
    assert!(!errors.fuse_state_charge);
}

#[test]
fn test_fuse_indeterminate_while_open() {
    let store = MemoryStore::new();
    let mut diag = DiagRecorder::new();
    let limits = BmsConfig::default().limits;

    store.write_block(&CurrentSensor {
        voltage_mv: [400_000.0, 0.0, 0.0],
        ..CurrentSensor::default()
    });
    assert_eq!(
        check_fuse(&store, PowerLine::Line0, &limits, &mut diag, 0),
        FuseState::Indeterminate
    );
    assert_eq!(diag.last_event(DiagChannel::FuseNormal), Some(DiagEvent::Ok));
    assert_eq!(check_fuse(&store, PowerLine::None, &limits, &mut diag, 0), FuseState::Indeterminate);
}
