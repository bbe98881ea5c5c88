use bmscore::config::{BmsConfig, OscillationGuardScope};
use bmscore::contactor::sim::SwitchEvent;
use bmscore::contactor::{
    ContState, ContSubstate, ContactorControl, ContactorId, ContactorStateMachine, Direction,
    PowerLine, SimulatedPins, StateRequest, TriggerOutcome,
};
use bmscore::diag::DiagRecorder;
use bmscore::store::MemoryStore;

struct Rig {
    store: MemoryStore,
    diag: DiagRecorder,
    machine: ContactorStateMachine<SimulatedPins>,
}

impl Rig {
    fn new(config: &BmsConfig) -> Self {
        Self {
            store: MemoryStore::new(),
            diag: DiagRecorder::new(),
            machine: ContactorStateMachine::new(SimulatedPins::new(), config),
        }
    }

    /// Machine resting in Standby with the oscillation guard run down.
    fn in_standby(config: &BmsConfig) -> Self {
        let mut rig = Self::new(config);
        rig.machine.request_handle().submit(StateRequest::Init);
        assert!(rig.run_until(ContState::Standby, ContSubstate::Standby));
        rig.steps(usize::from(config.contactor.oscillation_limit));
        rig.machine.bank_mut().pins_mut().clear_events();
        rig
    }

    fn step(&mut self) -> TriggerOutcome {
        self.machine.trigger(&self.store, &mut self.diag)
    }

    fn steps(&mut self, count: usize) {
        for _ in 0..count {
            self.step();
        }
    }

    fn run_until(&mut self, state: ContState, substate: ContSubstate) -> bool {
        for _ in 0..20_000 {
            self.step();
            if self.machine.state() == state && self.machine.substate() == substate {
                return true;
            }
        }
        false
    }

    fn events(&self) -> Vec<SwitchEvent> {
        self.machine.bank().pins().events().to_vec()
    }
}

fn quiet_config() -> BmsConfig {
    let mut config = BmsConfig::default();
    config.contactor.oscillation_limit = 0;
    config
}

fn close(contactor: ContactorId) -> SwitchEvent {
    SwitchEvent { contactor, direction: Direction::Close }
}

fn open(contactor: ContactorId) -> SwitchEvent {
    SwitchEvent { contactor, direction: Direction::Open }
}

/// Total dwell from entering the precharge state to reaching its operating state.
fn precharge_duration(config: &BmsConfig, engine: bool) -> usize {
    let t = &config.contactor;
    let mut total = u32::from(t.short_time_ms) * 2
        + u32::from(t.latching_pulse_width_ms) * 2
        + u32::from(t.wait_after_closing_minus_ms)
        + u32::from(t.precharge_time_ms)
        + u32::from(t.wait_after_closing_plus_ms);
    if engine {
        total += u32::from(t.wait_after_closing_minus_ms);
    }
    (total / u32::from(t.tick_ms)) as usize
}

#[test]
fn test_normal_precharge_takes_sum_of_dwells() {
    let config = quiet_config();
    let mut rig = Rig::in_standby(&config);

    rig.machine.request_handle().submit(StateRequest::Normal);
    rig.step();
    assert_eq!(rig.machine.state(), ContState::NormalPrecharge);
    assert_eq!(rig.machine.substate(), ContSubstate::Entry);

    let duration = precharge_duration(&config, false);
    rig.steps(duration - 1);
    assert_eq!(rig.machine.state(), ContState::NormalPrecharge);
    assert_eq!(rig.machine.substate(), ContSubstate::OpenPrecharge);

    rig.step();
    assert_eq!(rig.machine.state(), ContState::Normal);
    assert_eq!(rig.machine.substate(), ContSubstate::Standby);
    assert_eq!(rig.machine.power_line(), PowerLine::Line0);
    assert_eq!(rig.machine.precharge_try_counter(), 1);
}

#[test]
fn test_normal_precharge_actuation_order() {
    let config = quiet_config();
    let mut rig = Rig::in_standby(&config);
    rig.machine.request_handle().submit(StateRequest::Normal);
    assert!(rig.run_until(ContState::Normal, ContSubstate::Standby));

    assert_eq!(
        rig.events(),
        vec![
            close(ContactorId::MainMinus),
            close(ContactorId::Precharge),
            close(ContactorId::MainPlus),
            open(ContactorId::Precharge),
        ]
    );
    let pins = rig.machine.bank().pins();
    assert!(pins.is_closed(ContactorId::MainPlus));
    assert!(pins.is_closed(ContactorId::MainMinus));
    assert!(!pins.is_closed(ContactorId::Precharge));
}

#[test]
fn test_engine_precharge_closes_engine_first() {
    let config = quiet_config();
    let mut rig = Rig::in_standby(&config);
    rig.machine.request_handle().submit(StateRequest::Engine);
    rig.step();
    rig.steps(precharge_duration(&config, true));

    assert_eq!(rig.machine.state(), ContState::Engine);
    assert_eq!(rig.machine.power_line(), PowerLine::Line0);
    assert_eq!(rig.events()[0], close(ContactorId::Engine));
    assert_eq!(rig.events()[1], close(ContactorId::MainMinus));
}

#[test]
fn test_charge_precharge_uses_charge_line() {
    let config = quiet_config();
    let mut rig = Rig::in_standby(&config);
    rig.machine.request_handle().submit(StateRequest::Charge);
    assert!(rig.run_until(ContState::Charge, ContSubstate::Standby));
    assert_eq!(rig.machine.power_line(), PowerLine::Line1);
}

#[test]
fn test_standby_mid_precharge_waits_for_dwell() {
    let config = quiet_config();
    let mut rig = Rig::in_standby(&config);
    let handle = rig.machine.request_handle();
    handle.submit(StateRequest::Normal);
    assert!(rig.run_until(ContState::NormalPrecharge, ContSubstate::ClosePlusStep1));

    let remaining = usize::from(rig.machine.timer_ms() / config.contactor.tick_ms);
    assert_eq!(remaining, usize::from(config.contactor.precharge_time_ms));
    assert!(handle.submit(StateRequest::Standby).is_accepted());

    rig.steps(remaining - 1);
    assert_eq!(rig.machine.state(), ContState::NormalPrecharge);
    assert_eq!(rig.machine.substate(), ContSubstate::ClosePlusStep1);
    assert_eq!(handle.pending(), Some(StateRequest::Standby));

    rig.step();
    assert_eq!(rig.machine.state(), ContState::OpenContactors);
    assert_eq!(rig.machine.substate(), ContSubstate::Entry);
    assert_eq!(handle.pending(), None);

    assert!(rig.run_until(ContState::Standby, ContSubstate::Standby));
    let pins = rig.machine.bank().pins();
    for id in ContactorId::ALL {
        assert!(!pins.is_closed(id), "{id:?} still closed");
    }
    assert_eq!(rig.machine.power_line(), PowerLine::None);
}

#[test]
fn test_abandoned_pulse_is_released() {
    let config = quiet_config();
    let mut rig = Rig::in_standby(&config);
    let handle = rig.machine.request_handle();
    handle.submit(StateRequest::Normal);
    assert!(rig.run_until(ContState::NormalPrecharge, ContSubstate::ClosePlusStep2));
    assert!(rig.machine.bank().is_energized(ContactorId::MainPlus));

    handle.submit(StateRequest::Error);
    assert!(rig.run_until(ContState::Error, ContSubstate::Entry));
    assert!(!rig.machine.bank().is_energized(ContactorId::MainPlus));
    assert_eq!(rig.events().last(), Some(&close(ContactorId::MainPlus)));
}

#[test]
fn test_oscillation_guard_stalls_precharge_entry() {
    let config = BmsConfig::default();
    let mut rig = Rig::new(&config);
    let handle = rig.machine.request_handle();
    handle.submit(StateRequest::Init);
    assert!(rig.run_until(ContState::Standby, ContSubstate::Standby));

    handle.submit(StateRequest::Normal);
    rig.steps(100);
    assert_eq!(rig.machine.state(), ContState::NormalPrecharge);
    assert_eq!(rig.machine.substate(), ContSubstate::Entry);
    assert!(rig.machine.oscillation_counter() > 0);

    assert!(rig.run_until(ContState::Normal, ContSubstate::Standby));
}

#[test]
fn test_open_only_guard_lets_precharge_start() {
    let mut config = BmsConfig::default();
    config.oscillation_guard = OscillationGuardScope::OpenOnly;
    let mut rig = Rig::new(&config);
    let handle = rig.machine.request_handle();
    handle.submit(StateRequest::Init);
    assert!(rig.run_until(ContState::Standby, ContSubstate::Standby));

    handle.submit(StateRequest::Normal);
    rig.steps(3);
    assert_eq!(rig.machine.state(), ContState::NormalPrecharge);
    assert_ne!(rig.machine.substate(), ContSubstate::Entry);
}

#[test]
fn test_overlapping_trigger_reports_busy() {
    let config = quiet_config();
    let store = MemoryStore::new();
    let mut diag = DiagRecorder::new();
    let control = ContactorControl::new(ContactorStateMachine::new(SimulatedPins::new(), &config));

    let outcome = control.with_machine(|_| control.trigger(&store, &mut diag));
    assert_eq!(outcome, TriggerOutcome::Busy);
    assert_eq!(control.busy_count(), 1);

    assert_eq!(control.trigger(&store, &mut diag), TriggerOutcome::Stepped);
    control.with_machine(|m| assert_eq!(m.cycle_counter(), 1));
}
