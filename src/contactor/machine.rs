//! Cyclic driver of the contactor sequences.
//!
//! [`ContactorStateMachine::trigger`] is called once per tick. It checks
//! feedback, runs the timers and, once the current dwell has elapsed, applies
//! one step of the transition table. Requests reach the machine through a
//! [`RequestHandle`], which validates them against the last published state
//! and parks at most one in the pending slot.

use super::bank::ContactorBank;
use super::state::{check_request, ContState, ContSubstate, PowerLine, RequestOutcome, StateRequest};
use super::transition::{self, Action, MachineView};
use super::{ContactorId, Direction, PinIo};
use crate::config::{BmsConfig, ContactorLimits, ContactorTiming, OscillationGuardScope};
use crate::diag::{DiagChannel, DiagEvent, DiagReporter};
use crate::store::{ContactorFeedback, ContactorStateRecord, CurrentSensor, Store};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The dwell of the current step has not elapsed.
    Waiting,
    /// One step of the transition table ran.
    Stepped,
    /// Another trigger was still running; nothing happened.
    Busy,
}

#[derive(Debug)]
struct RequestSlot {
    pending: Option<StateRequest>,
    /// State as last published by the machine.
    state: ContState,
    rejected: u32,
}

/// Submits state requests to a running machine. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RequestHandle {
    slot: Arc<Mutex<RequestSlot>>,
}

impl RequestHandle {
    fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(RequestSlot {
                pending: None,
                state: ContState::Uninitialized,
                rejected: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RequestSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn submit(&self, request: StateRequest) -> RequestOutcome {
        let mut slot = self.lock();
        let outcome = check_request(slot.state, slot.pending, request);
        if outcome.is_accepted() {
            if let Some(replaced) = slot.pending.replace(request) {
                debug!(?replaced, ?request, "pending state request overwritten");
            }
            debug!(?request, "state request accepted");
        } else {
            slot.rejected = slot.rejected.saturating_add(1);
            warn!(?request, ?outcome, state = ?slot.state, "state request rejected");
        }
        outcome
    }

    /// Submits a raw request code as received from the bus.
    pub fn submit_code(&self, code: u8) -> RequestOutcome {
        match StateRequest::from_code(code) {
            Some(request) => self.submit(request),
            None => {
                let mut slot = self.lock();
                slot.rejected = slot.rejected.saturating_add(1);
                warn!(code, "unknown state request code");
                RequestOutcome::IllegalRequest
            }
        }
    }

    pub fn pending(&self) -> Option<StateRequest> {
        self.lock().pending
    }

    /// Rejected plus discarded requests since start.
    pub fn rejected_count(&self) -> u32 {
        self.lock().rejected
    }

    pub fn published_state(&self) -> ContState {
        self.lock().state
    }

    fn take(&self) -> Option<StateRequest> {
        self.lock().pending.take()
    }

    fn discard(&self, request: StateRequest, state: ContState) {
        let mut slot = self.lock();
        slot.rejected = slot.rejected.saturating_add(1);
        warn!(?request, ?state, "state request discarded");
    }

    fn publish(&self, state: ContState) {
        self.lock().state = state;
    }
}

#[derive(Debug)]
pub struct ContactorStateMachine<P> {
    bank: ContactorBank<P>,
    timing: ContactorTiming,
    limits: ContactorLimits,
    scope: OscillationGuardScope,

    state: ContState,
    substate: ContSubstate,
    last_state: ContState,
    last_substate: ContSubstate,

    timer_ms: u16,
    oscillation_counter: u16,
    precharge_tries: u8,
    precharge_timeout_ms: u16,
    cycle_counter: u32,
    power_line: PowerLine,
    init_finished: bool,

    requests: RequestHandle,
}

impl<P: PinIo> ContactorStateMachine<P> {
    pub fn new(pins: P, config: &BmsConfig) -> Self {
        Self::with_bank(ContactorBank::new(pins), config)
    }

    pub fn with_bank(bank: ContactorBank<P>, config: &BmsConfig) -> Self {
        debug_assert!(config.contactor.tick_ms > 0, "tick period must be non-zero");
        Self {
            bank,
            timing: config.contactor,
            limits: config.limits,
            scope: config.oscillation_guard,
            state: ContState::Uninitialized,
            substate: ContSubstate::Entry,
            last_state: ContState::Uninitialized,
            last_substate: ContSubstate::Entry,
            timer_ms: 0,
            oscillation_counter: 0,
            precharge_tries: 0,
            precharge_timeout_ms: 0,
            cycle_counter: 0,
            power_line: PowerLine::None,
            init_finished: false,
            requests: RequestHandle::new(),
        }
    }

    /// Advances the machine by one tick.
    pub fn trigger<S: Store, D: DiagReporter>(&mut self, store: &S, diag: &mut D) -> TriggerOutcome {
        let now = self.timestamp_ms();

        if self.state != ContState::Uninitialized {
            let bitmap = self.bank.check_feedback(diag, now);
            let previous: ContactorFeedback = store.read_block();
            store.write_block(&ContactorFeedback {
                bitmap,
                timestamp_ms: now,
                previous_timestamp_ms: previous.timestamp_ms,
            });
        }

        let tick = self.timing.tick_ms;
        self.oscillation_counter = self.oscillation_counter.saturating_sub(1);
        self.precharge_timeout_ms = self.precharge_timeout_ms.saturating_sub(tick);

        if self.timer_ms > 0 {
            self.timer_ms = self.timer_ms.saturating_sub(tick);
            if self.timer_ms > 0 {
                self.cycle_counter = self.cycle_counter.wrapping_add(1);
                return TriggerOutcome::Waiting;
            }
        }

        let request = if transition::consumes_requests(self.state, self.substate) {
            self.requests.take()
        } else {
            None
        };

        let view = MachineView {
            state: self.state,
            substate: self.substate,
            oscillation_active: self.oscillation_counter > 0,
        };
        let step = transition::next(&view, request, self.scope);
        self.apply(&step.actions, store, diag, now);

        self.state = step.state;
        self.substate = step.substate;
        self.timer_ms = step.dwell.millis(&self.timing);
        self.log_changes();

        store.write_block(&ContactorStateRecord {
            state: self.state,
            substate: self.substate,
        });
        self.requests.publish(self.state);
        self.cycle_counter = self.cycle_counter.wrapping_add(1);
        TriggerOutcome::Stepped
    }

    fn apply<S: Store, D: DiagReporter>(&mut self, actions: &[Action], store: &S, diag: &mut D, now: u32) {
        for &action in actions {
            match action {
                Action::BeginSwitch(id, direction) => self.bank.begin_switch(id, direction),
                Action::CompleteSwitch(id) => {
                    if self.bank.complete_switch(id) == Some(Direction::Open) {
                        self.report_switch_off(id, store, diag, now);
                    }
                }
                Action::SetLevel(id, direction) => {
                    self.bank.set_level(id, direction);
                    if direction == Direction::Open {
                        self.report_switch_off(id, store, diag, now);
                    }
                }
                Action::ReleaseCoils => {
                    for (id, direction) in self.bank.release_coils() {
                        warn!(?id, ?direction, "coil released on abandoned sequence");
                        if direction == Direction::Open {
                            self.report_switch_off(id, store, diag, now);
                        }
                    }
                }
                Action::ArmOscillationGuard => self.oscillation_counter = self.timing.oscillation_limit,
                Action::ResetPrechargeTries => self.precharge_tries = 0,
                Action::CountPrechargeAttempt => {
                    self.precharge_tries = self.precharge_tries.saturating_add(1);
                    self.precharge_timeout_ms = self.timing.precharge_timeout_ms;
                }
                Action::SetPowerLine(line) => self.power_line = line,
                Action::FinishInitialization => self.init_finished = true,
                Action::Discard(request) => self.requests.discard(request, self.state),
            }
        }
    }

    fn report_switch_off<S: Store, D: DiagReporter>(&self, id: ContactorId, store: &S, diag: &mut D, now: u32) {
        let sensor: CurrentSensor = store.read_block();
        let event = switch_off_event(sensor.current_ma, &self.limits);
        if event == DiagEvent::Nok {
            warn!(?id, current_ma = sensor.current_ma, "contactor opened under load");
        }
        diag.report(DiagChannel::ContactorSwitchOff(id), event, now);
    }

    fn log_changes(&mut self) {
        if self.state != self.last_state {
            info!(from = ?self.last_state, to = ?self.state, "contactor state");
            self.last_state = self.state;
        }
        if self.substate != self.last_substate {
            debug!(state = ?self.state, substate = ?self.substate, "contactor substate");
            self.last_substate = self.substate;
        } else {
            trace!(state = ?self.state, substate = ?self.substate, "step");
        }
    }

    fn timestamp_ms(&self) -> u32 {
        self.cycle_counter.wrapping_mul(u32::from(self.timing.tick_ms))
    }

    pub fn state(&self) -> ContState {
        self.state
    }

    pub fn substate(&self) -> ContSubstate {
        self.substate
    }

    pub fn last_state(&self) -> ContState {
        self.last_state
    }

    pub fn power_line(&self) -> PowerLine {
        self.power_line
    }

    pub fn is_initialized(&self) -> bool {
        self.init_finished
    }

    pub fn oscillation_counter(&self) -> u16 {
        self.oscillation_counter
    }

    pub fn precharge_try_counter(&self) -> u8 {
        self.precharge_tries
    }

    pub fn precharge_timeout_ms(&self) -> u16 {
        self.precharge_timeout_ms
    }

    pub fn cycle_counter(&self) -> u32 {
        self.cycle_counter
    }

    pub fn timer_ms(&self) -> u16 {
        self.timer_ms
    }

    pub fn rejected_requests(&self) -> u32 {
        self.requests.rejected_count()
    }

    pub fn timing(&self) -> &ContactorTiming {
        &self.timing
    }

    pub fn bank(&self) -> &ContactorBank<P> {
        &self.bank
    }

    pub fn bank_mut(&mut self) -> &mut ContactorBank<P> {
        &mut self.bank
    }

    pub fn request_handle(&self) -> RequestHandle {
        self.requests.clone()
    }
}

fn switch_off_event(current_ma: i32, limits: &ContactorLimits) -> DiagEvent {
    let over_positive = current_ma > 0 && current_ma > limits.bad_switch_off_current_pos_ma;
    let over_negative = current_ma < 0 && current_ma < limits.bad_switch_off_current_neg_ma;
    if over_positive || over_negative {
        DiagEvent::Nok
    } else {
        DiagEvent::Ok
    }
}

/// Shared owner of a machine for callers on several tasks.
///
/// Overlapping triggers do not queue: the second one returns
/// [`TriggerOutcome::Busy`] straight away.
#[derive(Debug)]
pub struct ContactorControl<P> {
    machine: Mutex<ContactorStateMachine<P>>,
    handle: RequestHandle,
    busy: AtomicU32,
}

impl<P: PinIo> ContactorControl<P> {
    pub fn new(machine: ContactorStateMachine<P>) -> Self {
        let handle = machine.request_handle();
        Self {
            machine: Mutex::new(machine),
            handle,
            busy: AtomicU32::new(0),
        }
    }

    pub fn trigger<S: Store, D: DiagReporter>(&self, store: &S, diag: &mut D) -> TriggerOutcome {
        let mut machine = match self.machine.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                self.busy.fetch_add(1, Ordering::Relaxed);
                trace!("contactor trigger re-entered");
                return TriggerOutcome::Busy;
            }
        };
        machine.trigger(store, diag)
    }

    /// Runs `f` with exclusive access to the machine.
    pub fn with_machine<R>(&self, f: impl FnOnce(&mut ContactorStateMachine<P>) -> R) -> R {
        let mut machine = self.machine.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut machine)
    }

    pub fn handle(&self) -> RequestHandle {
        self.handle.clone()
    }

    pub fn busy_count(&self) -> u32 {
        self.busy.load(Ordering::Relaxed)
    }
}
