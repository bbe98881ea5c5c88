//! Pin-level model of the contactor hardware for tests and the simulator.

use super::{
    Actuation, ContactorConfig, ContactorId, Direction, FeedbackWiring, PinId, PinIo, PinLevel,
    SwitchState, CONTACTOR_COUNT, DEFAULT_CONTACTORS,
};
use heapless::Vec;
use serde::{Deserialize, Serialize};

const MAX_PINS: usize = 32;
/// Oldest movements are dropped once the log is full.
pub const MAX_SWITCH_EVENTS: usize = 32;

/// A contactor movement seen by the model, in the order it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchEvent {
    pub contactor: ContactorId,
    pub direction: Direction,
}

/// Latching contactors move when their coil pulse ends; level contactors
/// follow their drive pin immediately. Feedback can be forced to model a
/// welded or stuck contact.
#[derive(Debug, Clone)]
pub struct SimulatedPins {
    config: [ContactorConfig; CONTACTOR_COUNT],
    outputs: [PinLevel; MAX_PINS],
    closed: [bool; CONTACTOR_COUNT],
    forced_feedback: [Option<SwitchState>; CONTACTOR_COUNT],
    events: Vec<SwitchEvent, MAX_SWITCH_EVENTS>,
}

impl Default for SimulatedPins {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPins {
    pub fn new() -> Self {
        Self::with_config(DEFAULT_CONTACTORS)
    }

    pub fn with_config(config: [ContactorConfig; CONTACTOR_COUNT]) -> Self {
        Self {
            config,
            outputs: [PinLevel::Reset; MAX_PINS],
            closed: [false; CONTACTOR_COUNT],
            forced_feedback: [None; CONTACTOR_COUNT],
            events: Vec::new(),
        }
    }

    /// Pins the feedback line to `state` until cleared with `None`.
    pub fn force_feedback(&mut self, id: ContactorId, state: Option<SwitchState>) {
        self.forced_feedback[id.index()] = state;
    }

    pub fn is_closed(&self, id: ContactorId) -> bool {
        self.closed[id.index()]
    }

    pub fn output(&self, pin: PinId) -> PinLevel {
        self.outputs.get(usize::from(pin)).copied().unwrap_or(PinLevel::Reset)
    }

    pub fn events(&self) -> &[SwitchEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    fn move_contactor(&mut self, id: ContactorId, closed: bool) {
        if self.closed[id.index()] == closed {
            return;
        }
        self.closed[id.index()] = closed;
        if self.events.is_full() {
            self.events.remove(0);
        }
        let _ = self.events.push(SwitchEvent {
            contactor: id,
            direction: if closed { Direction::Close } else { Direction::Open },
        });
    }
}

impl PinIo for SimulatedPins {
    fn write_pin(&mut self, pin: PinId, level: PinLevel) {
        let Some(slot) = self.outputs.get_mut(usize::from(pin)) else {
            return;
        };
        let previous = *slot;
        *slot = level;

        for entry in self.config {
            match entry.actuation {
                Actuation::Latching { close_pin, open_pin } => {
                    let falling = previous == PinLevel::Set && level == PinLevel::Reset;
                    if falling && pin == close_pin {
                        self.move_contactor(entry.id, true);
                    } else if falling && pin == open_pin {
                        self.move_contactor(entry.id, false);
                    }
                }
                Actuation::Level { pin: drive } if drive == pin => {
                    self.move_contactor(entry.id, level == PinLevel::Set);
                }
                Actuation::Level { .. } => {}
            }
        }
    }

    fn read_pin(&self, pin: PinId) -> PinLevel {
        let Some(entry) = self.config.iter().find(|c| c.feedback_pin == pin) else {
            return self.output(pin);
        };
        let state = self.forced_feedback[entry.id.index()].unwrap_or(if self.closed[entry.id.index()] {
            SwitchState::On
        } else {
            SwitchState::Off
        });
        match (entry.wiring, state) {
            (FeedbackWiring::NormallyClosed, SwitchState::On)
            | (FeedbackWiring::NormallyOpen | FeedbackWiring::None, SwitchState::Off | SwitchState::Undefined) => {
                PinLevel::Set
            }
            _ => PinLevel::Reset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latching_contactor_moves_on_pulse_end() {
        let mut pins = SimulatedPins::new();
        pins.write_pin(0, PinLevel::Set);
        assert!(!pins.is_closed(ContactorId::MainPlus));
        pins.write_pin(0, PinLevel::Reset);
        assert!(pins.is_closed(ContactorId::MainPlus));
        // normally-open feedback pulls low when closed
        assert_eq!(pins.read_pin(10), PinLevel::Reset);

        pins.write_pin(1, PinLevel::Set);
        pins.write_pin(1, PinLevel::Reset);
        assert!(!pins.is_closed(ContactorId::MainPlus));
        assert_eq!(pins.read_pin(10), PinLevel::Set);
        assert_eq!(pins.events().len(), 2);
    }

    #[test]
    fn test_forced_feedback_overrides_model() {
        let mut pins = SimulatedPins::new();
        pins.write_pin(2, PinLevel::Set);
        assert!(pins.is_closed(ContactorId::Precharge));
        pins.force_feedback(ContactorId::Precharge, Some(SwitchState::Off));
        assert_eq!(pins.read_pin(11), PinLevel::Set);
        pins.force_feedback(ContactorId::Precharge, None);
        assert_eq!(pins.read_pin(11), PinLevel::Reset);
    }

    #[test]
    fn test_event_log_keeps_latest_movements() {
        let mut pins = SimulatedPins::new();
        for _ in 0..MAX_SWITCH_EVENTS {
            pins.write_pin(2, PinLevel::Set);
            pins.write_pin(2, PinLevel::Reset);
        }
        pins.write_pin(5, PinLevel::Set);

        let events = pins.events();
        assert_eq!(events.len(), MAX_SWITCH_EVENTS);
        assert_eq!(
            events.last(),
            Some(&SwitchEvent { contactor: ContactorId::Engine, direction: Direction::Close })
        );
        assert_eq!(events[0].contactor, ContactorId::Precharge);
    }
}
