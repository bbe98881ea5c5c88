use super::{
    Actuation, ContactorConfig, ContactorId, Direction, FeedbackWiring, PinIo, PinLevel,
    SwitchState, CONTACTOR_COUNT, DEFAULT_CONTACTORS,
};
use crate::diag::{DiagChannel, DiagEvent, DiagReporter};
use heapless::Vec;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContactorStatus {
    /// Last commanded state. For latching contactors this only changes when
    /// the coil pulse ends.
    pub set: SwitchState,
    pub feedback: SwitchState,
}

/// Actuation primitives for the pack's contactors.
#[derive(Debug)]
pub struct ContactorBank<P> {
    pins: P,
    config: [ContactorConfig; CONTACTOR_COUNT],
    status: [ContactorStatus; CONTACTOR_COUNT],
    energized: [Option<Direction>; CONTACTOR_COUNT],
}

impl<P: PinIo> ContactorBank<P> {
    pub fn new(pins: P) -> Self {
        Self::with_config(pins, DEFAULT_CONTACTORS)
    }

    /// `config[i]` must describe the contactor whose index is `i`.
    pub fn with_config(mut pins: P, config: [ContactorConfig; CONTACTOR_COUNT]) -> Self {
        for (index, entry) in config.iter().enumerate() {
            debug_assert_eq!(entry.id.index(), index, "contactor table out of order");
            match entry.actuation {
                Actuation::Latching { close_pin, open_pin } => {
                    pins.write_pin(close_pin, PinLevel::Reset);
                    pins.write_pin(open_pin, PinLevel::Reset);
                }
                Actuation::Level { pin } => pins.write_pin(pin, PinLevel::Reset),
            }
        }

        let status = ContactorStatus {
            set: SwitchState::Off,
            feedback: SwitchState::Undefined,
        };
        Self {
            pins,
            config,
            status: [status; CONTACTOR_COUNT],
            energized: [None; CONTACTOR_COUNT],
        }
    }

    /// First phase of a switch. Latching contactors get their coil asserted;
    /// level contactors switch immediately.
    pub fn begin_switch(&mut self, id: ContactorId, direction: Direction) {
        let index = id.index();
        match self.config[index].actuation {
            Actuation::Latching { close_pin, open_pin } => {
                let coil = match direction {
                    Direction::Close => close_pin,
                    Direction::Open => open_pin,
                };
                self.pins.write_pin(coil, PinLevel::Set);
                self.energized[index] = Some(direction);
                debug!(?id, ?direction, "coil pulse started");
            }
            Actuation::Level { pin } => {
                self.pins.write_pin(pin, level_for(direction));
                self.status[index].set = direction.target();
                debug!(?id, ?direction, "level switched");
            }
        }
    }

    /// Second phase of a switch: ends the coil pulse and records the new set
    /// value. Returns the completed direction, or `None` if no pulse was
    /// running.
    pub fn complete_switch(&mut self, id: ContactorId) -> Option<Direction> {
        let index = id.index();
        let direction = self.energized[index].take()?;
        if let Actuation::Latching { close_pin, open_pin } = self.config[index].actuation {
            let coil = match direction {
                Direction::Close => close_pin,
                Direction::Open => open_pin,
            };
            self.pins.write_pin(coil, PinLevel::Reset);
        }
        self.status[index].set = direction.target();
        debug!(?id, ?direction, "coil pulse ended");
        Some(direction)
    }

    /// Single-call switch for level-held contactors.
    pub fn set_level(&mut self, id: ContactorId, direction: Direction) {
        self.begin_switch(id, direction);
        self.complete_switch(id);
    }

    /// Ends every running coil pulse and returns what was completed.
    pub fn release_coils(&mut self) -> Vec<(ContactorId, Direction), CONTACTOR_COUNT> {
        let mut released = Vec::new();
        for id in ContactorId::ALL {
            if let Some(direction) = self.complete_switch(id) {
                let _ = released.push((id, direction));
            }
        }
        released
    }

    pub fn read_feedback(&mut self, id: ContactorId) -> SwitchState {
        let index = id.index();
        let config = self.config[index];
        let feedback = match config.wiring {
            FeedbackWiring::None => self.status[index].set,
            FeedbackWiring::NormallyOpen => match self.pins.read_pin(config.feedback_pin) {
                PinLevel::Reset => SwitchState::On,
                PinLevel::Set => SwitchState::Off,
            },
            FeedbackWiring::NormallyClosed => match self.pins.read_pin(config.feedback_pin) {
                PinLevel::Set => SwitchState::On,
                PinLevel::Reset => SwitchState::Off,
            },
        };
        self.status[index].feedback = feedback;
        feedback
    }

    /// Samples every feedback line, reports each contactor as OK or NOK
    /// against its set value and returns the feedback bitmap.
    pub fn check_feedback<D: DiagReporter>(&mut self, diag: &mut D, timestamp_ms: u32) -> u16 {
        for id in ContactorId::ALL {
            let feedback = self.read_feedback(id);
            let event = if feedback == self.status[id.index()].set {
                DiagEvent::Ok
            } else {
                DiagEvent::Nok
            };
            diag.report(DiagChannel::ContactorFeedback(id), event, timestamp_ms);
        }
        self.feedback_bitmap()
    }

    pub fn feedback_bitmap(&self) -> u16 {
        ContactorId::ALL
            .iter()
            .filter(|id| self.status[id.index()].feedback == SwitchState::On)
            .fold(0, |bitmap, id| bitmap | id.feedback_bit())
    }

    pub fn status(&self, id: ContactorId) -> ContactorStatus {
        self.status[id.index()]
    }

    pub fn set_value(&self, id: ContactorId) -> SwitchState {
        self.status[id.index()].set
    }

    pub fn is_energized(&self, id: ContactorId) -> bool {
        self.energized[id.index()].is_some()
    }

    pub fn config(&self, id: ContactorId) -> &ContactorConfig {
        &self.config[id.index()]
    }

    pub fn pins(&self) -> &P {
        &self.pins
    }

    pub fn pins_mut(&mut self) -> &mut P {
        &mut self.pins
    }
}

const fn level_for(direction: Direction) -> PinLevel {
    match direction {
        Direction::Close => PinLevel::Set,
        Direction::Open => PinLevel::Reset,
    }
}
