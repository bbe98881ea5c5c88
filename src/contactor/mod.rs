//! Contactor sequencing.
//!
//! [`ContactorBank`] owns the actuation primitives, [`transition`] holds the
//! pure state table and [`ContactorStateMachine`] runs it once per tick.

pub mod bank;
pub mod checks;
pub mod machine;
pub mod sim;
pub mod state;
pub mod transition;

pub use bank::ContactorBank;
pub use checks::{check_fuse, check_precharge, FuseState};
pub use machine::{ContactorControl, ContactorStateMachine, RequestHandle, TriggerOutcome};
pub use sim::SimulatedPins;
pub use state::{check_request, ContState, ContSubstate, PowerLine, RequestOutcome, StateRequest};

use serde::{Deserialize, Serialize};

pub const CONTACTOR_COUNT: usize = 4;

/// Contactors with a feedback line. The discriminant is the bit position in
/// the feedback bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContactorId {
    MainPlus = 0,
    Precharge = 1,
    MainMinus = 2,
    Engine = 3,
}

impl ContactorId {
    pub const ALL: [ContactorId; CONTACTOR_COUNT] = [
        ContactorId::MainPlus,
        ContactorId::Precharge,
        ContactorId::MainMinus,
        ContactorId::Engine,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn feedback_bit(self) -> u16 {
        1 << (self as u16)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SwitchState {
    On,
    Off,
    #[default]
    Undefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Close,
    Open,
}

impl Direction {
    pub const fn target(self) -> SwitchState {
        match self {
            Direction::Close => SwitchState::On,
            Direction::Open => SwitchState::Off,
        }
    }
}

pub type PinId = u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinLevel {
    Set,
    Reset,
}

/// Digital I/O used to drive coils and sample feedback contacts.
pub trait PinIo {
    fn write_pin(&mut self, pin: PinId, level: PinLevel);
    fn read_pin(&self, pin: PinId) -> PinLevel;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackWiring {
    /// No feedback contact; the set value is taken as feedback.
    None,
    /// Contact closes with the contactor and pulls the line low.
    NormallyOpen,
    NormallyClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Actuation {
    /// Bistable contactor switched by a pulse on one of two coils.
    Latching { close_pin: PinId, open_pin: PinId },
    /// Coil held for as long as the contactor stays closed.
    Level { pin: PinId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactorConfig {
    pub id: ContactorId,
    pub actuation: Actuation,
    pub feedback_pin: PinId,
    pub wiring: FeedbackWiring,
}

impl ContactorConfig {
    pub const fn is_latching(&self) -> bool {
        matches!(self.actuation, Actuation::Latching { .. })
    }
}

/// Pin map of the reference pack, indexed by [`ContactorId`].
pub const DEFAULT_CONTACTORS: [ContactorConfig; CONTACTOR_COUNT] = [
    ContactorConfig {
        id: ContactorId::MainPlus,
        actuation: Actuation::Latching { close_pin: 0, open_pin: 1 },
        feedback_pin: 10,
        wiring: FeedbackWiring::NormallyOpen,
    },
    ContactorConfig {
        id: ContactorId::Precharge,
        actuation: Actuation::Level { pin: 2 },
        feedback_pin: 11,
        wiring: FeedbackWiring::NormallyOpen,
    },
    ContactorConfig {
        id: ContactorId::MainMinus,
        actuation: Actuation::Latching { close_pin: 3, open_pin: 4 },
        feedback_pin: 12,
        wiring: FeedbackWiring::NormallyOpen,
    },
    ContactorConfig {
        id: ContactorId::Engine,
        actuation: Actuation::Level { pin: 5 },
        feedback_pin: 13,
        wiring: FeedbackWiring::NormallyOpen,
    },
];
