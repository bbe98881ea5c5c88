//! # BMS Core
//!
//! The safety-relevant control core of a battery management system: the
//! contactor sequencing state machine that connects the high-voltage pack to
//! its power lines, and the CAN signal codec that moves pack telemetry and
//! commands across the bus.
//!
//! ## Features
//!
//! - **Contactor sequencing**: precharge, open and error sequences driven by a
//!   pure transition table with tick-resolution dwell timers
//! - **Latching and level contactors**: two-phase pulse actuation with
//!   feedback verification and switch-off-under-load diagnostics
//! - **Signal codec**: bit-exact packing with clamp-before-scale encoding,
//!   per-message store snapshots and module cursors for per-module groups
//! - **Embedded-friendly**: fixed-capacity buffers on every cyclic path
//!
//! ## Quick Start
//!
//! ```rust
//! use bmscore::config::BmsConfig;
//! use bmscore::contactor::{ContState, ContactorStateMachine, SimulatedPins, StateRequest};
//! use bmscore::diag::DiagRecorder;
//! use bmscore::store::MemoryStore;
//!
//! let config = BmsConfig::default();
//! let store = MemoryStore::new();
//! let mut diag = DiagRecorder::new();
//! let mut machine = ContactorStateMachine::new(SimulatedPins::new(), &config);
//!
//! let handle = machine.request_handle();
//! assert!(handle.submit(StateRequest::Init).is_accepted());
//!
//! for _ in 0..50 {
//!     machine.trigger(&store, &mut diag);
//! }
//! assert_eq!(machine.state(), ContState::Standby);
//! ```
//!
//! ## Architecture
//!
//! - [`contactor`] - State machine, actuation primitives and checks
//! - [`can`] - Signal tables and the encode/decode transactions
//! - [`store`] - Keyed snapshot storage shared by both
//! - [`diag`] - Diagnostic reporting seam
//! - [`config`] - Timing, limits and codec configuration

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::float_cmp)]

pub mod can;
pub mod config;
pub mod contactor;
pub mod diag;
pub mod store;

pub use can::{CanFrame, RxCodec, TxCodec};
pub use config::BmsConfig;
pub use contactor::{ContState, ContSubstate, ContactorControl, ContactorStateMachine, StateRequest};
pub use diag::{DiagRecorder, DiagReporter};
pub use store::{MemoryStore, Store};
