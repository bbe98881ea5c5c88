//! Electrical plausibility checks around the precharge path.
//!
//! Both checks read the current-sensor block; neither drives a transition.
//! The caller decides what to do with the result.

use super::state::PowerLine;
use super::ContactorId;
use crate::config::ContactorLimits;
use crate::diag::{DiagChannel, DiagEvent, DiagReporter};
use crate::store::{ContactorFeedback, CurrentSensor, ErrorState, Store};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FuseState {
    Intact,
    Blown,
    /// Not enough contactors closed to measure across the fuse.
    Indeterminate,
}

/// Whether the downstream capacitance on `line` is charged: the voltage
/// across the precharge path and the pack current are both below the
/// line's thresholds.
pub fn check_precharge<S: Store>(store: &S, line: PowerLine, limits: &ContactorLimits) -> bool {
    let sensor: CurrentSensor = store.read_block();
    let current_ma = sensor.current_ma.unsigned_abs();
    let [v1, v2, v3] = sensor.voltage_mv;

    let (difference, voltage_limit, current_limit) = match line {
        PowerLine::Line0 => (
            (v2 - v3).abs(),
            limits.precharge_voltage_threshold_mv,
            limits.precharge_current_threshold_ma,
        ),
        PowerLine::Line1 => (
            (v1 - v3).abs(),
            limits.charge_precharge_voltage_threshold_mv,
            limits.charge_precharge_current_threshold_ma,
        ),
        PowerLine::None => return false,
    };

    let done = difference < voltage_limit && i64::from(current_ma) < i64::from(current_limit);
    debug!(?line, difference, current_ma, done, "precharge check");
    done
}

/// Judges the fuse on `line` from the drop across it.
///
/// Reports on the line's fuse channel and mirrors the verdict into the
/// matching [`ErrorState`] flag. An indeterminate fuse reports OK.
pub fn check_fuse<S: Store, D: DiagReporter>(
    store: &S,
    line: PowerLine,
    limits: &ContactorLimits,
    diag: &mut D,
    timestamp_ms: u32,
) -> FuseState {
    let channel = match line {
        PowerLine::Line0 => DiagChannel::FuseNormal,
        PowerLine::Line1 => DiagChannel::FuseCharge,
        PowerLine::None => return FuseState::Indeterminate,
    };

    let feedback: ContactorFeedback = store.read_block();
    let closed = |id: ContactorId| feedback.bitmap & id.feedback_bit() != 0;
    let measurable = (closed(ContactorId::MainPlus) || closed(ContactorId::Precharge))
        && closed(ContactorId::MainMinus);

    let state = if measurable {
        let sensor: CurrentSensor = store.read_block();
        let [v1, v2, v3] = sensor.voltage_mv;
        let drop = match line {
            PowerLine::Line1 => (v1 - v3).abs(),
            _ => (v1 - v2).abs(),
        };
        if drop > limits.max_voltage_drop_over_fuse_mv {
            FuseState::Blown
        } else {
            FuseState::Intact
        }
    } else {
        FuseState::Indeterminate
    };

    let blown = state == FuseState::Blown;
    let event = if blown { DiagEvent::Nok } else { DiagEvent::Ok };
    diag.report(channel, event, timestamp_ms);

    let mut errors: ErrorState = store.read_block();
    match line {
        PowerLine::Line1 => errors.fuse_state_charge = blown,
        _ => errors.fuse_state_normal = blown,
    }
    store.write_block(&errors);

    state
}
