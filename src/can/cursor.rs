//! Module cursors for the per-module signal groups.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CursorKind {
    Voltage,
    Temperature,
}

/// Index of the module the next cell-voltage and cell-temperature groups
/// describe. Both wrap to 0 after the last configured module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModuleCursor {
    voltage: u8,
    temperature: u8,
}

impl ModuleCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self, kind: CursorKind) -> u8 {
        match kind {
            CursorKind::Voltage => self.voltage,
            CursorKind::Temperature => self.temperature,
        }
    }

    /// Moves to the next module and returns the new position.
    pub fn advance(&mut self, kind: CursorKind, module_count: u8) -> u8 {
        let slot = match kind {
            CursorKind::Voltage => &mut self.voltage,
            CursorKind::Temperature => &mut self.temperature,
        };
        let next = slot.saturating_add(1);
        *slot = if next >= module_count { 0 } else { next };
        *slot
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
