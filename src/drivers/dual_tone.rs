//! Dual-tone frequencies, addressable as (F1, F2) or as center/offset.
//!
//! Offset is the half distance between the tones: `offset = (f2 - f1) / 2`,
//! so `f1 = center - offset` and `f2 = center + offset`.
use serde::{Deserialize, Serialize};
use crate::drivers::pulse::derive_complementary_rate;
use crate::drivers::units::{self, Kind};
use crate::drivers::GeneratorError;
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DualToneMode {
    #[default]
    Direct,
    CenterOffset,
}
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DualTonePair {
    pub f1: f64,
    pub f2: f64,
}
impl Default for DualTonePair {
    fn default() -> Self {
        Self {
            f1: 1000.0,
            f2: 2000.0,
        }
    }
}
pub fn to_center_offset(f1: f64, f2: f64) -> (f64, f64) {
    ((f1 + f2) / 2.0, (f2 - f1) / 2.0)
}
pub fn from_center_offset(center: f64, offset: f64) -> (f64, f64) {
    (center - offset, center + offset)
}
/// Both representations of one dual-tone setting; only the active one is edited.
#[derive(Clone, Debug, PartialEq)]
pub struct DualToneModel {
    mode: DualToneMode,
    pair: DualTonePair,
    center: f64,
    offset: f64,
}
impl Default for DualToneModel {
    fn default() -> Self {
        Self::new(DualTonePair::default())
    }
}
impl DualToneModel {
    pub fn new(pair: DualTonePair) -> Self {
        let (center, offset) = to_center_offset(pair.f1, pair.f2);
        Self {
            mode: DualToneMode::Direct,
            pair,
            center,
            offset,
        }
    }
    pub fn mode(&self) -> DualToneMode {
        self.mode
    }
    pub fn pair(&self) -> DualTonePair {
        self.pair
    }
    #[cfg(test)]
    pub fn center_offset(&self) -> (f64, f64) {
        (self.center, self.offset)
    }
    /// Values of the representation currently being edited.
    pub fn active_values(&self) -> (f64, f64) {
        match self.mode {
            DualToneMode::Direct => (self.pair.f1, self.pair.f2),
            DualToneMode::CenterOffset => (self.center, self.offset),
        }
    }
    /// Writes the active representation and recomputes the other one from it.
    pub fn set_active(&mut self, a: f64, b: f64) -> Result<(), GeneratorError> {
        self.store(self.mode, a, b)
    }
    fn store(&mut self, mode: DualToneMode, a: f64, b: f64) -> Result<(), GeneratorError> {
        let (f1, f2, center, offset) = match mode {
            DualToneMode::Direct => {
                let (center, offset) = to_center_offset(a, b);
                (a, b, center, offset)
            }
            DualToneMode::CenterOffset => {
                let (f1, f2) = from_center_offset(a, b);
                (f1, f2, a, b)
            }
        };
        derive_complementary_rate(f1, true)?;
        derive_complementary_rate(f2, true)?;
        self.pair = DualTonePair { f1, f2 };
        self.center = center;
        self.offset = offset;
        Ok(())
    }
    /// Switches the edited representation.
    ///
    /// `active_fields` is the text of the representation being left. It must
    /// parse, otherwise the switch fails and nothing changes. The committed
    /// values stay as they are; the target side is already derived from them.
    pub fn switch_mode(
        &mut self,
        to: DualToneMode,
        active_fields: [&str; 2],
        unit: &str,
    ) -> Result<(), GeneratorError> {
        if to == self.mode {
            return Ok(());
        }
        for field in active_fields {
            units::parse_quantity(field, unit, Kind::Frequency)?;
        }
        self.mode = to;
        Ok(())
    }
    /// Overwrites from device read-back, which is always direct frequencies.
    pub fn sync_from_device(&mut self, f1: f64, f2: f64) -> Result<(), GeneratorError> {
        self.store(DualToneMode::Direct, f1, f2)
    }
}
