use serde::{Deserialize, Serialize};
use crate::drivers::GeneratorError;
/// Physical quantity a value belongs to. Base units are Hz, s and V.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    Frequency,
    Time,
    Voltage,
}
/// One rung of a unit ladder.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UnitStep {
    pub symbol: &'static str,
    pub multiplier: f64,
}
const FREQUENCY_LADDER: [UnitStep; 5] = [
    UnitStep { symbol: "µHz", multiplier: 1e-6 },
    UnitStep { symbol: "mHz", multiplier: 1e-3 },
    UnitStep { symbol: "Hz", multiplier: 1.0 },
    UnitStep { symbol: "kHz", multiplier: 1e3 },
    UnitStep { symbol: "MHz", multiplier: 1e6 },
];
const TIME_LADDER: [UnitStep; 5] = [
    UnitStep { symbol: "ps", multiplier: 1e-12 },
    UnitStep { symbol: "ns", multiplier: 1e-9 },
    UnitStep { symbol: "µs", multiplier: 1e-6 },
    UnitStep { symbol: "ms", multiplier: 1e-3 },
    UnitStep { symbol: "s", multiplier: 1.0 },
];
const VOLTAGE_LADDER: [UnitStep; 3] = [
    UnitStep { symbol: "µV", multiplier: 1e-6 },
    UnitStep { symbol: "mV", multiplier: 1e-3 },
    UnitStep { symbol: "V", multiplier: 1.0 },
];
/// Displayed magnitudes inside `[DISPLAY_MIN, DISPLAY_MAX)` need no re-ranging.
pub const DISPLAY_MIN: f64 = 0.1;
pub const DISPLAY_MAX: f64 = 9999.0;
/// Upper bound on rendered decimals; float noise lives below it.
const MAX_DECIMALS: usize = 9;
impl Kind {
    /// Units ordered from smallest to largest multiplier.
    pub fn ladder(self) -> &'static [UnitStep] {
        match self {
            Kind::Frequency => &FREQUENCY_LADDER,
            Kind::Time => &TIME_LADDER,
            Kind::Voltage => &VOLTAGE_LADDER,
        }
    }
    pub fn base_unit(self) -> &'static str {
        match self {
            Kind::Frequency => "Hz",
            Kind::Time => "s",
            Kind::Voltage => "V",
        }
    }
    pub fn symbols(self) -> impl Iterator<Item = &'static str> {
        self.ladder().iter().map(|step| step.symbol)
    }
}
/// Finds `unit` in the ladder of `kind`. `u` and the Greek mu are accepted for `µ`.
pub fn lookup(unit: &str, kind: Kind) -> Option<&'static UnitStep> {
    let unit = unit.trim();
    let normalized = match unit.chars().next() {
        Some('u') | Some('μ') if unit.chars().count() > 1 => {
            let rest: String = unit.chars().skip(1).collect();
            format!("µ{rest}")
        }
        _ => unit.to_string(),
    };
    kind.ladder().iter().find(|step| step.symbol == normalized)
}
pub fn to_base(value: f64, unit: &str, kind: Kind) -> Result<f64, GeneratorError> {
    let step = lookup(unit, kind).ok_or_else(|| GeneratorError::InvalidUnit {
        unit: unit.to_string(),
        kind,
    })?;
    Ok(value * step.multiplier)
}
/// Inverse of [`to_base`]. A unit outside the ladder is treated as the base unit.
pub fn from_base(base_value: f64, unit: &str, kind: Kind) -> f64 {
    let multiplier = lookup(unit, kind).map(|step| step.multiplier).unwrap_or(1.0);
    base_value / multiplier
}
fn displayable(value: f64) -> bool {
    let magnitude = value.abs();
    (DISPLAY_MIN..DISPLAY_MAX).contains(&magnitude)
}
/// Auto-ranges `base_value` for display.
///
/// Keeps `current_unit` while it still yields a magnitude in `[0.1, 9999)`,
/// otherwise picks the first ladder unit (smallest first) that does. Values
/// outside the ladder's total range land on the first or last unit. Zero has no
/// "nice" unit at all, so it stays in `current_unit` when that unit is valid.
pub fn select_display_unit(base_value: f64, kind: Kind, current_unit: &str) -> (&'static str, f64) {
    let ladder = kind.ladder();
    let current = lookup(current_unit, kind);
    if let Some(step) = current {
        let shown = base_value / step.multiplier;
        if displayable(shown) || base_value == 0.0 {
            return (step.symbol, shown);
        }
    }
    if let Some(step) = ladder
        .iter()
        .find(|step| displayable(base_value / step.multiplier))
    {
        return (step.symbol, base_value / step.multiplier);
    }
    let first = &ladder[0];
    let last = &ladder[ladder.len() - 1];
    if (base_value / first.multiplier).abs() < DISPLAY_MIN {
        (first.symbol, base_value / first.multiplier)
    } else {
        (last.symbol, base_value / last.multiplier)
    }
}
/// Renders `value` with every significant decimal but never fewer than `min_decimals`.
pub fn format_min_decimals(value: f64, min_decimals: usize) -> String {
    let mut text = format!("{:.*}", MAX_DECIMALS.max(min_decimals), value);
    if let Some(dot) = text.find('.') {
        let keep = dot + 1 + min_decimals;
        while text.len() > keep && text.ends_with('0') {
            text.pop();
        }
        if text.ends_with('.') {
            text.pop();
        }
    }
    if text.starts_with('-') && text[1..].chars().all(|c| c == '0' || c == '.') {
        text.remove(0);
    }
    text
}
/// Parses a finite unitless number (degrees, percent).
pub fn parse_number(text: &str) -> Result<f64, GeneratorError> {
    match text.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(GeneratorError::Unparsable(text.to_string())),
    }
}
/// Parses user text entered in `unit` into the base unit of `kind`.
pub fn parse_quantity(text: &str, unit: &str, kind: Kind) -> Result<f64, GeneratorError> {
    to_base(parse_number(text)?, unit, kind)
}
/// A transient (unit, value) pair derived from a base value for one field.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayValue {
    pub unit: &'static str,
    pub value: f64,
    pub text: String,
}
pub fn present(base_value: f64, kind: Kind, current_unit: &str, min_decimals: usize) -> DisplayValue {
    let (unit, value) = select_display_unit(base_value, kind, current_unit);
    DisplayValue {
        unit,
        value,
        text: format_min_decimals(value, min_decimals),
    }
}
/// How an amplitude is expressed. The device always receives peak-to-peak.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AmplitudeMode {
    #[default]
    Vpp,
    Vrms,
}
impl AmplitudeMode {
    pub fn factor(self) -> f64 {
        match self {
            AmplitudeMode::Vpp => 1.0,
            AmplitudeMode::Vrms => 1.0 / (2.0 * std::f64::consts::SQRT_2),
        }
    }
    pub fn label(self) -> &'static str {
        match self {
            AmplitudeMode::Vpp => "Vpp",
            AmplitudeMode::Vrms => "Vrms",
        }
    }
    pub fn to_vpp(self, value: f64) -> f64 {
        value / self.factor()
    }
    pub fn from_vpp(self, vpp: f64) -> f64 {
        vpp * self.factor()
    }
}
