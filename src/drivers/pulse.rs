//! Pulse timing feasibility and the frequency/period duality.
//!
//! The instrument only accepts a pulse width when
//! `width <= 0.9 * (period - 0.7 * (rise + fall))` and `width >= 20 ns`.
//! Out-of-range widths are clamped to the nearest bound, never rejected.
use log::warn;
use serde::{Deserialize, Serialize};
use crate::drivers::units::{self, Kind};
use crate::drivers::GeneratorError;
/// Hardware floor for the pulse width (seconds).
pub const MIN_WIDTH: f64 = 20e-9;
const WIDTH_DUTY_LIMIT: f64 = 0.9;
const EDGE_WEIGHT: f64 = 0.7;
/// Widest pulse the device accepts for the given period and edges. Can be
/// negative when the transitions eat the whole period.
pub fn max_allowed_width(period: f64, rise_time: f64, fall_time: f64) -> f64 {
    WIDTH_DUTY_LIMIT * (period - EDGE_WEIGHT * (rise_time + fall_time))
}
/// Result of fitting a requested width into the feasible window.
#[derive(Clone, Debug, PartialEq)]
pub struct ClampedWidth {
    pub width: f64,
    pub was_adjusted: bool,
    /// Human-readable reason when the request was moved.
    pub diagnostic: Option<String>,
}
fn show_time(seconds: f64) -> String {
    let shown = units::present(seconds, Kind::Time, "s", 0);
    format!("{} {}", shown.text, shown.unit)
}
pub fn clamp_width(requested: f64, period: f64, rise_time: f64, fall_time: f64) -> ClampedWidth {
    let max_width = max_allowed_width(period, rise_time, fall_time);
    if max_width < MIN_WIDTH {
        let diagnostic = format!(
            "no feasible pulse width: period {} with edges {} / {} leaves {}; using minimum {}",
            show_time(period),
            show_time(rise_time),
            show_time(fall_time),
            show_time(max_width),
            show_time(MIN_WIDTH),
        );
        warn!("{diagnostic}");
        return ClampedWidth {
            width: MIN_WIDTH,
            was_adjusted: requested != MIN_WIDTH,
            diagnostic: Some(diagnostic),
        };
    }
    if requested < MIN_WIDTH {
        return ClampedWidth {
            width: MIN_WIDTH,
            was_adjusted: true,
            diagnostic: Some(format!(
                "pulse width {} below hardware minimum, raised to {}",
                show_time(requested),
                show_time(MIN_WIDTH)
            )),
        };
    }
    if requested > max_width {
        return ClampedWidth {
            width: max_width,
            was_adjusted: true,
            diagnostic: Some(format!(
                "pulse width {} exceeds limit for period {}, reduced to {}",
                show_time(requested),
                show_time(period),
                show_time(max_width)
            )),
        };
    }
    ClampedWidth {
        width: requested,
        was_adjusted: false,
        diagnostic: None,
    }
}
/// Returns the reciprocal of a frequency or period.
pub fn derive_complementary_rate(known_value: f64, mode_is_frequency: bool) -> Result<f64, GeneratorError> {
    if known_value > 0.0 && known_value.is_finite() {
        Ok(1.0 / known_value)
    } else {
        Err(GeneratorError::NonPositiveRate {
            value: known_value,
            mode: if mode_is_frequency { "frequency" } else { "period" },
        })
    }
}
/// Which of frequency or period the user controls directly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateMode {
    #[default]
    Frequency,
    Period,
}
/// Holds exactly one independent rate value; the other is always derived.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RateState {
    mode: RateMode,
    source: f64,
}
impl Default for RateState {
    fn default() -> Self {
        Self {
            mode: RateMode::Frequency,
            source: 1000.0,
        }
    }
}
impl RateState {
    pub fn mode(&self) -> RateMode {
        self.mode
    }
    /// The independently controlled value (Hz or seconds depending on mode).
    pub fn source(&self) -> f64 {
        self.source
    }
    pub fn set_source(&mut self, value: f64) -> Result<(), GeneratorError> {
        derive_complementary_rate(value, self.mode == RateMode::Frequency)?;
        self.source = value;
        Ok(())
    }
    /// Read-only counterpart of [`Self::source`].
    pub fn derived(&self) -> Result<f64, GeneratorError> {
        derive_complementary_rate(self.source, self.mode == RateMode::Frequency)
    }
    pub fn frequency(&self) -> Result<f64, GeneratorError> {
        match self.mode {
            RateMode::Frequency => Ok(self.source),
            RateMode::Period => self.derived(),
        }
    }
    pub fn period(&self) -> Result<f64, GeneratorError> {
        match self.mode {
            RateMode::Period => Ok(self.source),
            RateMode::Frequency => self.derived(),
        }
    }
    /// Switches which side is the source; the old derived value becomes the new source.
    pub fn switch_mode(&mut self, mode: RateMode) -> Result<(), GeneratorError> {
        if mode == self.mode {
            return Ok(());
        }
        let promoted = self.derived()?;
        self.mode = mode;
        self.source = promoted;
        Ok(())
    }
    /// Updates from a frequency read back from the device, keeping the current mode.
    pub fn sync_from_frequency(&mut self, frequency: f64) -> Result<(), GeneratorError> {
        self.source = match self.mode {
            RateMode::Frequency => {
                derive_complementary_rate(frequency, true)?;
                frequency
            }
            RateMode::Period => derive_complementary_rate(frequency, true)?,
        };
        Ok(())
    }
}
/// Period, width and edge times of a pulse waveform, all in seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PulseTimingState {
    pub period: f64,
    pub width: f64,
    pub rise_time: f64,
    pub fall_time: f64,
}
impl Default for PulseTimingState {
    fn default() -> Self {
        Self {
            period: 1e-3,
            width: 5e-4,
            rise_time: 2e-8,
            fall_time: 2e-8,
        }
    }
}
impl PulseTimingState {
    /// Applies a new width request, returning the clamp outcome.
    pub fn request_width(&mut self, requested: f64) -> ClampedWidth {
        let outcome = clamp_width(requested, self.period, self.rise_time, self.fall_time);
        self.width = outcome.width;
        outcome
    }
    /// Re-fits the stored width after period or edge times moved.
    pub fn refit_width(&mut self) -> ClampedWidth {
        self.request_width(self.width)
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn wide_request_is_pulled_down_to_limit() {
        let clamped = clamp_width(9.5e-4, 1e-3, 2e-8, 2e-8);
        assert!(clamped.was_adjusted);
        assert!((clamped.width - 8.9997e-4).abs() < 1e-8);
        assert!(clamped.diagnostic.is_some());
    }
    #[test]
    fn narrow_request_is_raised_to_floor() {
        let clamped = clamp_width(1e-10, 1e-3, 2e-8, 2e-8);
        assert!(clamped.was_adjusted);
        assert_eq!(clamped.width, MIN_WIDTH);
    }
    #[test]
    fn feasible_request_passes_through() {
        let clamped = clamp_width(5e-4, 1e-3, 2e-8, 2e-8);
        assert!(!clamped.was_adjusted);
        assert_eq!(clamped.width, 5e-4);
        assert!(clamped.diagnostic.is_none());
    }
    #[test]
    fn window_of_exactly_the_minimum_is_feasible() {
        let period = MIN_WIDTH / WIDTH_DUTY_LIMIT;
        assert_eq!(max_allowed_width(period, 0.0, 0.0), MIN_WIDTH);
        let clamped = clamp_width(MIN_WIDTH, period, 0.0, 0.0);
        assert_eq!(clamped.width, MIN_WIDTH);
        assert!(!clamped.was_adjusted);
        assert!(clamped.diagnostic.is_none());
    }
    #[test]
    fn contradictory_edges_fall_back_to_minimum() {
        assert!(max_allowed_width(1e-6, 1e-6, 1e-6) < 0.0);
        let clamped = clamp_width(5e-7, 1e-6, 1e-6, 1e-6);
        assert_eq!(clamped.width, MIN_WIDTH);
        assert!(clamped.was_adjusted);
        assert!(clamped.diagnostic.unwrap().contains("no feasible"));
    }
    #[test]
    fn reciprocal_rate() {
        assert_eq!(derive_complementary_rate(1000.0, true).unwrap(), 1e-3);
        assert_eq!(derive_complementary_rate(0.5, false).unwrap(), 2.0);
        let err = derive_complementary_rate(0.0, true).unwrap_err();
        assert!(matches!(err, GeneratorError::NonPositiveRate { mode: "frequency", .. }));
        assert!(derive_complementary_rate(-1.0, false).is_err());
    }
    #[test]
    fn rate_state_keeps_one_source() {
        let mut rate = RateState::default();
        rate.set_source(2000.0).unwrap();
        assert_eq!(rate.frequency().unwrap(), 2000.0);
        assert_eq!(rate.period().unwrap(), 5e-4);
        rate.switch_mode(RateMode::Period).unwrap();
        assert_eq!(rate.mode(), RateMode::Period);
        assert_eq!(rate.source(), 5e-4);
        rate.set_source(0.01).unwrap();
        assert!((rate.frequency().unwrap() - 100.0).abs() < 1e-9);
    }
    #[test]
    fn rate_state_refuses_non_positive_source() {
        let mut rate = RateState::default();
        assert!(rate.set_source(-5.0).is_err());
        assert_eq!(rate.source(), 1000.0);
    }
    #[test]
    fn shorter_period_refits_width() {
        let mut pulse = PulseTimingState::default();
        pulse.period = 4e-4;
        let outcome = pulse.refit_width();
        assert!(outcome.was_adjusted);
        assert!(pulse.width <= max_allowed_width(4e-4, 2e-8, 2e-8));
    }
}
