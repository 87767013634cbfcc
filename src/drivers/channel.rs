use std::collections::HashMap;
use log::{info, warn};
use crate::drivers::dual_tone::{DualToneMode, DualToneModel};
use crate::drivers::harmonics::{orders, HarmonicAmplitudeMode, HarmonicState, HarmonicStateManager};
use crate::drivers::pulse::{ClampedWidth, PulseTimingState, RateMode, RateState};
use crate::drivers::scpi::ScpiCommands;
use crate::drivers::transport::{DeviceTransport, Pacer};
use crate::drivers::units::{self, AmplitudeMode, DisplayValue, Kind};
use crate::drivers::GeneratorError;
use crate::types::{ChannelId, WaveformFamily};
const RATE_DECIMALS: usize = 3;
const VOLT_DECIMALS: usize = 3;
const ANGLE_DECIMALS: usize = 1;
const PERCENT_DECIMALS: usize = 1;
const HARMONIC_VOLT_DECIMALS: usize = 1;
/// Fields that carry their own sticky display unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Field {
    Rate,
    DerivedRate,
    Amplitude,
    Offset,
    Width,
    Rise,
    Fall,
    ToneA,
    ToneB,
}
#[derive(Clone, Debug, PartialEq)]
pub struct PulseView {
    pub width: DisplayValue,
    pub rise_time: DisplayValue,
    pub fall_time: DisplayValue,
}
#[derive(Clone, Debug, PartialEq)]
pub struct DualToneView {
    pub mode: DualToneMode,
    /// F1/F2 in direct mode, center/offset otherwise.
    pub first: DisplayValue,
    pub second: DisplayValue,
}
#[derive(Clone, Debug, PartialEq)]
pub struct HarmonicView {
    pub enabled: bool,
    pub mode: HarmonicAmplitudeMode,
    pub orders: [bool; 7],
    /// Amplitude text per order in the current mode (percent or volts).
    pub amplitude_text: [String; 7],
    pub phase_text: [String; 7],
    pub volts: [f64; 7],
    pub phases: [f64; 7],
}
/// Display-ready state of one channel.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelSnapshot {
    pub channel: ChannelId,
    pub waveform: WaveformFamily,
    pub rate_mode: RateMode,
    pub rate: DisplayValue,
    pub derived_rate: Option<DisplayValue>,
    pub frequency_hz: f64,
    pub amplitude_mode: AmplitudeMode,
    pub amplitude: DisplayValue,
    pub amplitude_vpp: f64,
    pub offset: DisplayValue,
    pub phase: String,
    pub pulse: PulseView,
    pub dual_tone: DualToneView,
    pub harmonics: HarmonicView,
}
/// Everything known about one output channel, plus the setters that keep the
/// device in step with it.
pub struct ChannelSession {
    channel: ChannelId,
    scpi: ScpiCommands,
    waveform: WaveformFamily,
    rate: RateState,
    amplitude_mode: AmplitudeMode,
    amplitude_vpp: f64,
    offset: f64,
    phase: f64,
    pulse: PulseTimingState,
    dual_tone: DualToneModel,
    harmonics: HarmonicStateManager,
    display_units: HashMap<Field, &'static str>,
    notes: Vec<String>,
}
impl ChannelSession {
    pub fn new(channel: ChannelId) -> Self {
        let amplitude_vpp = 1.0;
        Self {
            channel,
            scpi: ScpiCommands::new(channel),
            waveform: WaveformFamily::Sine,
            rate: RateState::default(),
            amplitude_mode: AmplitudeMode::Vpp,
            amplitude_vpp,
            offset: 0.0,
            phase: 0.0,
            pulse: PulseTimingState::default(),
            dual_tone: DualToneModel::default(),
            harmonics: HarmonicStateManager::new(channel, amplitude_vpp),
            display_units: HashMap::new(),
            notes: Vec::new(),
        }
    }
    #[cfg(test)]
    pub fn waveform(&self) -> WaveformFamily {
        self.waveform
    }
    #[cfg(test)]
    pub fn rate(&self) -> &RateState {
        &self.rate
    }
    #[cfg(test)]
    pub fn pulse(&self) -> &PulseTimingState {
        &self.pulse
    }
    #[cfg(test)]
    pub fn dual_tone(&self) -> &DualToneModel {
        &self.dual_tone
    }
    #[cfg(test)]
    pub fn harmonics(&self) -> &HarmonicStateManager {
        &self.harmonics
    }
    /// Diagnostics produced since the last call (clamps, fallbacks).
    pub fn take_notes(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notes)
    }
    fn note_clamp(&mut self, outcome: &ClampedWidth) {
        if let Some(diagnostic) = &outcome.diagnostic {
            warn!("{} {}", self.channel, diagnostic);
            self.notes.push(format!("{} {}", self.channel, diagnostic));
        }
    }
    /// Drops per-family session state; it is rebuilt from defaults or the device.
    fn reset_family_state(&mut self) {
        self.pulse = PulseTimingState::default();
        self.dual_tone = DualToneModel::default();
        self.harmonics = HarmonicStateManager::new(self.channel, self.amplitude_vpp);
    }
    pub fn set_waveform(
        &mut self,
        family: WaveformFamily,
        device: &mut dyn DeviceTransport,
        pacer: &Pacer,
    ) -> Result<(), GeneratorError> {
        if family == self.waveform {
            return Ok(());
        }
        if self.harmonics.state() == HarmonicState::Enabled {
            self.harmonics.disable(device, pacer)?;
        }
        self.reset_family_state();
        pacer.send(device, &self.scpi.function(family))?;
        self.waveform = family;
        info!("{} waveform -> {}", self.channel, family.label());
        match family {
            WaveformFamily::Harmonic => {
                self.harmonics.enable(device, pacer)?;
            }
            WaveformFamily::Pulse => {
                if let Ok(period) = self.rate.period() {
                    self.pulse.period = period;
                }
                self.read_pulse(device, pacer)?;
            }
            WaveformFamily::DualTone => self.read_dual_tone(device, pacer)?,
            _ => {}
        }
        Ok(())
    }
    /// Local only: chooses whether frequency or period is edited.
    pub fn set_rate_mode(&mut self, mode: RateMode) -> Result<(), GeneratorError> {
        self.rate.switch_mode(mode)
    }
    /// Sets the independent rate (Hz in frequency mode, seconds in period mode).
    pub fn set_rate(&mut self, value: f64, device: &mut dyn DeviceTransport, pacer: &Pacer) -> Result<(), GeneratorError> {
        self.rate.set_source(value)?;
        let command = match self.rate.mode() {
            RateMode::Frequency => self.scpi.frequency(value),
            RateMode::Period => self.scpi.period(value),
        };
        pacer.send(device, &command)?;
        if self.waveform == WaveformFamily::Pulse {
            self.pulse.period = self.rate.period()?;
            self.refit_pulse_width(device, pacer)?;
        }
        Ok(())
    }
    pub fn set_amplitude_mode(&mut self, mode: AmplitudeMode) {
        self.amplitude_mode = mode;
    }
    /// `value` is in the current amplitude mode; the device gets peak-to-peak.
    pub fn set_amplitude(&mut self, value: f64, device: &mut dyn DeviceTransport, pacer: &Pacer) -> Result<(), GeneratorError> {
        let vpp = self.amplitude_mode.to_vpp(value);
        pacer.send(device, &self.scpi.amplitude(vpp))?;
        self.amplitude_vpp = vpp;
        if self.harmonics.on_fundamental_changed(vpp, device, pacer)? {
            info!("{} harmonics re-applied for new fundamental", self.channel);
        }
        Ok(())
    }
    pub fn set_offset(&mut self, volts: f64, device: &mut dyn DeviceTransport, pacer: &Pacer) -> Result<(), GeneratorError> {
        pacer.send(device, &self.scpi.offset(volts))?;
        self.offset = volts;
        Ok(())
    }
    pub fn set_phase(&mut self, degrees: f64, device: &mut dyn DeviceTransport, pacer: &Pacer) -> Result<(), GeneratorError> {
        pacer.send(device, &self.scpi.phase(degrees))?;
        self.phase = degrees;
        Ok(())
    }
    pub fn set_pulse_width(&mut self, requested: f64, device: &mut dyn DeviceTransport, pacer: &Pacer) -> Result<ClampedWidth, GeneratorError> {
        let outcome = self.pulse.request_width(requested);
        self.note_clamp(&outcome);
        pacer.send(device, &self.scpi.pulse_width(outcome.width))?;
        Ok(outcome)
    }
    pub fn set_rise_time(&mut self, seconds: f64, device: &mut dyn DeviceTransport, pacer: &Pacer) -> Result<(), GeneratorError> {
        self.pulse.rise_time = seconds;
        pacer.send(device, &self.scpi.rise_time(seconds))?;
        self.refit_pulse_width(device, pacer)
    }
    pub fn set_fall_time(&mut self, seconds: f64, device: &mut dyn DeviceTransport, pacer: &Pacer) -> Result<(), GeneratorError> {
        self.pulse.fall_time = seconds;
        pacer.send(device, &self.scpi.fall_time(seconds))?;
        self.refit_pulse_width(device, pacer)
    }
    fn refit_pulse_width(&mut self, device: &mut dyn DeviceTransport, pacer: &Pacer) -> Result<(), GeneratorError> {
        let outcome = self.pulse.refit_width();
        if outcome.was_adjusted {
            self.note_clamp(&outcome);
            pacer.send(device, &self.scpi.pulse_width(outcome.width))?;
        }
        Ok(())
    }
    /// Writes the active dual-tone pair (F1/F2 or center/offset) and sends F1, F2.
    pub fn set_dual_tone(&mut self, a: f64, b: f64, device: &mut dyn DeviceTransport, pacer: &Pacer) -> Result<(), GeneratorError> {
        self.dual_tone.set_active(a, b)?;
        let pair = self.dual_tone.pair();
        pacer.send(device, &self.scpi.dual_tone_f1(pair.f1))?;
        pacer.send(device, &self.scpi.dual_tone_f2(pair.f2))
    }
    pub fn switch_dual_tone_mode(&mut self, to: DualToneMode, fields: [&str; 2], unit: &str) -> Result<(), GeneratorError> {
        self.dual_tone.switch_mode(to, fields, unit)
    }
    pub fn set_harmonics_enabled(&mut self, on: bool, device: &mut dyn DeviceTransport, pacer: &Pacer) -> Result<(), GeneratorError> {
        if on {
            let fundamental = self.harmonics.enable(device, pacer)?;
            self.absorb_fundamental(fundamental.amplitude, fundamental.frequency);
        } else {
            self.harmonics.disable(device, pacer)?;
        }
        Ok(())
    }
    fn reapply_if_enabled(&mut self, device: &mut dyn DeviceTransport, pacer: &Pacer) -> Result<(), GeneratorError> {
        if self.harmonics.state() == HarmonicState::Enabled {
            let fundamental = self.harmonics.apply_sequence(device, pacer)?;
            self.absorb_fundamental(fundamental.amplitude, fundamental.frequency);
        }
        Ok(())
    }
    fn absorb_fundamental(&mut self, amplitude: f64, frequency: f64) {
        self.amplitude_vpp = amplitude;
        if let Err(err) = self.rate.sync_from_frequency(frequency) {
            warn!("{} ignoring device frequency: {err}", self.channel);
        }
    }
    pub fn set_harmonic_order(&mut self, order: u8, on: bool, device: &mut dyn DeviceTransport, pacer: &Pacer) -> Result<(), GeneratorError> {
        self.harmonics.set_order_enabled(order, on)?;
        self.reapply_if_enabled(device, pacer)
    }
    pub fn set_harmonic_amplitude_mode(&mut self, mode: HarmonicAmplitudeMode) {
        self.harmonics.set_mode(mode);
    }
    /// `value` is a percentage or volts depending on the harmonic amplitude mode.
    pub fn set_harmonic_amplitude(&mut self, order: u8, value: f64, device: &mut dyn DeviceTransport, pacer: &Pacer) -> Result<(), GeneratorError> {
        let mode = self.harmonics.mode();
        self.harmonics.set_amplitude(order, value, mode, self.amplitude_vpp)?;
        self.reapply_if_enabled(device, pacer)
    }
    pub fn set_harmonic_phase(&mut self, order: u8, degrees: f64, device: &mut dyn DeviceTransport, pacer: &Pacer) -> Result<(), GeneratorError> {
        self.harmonics.set_phase(order, degrees)?;
        self.reapply_if_enabled(device, pacer)
    }
    pub fn apply_harmonics(&mut self, device: &mut dyn DeviceTransport, pacer: &Pacer) -> Result<(), GeneratorError> {
        let fundamental = self.harmonics.apply_sequence(device, pacer)?;
        self.absorb_fundamental(fundamental.amplitude, fundamental.frequency);
        Ok(())
    }
    fn read_pulse(&mut self, device: &mut dyn DeviceTransport, pacer: &Pacer) -> Result<(), GeneratorError> {
        self.pulse.width = pacer.query_number(device, &self.scpi.pulse_width_query())?;
        self.pulse.rise_time = pacer.query_number(device, &self.scpi.rise_time_query())?;
        self.pulse.fall_time = pacer.query_number(device, &self.scpi.fall_time_query())?;
        Ok(())
    }
    fn read_dual_tone(&mut self, device: &mut dyn DeviceTransport, pacer: &Pacer) -> Result<(), GeneratorError> {
        let f1 = pacer.query_number(device, &self.scpi.dual_tone_f1_query())?;
        let f2 = pacer.query_number(device, &self.scpi.dual_tone_f2_query())?;
        self.dual_tone.sync_from_device(f1, f2)
    }
    /// Reads every parameter of the current family back from the device.
    pub fn refresh(&mut self, device: &mut dyn DeviceTransport, pacer: &Pacer) -> Result<(), GeneratorError> {
        let reply = pacer.query(device, &self.scpi.function_query())?;
        let family = WaveformFamily::from_mnemonic(&reply)
            .ok_or_else(|| GeneratorError::Unparsable(reply.trim().to_string()))?;
        // the rate is read back in its own representation
        let rate_source = match self.rate.mode() {
            RateMode::Frequency => pacer.query_number(device, &self.scpi.frequency_query())?,
            RateMode::Period => pacer.query_number(device, &self.scpi.period_query())?,
        };
        self.amplitude_vpp = pacer.query_number(device, &self.scpi.amplitude_query())?;
        self.offset = pacer.query_number(device, &self.scpi.offset_query())?;
        self.phase = pacer.query_number(device, &self.scpi.phase_query())?;
        if let Err(err) = self.rate.set_source(rate_source) {
            warn!("{} ignoring device rate: {err}", self.channel);
        }
        self.waveform = family;
        match family {
            WaveformFamily::Sine => {
                self.harmonics.refresh(device, pacer)?;
                if self.harmonics.state() == HarmonicState::Enabled {
                    self.waveform = WaveformFamily::Harmonic;
                }
            }
            WaveformFamily::Pulse => {
                self.pulse.period = self.rate.period()?;
                self.read_pulse(device, pacer)?;
            }
            WaveformFamily::DualTone => self.read_dual_tone(device, pacer)?,
            _ => {}
        }
        Ok(())
    }
    fn show(&mut self, field: Field, base: f64, kind: Kind, decimals: usize) -> DisplayValue {
        let current = self
            .display_units
            .get(&field)
            .copied()
            .unwrap_or(kind.base_unit());
        let shown = units::present(base, kind, current, decimals);
        self.display_units.insert(field, shown.unit);
        shown
    }
    /// Builds display values, auto-ranging each field from its last unit.
    pub fn snapshot(&mut self) -> ChannelSnapshot {
        let rate_kind = match self.rate.mode() {
            RateMode::Frequency => Kind::Frequency,
            RateMode::Period => Kind::Time,
        };
        let derived_kind = match rate_kind {
            Kind::Frequency => Kind::Time,
            _ => Kind::Frequency,
        };
        let rate = self.show(Field::Rate, self.rate.source(), rate_kind, RATE_DECIMALS);
        let derived_rate = match self.rate.derived() {
            Ok(value) => Some(self.show(Field::DerivedRate, value, derived_kind, RATE_DECIMALS)),
            Err(_) => None,
        };
        let amplitude_shown = self.amplitude_mode.from_vpp(self.amplitude_vpp);
        let amplitude = self.show(Field::Amplitude, amplitude_shown, Kind::Voltage, VOLT_DECIMALS);
        let offset = self.show(Field::Offset, self.offset, Kind::Voltage, VOLT_DECIMALS);
        let pulse = self.pulse;
        let pulse = PulseView {
            width: self.show(Field::Width, pulse.width, Kind::Time, RATE_DECIMALS),
            rise_time: self.show(Field::Rise, pulse.rise_time, Kind::Time, RATE_DECIMALS),
            fall_time: self.show(Field::Fall, pulse.fall_time, Kind::Time, RATE_DECIMALS),
        };
        let (first, second) = self.dual_tone.active_values();
        let dual_tone = DualToneView {
            mode: self.dual_tone.mode(),
            first: self.show(Field::ToneA, first, Kind::Frequency, RATE_DECIMALS),
            second: self.show(Field::ToneB, second, Kind::Frequency, RATE_DECIMALS),
        };
        ChannelSnapshot {
            channel: self.channel,
            waveform: self.waveform,
            rate_mode: self.rate.mode(),
            rate,
            derived_rate,
            frequency_hz: self.rate.frequency().unwrap_or(0.0),
            amplitude_mode: self.amplitude_mode,
            amplitude,
            amplitude_vpp: self.amplitude_vpp,
            offset,
            phase: units::format_min_decimals(self.phase, ANGLE_DECIMALS),
            pulse,
            dual_tone,
            harmonics: self.harmonic_view(),
        }
    }
    fn harmonic_view(&self) -> HarmonicView {
        let manager = &self.harmonics;
        let set = manager.enabled_set();
        let mut view = HarmonicView {
            enabled: manager.state() == HarmonicState::Enabled,
            mode: manager.mode(),
            orders: [false; 7],
            amplitude_text: Default::default(),
            phase_text: Default::default(),
            volts: [0.0; 7],
            phases: [0.0; 7],
        };
        let decimals = match manager.mode() {
            HarmonicAmplitudeMode::Percentage => PERCENT_DECIMALS,
            HarmonicAmplitudeMode::Absolute => HARMONIC_VOLT_DECIMALS,
        };
        for (i, order) in orders().enumerate() {
            view.orders[i] = set.is_enabled(order);
            if let Ok(shown) = manager.displayed_amplitude(order) {
                view.amplitude_text[i] = units::format_min_decimals(shown, decimals);
            }
            if let Ok(entry) = manager.amplitude(order) {
                view.volts[i] = entry.absolute_volts;
            }
            if let Ok(phase) = manager.phase(order) {
                view.phases[i] = phase;
                view.phase_text[i] = units::format_min_decimals(phase, ANGLE_DECIMALS);
            }
        }
        view
    }
}
