//! Harmonic waveform state for one channel.
//!
//! The fundamental (order 1) is always present and is not stored here. Orders
//! 2..=8 carry an enable flag, an amplitude held both in volts and as a
//! percentage of the fundamental, and a phase in degrees.
use log::{info, warn};
use serde::{Deserialize, Serialize};
use crate::drivers::scpi::{self, ScpiCommands};
use crate::drivers::transport::{DeviceTransport, Pacer};
use crate::drivers::GeneratorError;
use crate::types::ChannelId;
pub const MIN_ORDER: u8 = 2;
pub const MAX_ORDER: u8 = 8;
const SLOTS: usize = (MAX_ORDER - MIN_ORDER + 1) as usize;
/// Pattern sent to clear every harmonic before re-programming.
pub const CLEARED_PATTERN: &str = "X0000000";
fn slot(order: u8) -> Result<usize, GeneratorError> {
    if (MIN_ORDER..=MAX_ORDER).contains(&order) {
        Ok((order - MIN_ORDER) as usize)
    } else {
        Err(GeneratorError::InvalidHarmonicOrder(order))
    }
}
/// Every valid harmonic order, lowest first.
pub fn orders() -> impl Iterator<Item = u8> {
    MIN_ORDER..=MAX_ORDER
}
/// Enable flags for orders 2..=8.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HarmonicSet([bool; SLOTS]);
impl HarmonicSet {
    #[cfg(test)]
    pub fn new(flags: [bool; SLOTS]) -> Self {
        Self(flags)
    }
    pub fn is_enabled(&self, order: u8) -> bool {
        slot(order).map(|i| self.0[i]).unwrap_or(false)
    }
    pub fn set(&mut self, order: u8, on: bool) -> Result<(), GeneratorError> {
        self.0[slot(order)?] = on;
        Ok(())
    }
    /// Reads a device pattern such as `X0100001`.
    pub fn from_pattern(pattern: &str) -> Option<Self> {
        let pattern = pattern.trim().trim_matches('"');
        let mut chars = pattern.chars();
        if !matches!(chars.next(), Some('X') | Some('x')) {
            return None;
        }
        let mut flags = [false; SLOTS];
        for flag in flags.iter_mut() {
            *flag = match chars.next()? {
                '1' => true,
                '0' => false,
                _ => return None,
            };
        }
        if chars.next().is_some() {
            return None;
        }
        Some(Self(flags))
    }
}
/// `X` for the fundamental followed by one `1`/`0` per order 2..=8.
pub fn build_pattern(set: &HarmonicSet) -> String {
    std::iter::once('X')
        .chain(set.0.iter().map(|&on| if on { '1' } else { '0' }))
        .collect()
}
/// Highest enabled order; the device wants at least 2 even when none is enabled.
pub fn highest_enabled_order(set: &HarmonicSet) -> u8 {
    orders().filter(|&o| set.is_enabled(o)).max().unwrap_or(MIN_ORDER)
}
/// How harmonic amplitudes are entered and shown. Display only; the device
/// always receives volts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HarmonicAmplitudeMode {
    #[default]
    Percentage,
    Absolute,
}
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HarmonicAmplitude {
    pub absolute_volts: f64,
    pub percent_of_fundamental: f64,
}
/// Per-order amplitudes kept consistent with one live fundamental amplitude:
/// `absolute_volts == percent_of_fundamental / 100 * fundamental`.
#[derive(Clone, Debug, PartialEq)]
pub struct HarmonicAmplitudeCache {
    fundamental: f64,
    entries: [HarmonicAmplitude; SLOTS],
}
impl HarmonicAmplitudeCache {
    pub fn new(fundamental: f64) -> Self {
        Self {
            fundamental,
            entries: [HarmonicAmplitude::default(); SLOTS],
        }
    }
    pub fn fundamental(&self) -> f64 {
        self.fundamental
    }
    pub fn get(&self, order: u8) -> Result<HarmonicAmplitude, GeneratorError> {
        Ok(self.entries[slot(order)?])
    }
    fn percent_of(&self, volts: f64) -> f64 {
        // with no fundamental there is nothing to be a percentage of
        if self.fundamental > 0.0 {
            volts / self.fundamental * 100.0
        } else {
            0.0
        }
    }
    /// Writes one representation and recomputes the other.
    pub fn write(&mut self, order: u8, value: f64, mode: HarmonicAmplitudeMode) -> Result<(), GeneratorError> {
        let i = slot(order)?;
        self.entries[i] = match mode {
            HarmonicAmplitudeMode::Percentage => HarmonicAmplitude {
                absolute_volts: value / 100.0 * self.fundamental,
                percent_of_fundamental: value,
            },
            HarmonicAmplitudeMode::Absolute => HarmonicAmplitude {
                absolute_volts: value,
                percent_of_fundamental: self.percent_of(value),
            },
        };
        Ok(())
    }
    /// Moves to a new fundamental. Percentage mode keeps percentages and
    /// rescales volts; absolute mode keeps volts and rescales percentages.
    pub fn rescale(&mut self, fundamental: f64, mode: HarmonicAmplitudeMode) {
        self.fundamental = fundamental;
        for i in 0..SLOTS {
            let entry = self.entries[i];
            self.entries[i] = match mode {
                HarmonicAmplitudeMode::Percentage => HarmonicAmplitude {
                    absolute_volts: entry.percent_of_fundamental / 100.0 * fundamental,
                    ..entry
                },
                HarmonicAmplitudeMode::Absolute => HarmonicAmplitude {
                    percent_of_fundamental: self.percent_of(entry.absolute_volts),
                    ..entry
                },
            };
        }
    }
}
/// Whether harmonic output is switched on at the device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HarmonicState {
    #[default]
    Disabled,
    Enabled,
}
/// Fundamental sine parameters as last read from the device.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FundamentalSettings {
    pub frequency: f64,
    pub amplitude: f64,
    pub offset: f64,
    pub phase: f64,
}
impl Default for FundamentalSettings {
    fn default() -> Self {
        Self {
            frequency: 1000.0,
            amplitude: 1.0,
            offset: 0.0,
            phase: 0.0,
        }
    }
}
/// Owns all harmonic state of one channel and drives the apply protocol.
#[derive(Clone, Debug)]
pub struct HarmonicStateManager {
    channel: ChannelId,
    scpi: ScpiCommands,
    state: HarmonicState,
    mode: HarmonicAmplitudeMode,
    enabled: HarmonicSet,
    cache: HarmonicAmplitudeCache,
    phases: [f64; SLOTS],
}
impl HarmonicStateManager {
    pub fn new(channel: ChannelId, fundamental: f64) -> Self {
        Self {
            channel,
            scpi: ScpiCommands::new(channel),
            state: HarmonicState::Disabled,
            mode: HarmonicAmplitudeMode::Percentage,
            enabled: HarmonicSet::default(),
            cache: HarmonicAmplitudeCache::new(fundamental),
            phases: [0.0; SLOTS],
        }
    }
    pub fn state(&self) -> HarmonicState {
        self.state
    }
    pub fn mode(&self) -> HarmonicAmplitudeMode {
        self.mode
    }
    pub fn enabled_set(&self) -> HarmonicSet {
        self.enabled
    }
    /// Changes how amplitudes are displayed; nothing is sent.
    pub fn set_mode(&mut self, mode: HarmonicAmplitudeMode) {
        self.mode = mode;
    }
    pub fn set_order_enabled(&mut self, order: u8, on: bool) -> Result<(), GeneratorError> {
        self.enabled.set(order, on)
    }
    pub fn set_amplitude(
        &mut self,
        order: u8,
        value: f64,
        mode: HarmonicAmplitudeMode,
        fundamental: f64,
    ) -> Result<(), GeneratorError> {
        slot(order)?;
        if fundamental != self.cache.fundamental() {
            self.cache.rescale(fundamental, self.mode);
        }
        self.cache.write(order, value, mode)
    }
    pub fn set_phase(&mut self, order: u8, degrees: f64) -> Result<(), GeneratorError> {
        self.phases[slot(order)?] = degrees;
        Ok(())
    }
    pub fn amplitude(&self, order: u8) -> Result<HarmonicAmplitude, GeneratorError> {
        self.cache.get(order)
    }
    pub fn phase(&self, order: u8) -> Result<f64, GeneratorError> {
        Ok(self.phases[slot(order)?])
    }
    /// Amplitude of `order` in the current display mode (percent or volts).
    pub fn displayed_amplitude(&self, order: u8) -> Result<f64, GeneratorError> {
        let entry = self.cache.get(order)?;
        Ok(match self.mode {
            HarmonicAmplitudeMode::Percentage => entry.percent_of_fundamental,
            HarmonicAmplitudeMode::Absolute => entry.absolute_volts,
        })
    }
    /// Updates the cache for a new fundamental amplitude. Returns true when the
    /// volts the device holds are now stale and the apply sequence must run.
    pub fn recompute_for_new_fundamental(&mut self, new_fundamental: f64, mode: HarmonicAmplitudeMode) -> bool {
        self.cache.rescale(new_fundamental, mode);
        mode == HarmonicAmplitudeMode::Percentage
    }
    /// Reacts to a fundamental amplitude change, re-applying when enabled and needed.
    pub fn on_fundamental_changed(
        &mut self,
        new_fundamental: f64,
        device: &mut dyn DeviceTransport,
        pacer: &Pacer,
    ) -> Result<bool, GeneratorError> {
        let reapply = self.recompute_for_new_fundamental(new_fundamental, self.mode);
        if reapply && self.state == HarmonicState::Enabled {
            self.apply_sequence(device, pacer)?;
            return Ok(true);
        }
        Ok(false)
    }
    /// Programs every harmonic in the order the device requires.
    ///
    /// Each command is followed by the pacer's settling delay. A failure stops
    /// the sequence where it is; commands already issued stay issued.
    pub fn apply_sequence(
        &mut self,
        device: &mut dyn DeviceTransport,
        pacer: &Pacer,
    ) -> Result<FundamentalSettings, GeneratorError> {
        let scpi = self.scpi;
        pacer.send(device, &scpi.harmonic_pattern(CLEARED_PATTERN))?;

        let fundamental = FundamentalSettings {
            amplitude: pacer.query_number(device, &scpi.amplitude_query())?,
            frequency: pacer.query_number(device, &scpi.frequency_query())?,
            offset: pacer.query_number(device, &scpi.offset_query())?,
            phase: pacer.query_number(device, &scpi.phase_query())?,
        };
        self.cache.rescale(fundamental.amplitude, self.mode);

        for order in orders() {
            let i = slot(order)?;
            if self.enabled.is_enabled(order) {
                let volts = self.cache.get(order)?.absolute_volts;
                pacer.send(device, &scpi.harmonic_amplitude(order, volts))?;
                pacer.send(device, &scpi.harmonic_phase(order, self.phases[i]))?;
            } else {
                pacer.send(device, &scpi.harmonic_amplitude(order, 0.0))?;
            }
        }

        let pattern = build_pattern(&self.enabled);
        pacer.send(device, &scpi.harmonic_order(highest_enabled_order(&self.enabled)))?;
        pacer.send(device, &scpi.harmonic_pattern(&pattern))?;
        pacer.send(device, &scpi.harmonic_state(true))?;
        pacer.send(
            device,
            &scpi.apply_sine(
                fundamental.frequency,
                fundamental.amplitude,
                fundamental.offset,
                fundamental.phase,
            ),
        )?;
        info!("{} harmonics applied, pattern {}", self.channel, pattern);
        Ok(fundamental)
    }
    /// Disabled -> Enabled. The intended state is kept even if the sequence fails.
    pub fn enable(&mut self, device: &mut dyn DeviceTransport, pacer: &Pacer) -> Result<FundamentalSettings, GeneratorError> {
        self.state = HarmonicState::Enabled;
        self.apply_sequence(device, pacer)
    }
    /// Enabled -> Disabled.
    pub fn disable(&mut self, device: &mut dyn DeviceTransport, pacer: &Pacer) -> Result<(), GeneratorError> {
        self.state = HarmonicState::Disabled;
        pacer.send(device, &self.scpi.harmonic_state(false))
    }
    /// Rebuilds state from the device. When the enable state cannot be read,
    /// the last intended state is kept.
    pub fn refresh(&mut self, device: &mut dyn DeviceTransport, pacer: &Pacer) -> Result<(), GeneratorError> {
        let scpi = self.scpi;
        match pacer
            .query(device, &scpi.harmonic_state_query())
            .ok()
            .and_then(|reply| scpi::parse_on_off(&reply))
        {
            Some(true) => self.state = HarmonicState::Enabled,
            Some(false) => self.state = HarmonicState::Disabled,
            None => warn!(
                "{} harmonic state unreadable, keeping {:?}",
                self.channel, self.state
            ),
        }
        let pattern = pacer.query(device, &scpi.harmonic_pattern_query())?;
        self.enabled = HarmonicSet::from_pattern(&pattern)
            .ok_or_else(|| GeneratorError::Unparsable(pattern.trim().to_string()))?;
        let fundamental = pacer.query_number(device, &scpi.amplitude_query())?;
        self.cache.rescale(fundamental, self.mode);
        for order in orders() {
            let volts = pacer.query_number(device, &scpi.harmonic_amplitude_query(order))?;
            let degrees = pacer.query_number(device, &scpi.harmonic_phase_query(order))?;
            self.cache.write(order, volts, HarmonicAmplitudeMode::Absolute)?;
            self.phases[slot(order)?] = degrees;
        }
        Ok(())
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::transport::{Exchange, RecordingTransport};
    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }
    fn device_at(amplitude: &str) -> RecordingTransport {
        RecordingTransport::new()
            .reply(":SOUR1:VOLT?", amplitude)
            .reply(":SOUR1:FREQ?", "1000")
            .reply(":SOUR1:VOLT:OFFS?", "0")
            .reply(":SOUR1:PHAS?", "0")
    }
    #[test]
    fn pattern_marks_fundamental_first() {
        let set = HarmonicSet::new([false, true, false, false, false, false, true]);
        let pattern = build_pattern(&set);
        assert_eq!(pattern, "X0100001");
        assert_eq!(pattern.len(), 8);
        assert_eq!(build_pattern(&HarmonicSet::default()), CLEARED_PATTERN);
        assert_eq!(HarmonicSet::from_pattern(&pattern), Some(set));
        assert_eq!(HarmonicSet::from_pattern("X01"), None);
        assert_eq!(HarmonicSet::from_pattern("101000000"), None);
    }
    #[test]
    fn highest_order_defaults_to_two() {
        assert_eq!(highest_enabled_order(&HarmonicSet::default()), 2);
        let set = HarmonicSet::new([true, false, false, true, false, false, false]);
        assert_eq!(highest_enabled_order(&set), 5);
    }
    #[test]
    fn order_outside_range_is_rejected() {
        let mut manager = HarmonicStateManager::new(ChannelId::One, 2.0);
        for order in [0, 1, 9] {
            assert_eq!(
                manager.set_amplitude(order, 10.0, HarmonicAmplitudeMode::Percentage, 2.0),
                Err(GeneratorError::InvalidHarmonicOrder(order))
            );
        }
        assert!(manager.set_phase(9, 0.0).is_err());
        assert!(manager.set_order_enabled(1, true).is_err());
    }
    #[test]
    fn cache_invariant_holds_after_every_write() {
        let mut manager = HarmonicStateManager::new(ChannelId::One, 2.0);
        let writes = [
            (2, 10.0, HarmonicAmplitudeMode::Percentage, 2.0),
            (3, 0.3, HarmonicAmplitudeMode::Absolute, 2.0),
            (8, 150.0, HarmonicAmplitudeMode::Percentage, 0.75),
            (5, 0.01, HarmonicAmplitudeMode::Absolute, 3.3),
        ];
        for (order, value, mode, fundamental) in writes {
            manager.set_amplitude(order, value, mode, fundamental).unwrap();
            for o in orders() {
                let entry = manager.amplitude(o).unwrap();
                assert!(close(
                    entry.absolute_volts,
                    entry.percent_of_fundamental / 100.0 * fundamental
                ));
            }
        }
    }
    #[test]
    fn rescale_covers_every_order() {
        let mut cache = HarmonicAmplitudeCache::new(2.0);
        for order in orders() {
            cache
                .write(order, f64::from(order), HarmonicAmplitudeMode::Percentage)
                .unwrap();
        }
        cache.rescale(4.0, HarmonicAmplitudeMode::Percentage);
        for order in orders() {
            let entry = cache.get(order).unwrap();
            assert_eq!(entry.percent_of_fundamental, f64::from(order));
            assert!(close(entry.absolute_volts, f64::from(order) / 100.0 * 4.0));
        }
        cache.rescale(0.0, HarmonicAmplitudeMode::Absolute);
        let top = cache.get(MAX_ORDER).unwrap();
        assert!(close(top.absolute_volts, 0.32));
        assert_eq!(top.percent_of_fundamental, 0.0);
    }
    #[test]
    fn percentage_mode_scenario_reapplies() {
        let mut manager = HarmonicStateManager::new(ChannelId::One, 2.0);
        manager.set_order_enabled(3, true).unwrap();
        manager
            .set_amplitude(3, 25.0, HarmonicAmplitudeMode::Percentage, 2.0)
            .unwrap();
        assert!(close(manager.amplitude(3).unwrap().absolute_volts, 0.5));
        manager.set_mode(HarmonicAmplitudeMode::Absolute);
        assert_eq!(
            crate::drivers::units::format_min_decimals(manager.displayed_amplitude(3).unwrap(), 1),
            "0.5"
        );
        manager.set_mode(HarmonicAmplitudeMode::Percentage);
        let mut dev = device_at("4.0");
        let pacer = Pacer::immediate();
        manager.enable(&mut dev, &pacer).unwrap();
        dev.log.clear();
        let reapplied = manager.on_fundamental_changed(4.0, &mut dev, &pacer).unwrap();
        assert!(reapplied);
        assert!(close(manager.amplitude(3).unwrap().absolute_volts, 1.0));
        assert!(dev.sent().contains(&":SOUR1:HARM:AMPL 3,1.00000000000e0"));
    }
    #[test]
    fn absolute_mode_scenario_only_updates_percent() {
        let mut manager = HarmonicStateManager::new(ChannelId::One, 2.0);
        manager.set_order_enabled(3, true).unwrap();
        manager
            .set_amplitude(3, 25.0, HarmonicAmplitudeMode::Percentage, 2.0)
            .unwrap();
        manager.set_mode(HarmonicAmplitudeMode::Absolute);
        let mut dev = device_at("2.0");
        let pacer = Pacer::immediate();
        manager.enable(&mut dev, &pacer).unwrap();
        dev.log.clear();
        let reapplied = manager.on_fundamental_changed(4.0, &mut dev, &pacer).unwrap();
        assert!(!reapplied);
        assert!(dev.log.is_empty());
        let entry = manager.amplitude(3).unwrap();
        assert!(close(entry.absolute_volts, 0.5));
        assert!(close(entry.percent_of_fundamental, 12.5));
    }
    #[test]
    fn disabled_manager_does_not_touch_device() {
        let mut manager = HarmonicStateManager::new(ChannelId::One, 2.0);
        let mut dev = RecordingTransport::new();
        let reapplied = manager
            .on_fundamental_changed(4.0, &mut dev, &Pacer::immediate())
            .unwrap();
        assert!(!reapplied);
        assert!(dev.log.is_empty());
    }
    #[test]
    fn apply_sequence_follows_device_protocol() {
        let mut manager = HarmonicStateManager::new(ChannelId::One, 2.0);
        manager.set_order_enabled(2, true).unwrap();
        manager.set_order_enabled(4, true).unwrap();
        manager
            .set_amplitude(2, 50.0, HarmonicAmplitudeMode::Percentage, 2.0)
            .unwrap();
        manager
            .set_amplitude(4, 10.0, HarmonicAmplitudeMode::Percentage, 2.0)
            .unwrap();
        manager.set_phase(4, 90.0).unwrap();
        let mut dev = device_at("2.0");
        let fundamental = manager.apply_sequence(&mut dev, &Pacer::immediate()).unwrap();
        assert_eq!(fundamental.amplitude, 2.0);
        let expected = vec![
            Exchange::Sent(":SOUR1:HARM:USER X0000000".into()),
            Exchange::Queried(":SOUR1:VOLT?".into()),
            Exchange::Queried(":SOUR1:FREQ?".into()),
            Exchange::Queried(":SOUR1:VOLT:OFFS?".into()),
            Exchange::Queried(":SOUR1:PHAS?".into()),
            Exchange::Sent(":SOUR1:HARM:AMPL 2,1.00000000000e0".into()),
            Exchange::Sent(":SOUR1:HARM:PHAS 2,0.00000000000e0".into()),
            Exchange::Sent(":SOUR1:HARM:AMPL 3,0.00000000000e0".into()),
            Exchange::Sent(":SOUR1:HARM:AMPL 4,2.00000000000e-1".into()),
            Exchange::Sent(":SOUR1:HARM:PHAS 4,9.00000000000e1".into()),
            Exchange::Sent(":SOUR1:HARM:AMPL 5,0.00000000000e0".into()),
            Exchange::Sent(":SOUR1:HARM:AMPL 6,0.00000000000e0".into()),
            Exchange::Sent(":SOUR1:HARM:AMPL 7,0.00000000000e0".into()),
            Exchange::Sent(":SOUR1:HARM:AMPL 8,0.00000000000e0".into()),
            Exchange::Sent(":SOUR1:HARM:ORDE 4".into()),
            Exchange::Sent(":SOUR1:HARM:USER X1010000".into()),
            Exchange::Sent(":SOUR1:HARM:STAT ON".into()),
            Exchange::Sent(
                ":SOUR1:APPL:SIN 1.00000000000e3,2.00000000000e0,0.00000000000e0,0.00000000000e0"
                    .into()
            ),
        ];
        assert_eq!(dev.log, expected);
    }
    #[test]
    fn apply_uses_device_fundamental_not_cached_one() {
        let mut manager = HarmonicStateManager::new(ChannelId::One, 2.0);
        manager.set_order_enabled(2, true).unwrap();
        manager
            .set_amplitude(2, 50.0, HarmonicAmplitudeMode::Percentage, 2.0)
            .unwrap();
        let mut dev = device_at("3.0");
        manager.apply_sequence(&mut dev, &Pacer::immediate()).unwrap();
        assert!(close(manager.amplitude(2).unwrap().absolute_volts, 1.5));
        assert!(dev.sent().contains(&":SOUR1:HARM:AMPL 2,1.50000000000e0"));
    }
    #[test]
    fn failure_mid_sequence_leaves_issued_steps() {
        let mut manager = HarmonicStateManager::new(ChannelId::One, 2.0);
        let mut dev = device_at("2.0").fail_after(6);
        let err = manager.apply_sequence(&mut dev, &Pacer::immediate()).unwrap_err();
        assert!(matches!(err, GeneratorError::Transport(_)));
        assert_eq!(dev.log.len(), 6);
        assert_eq!(dev.sent().first(), Some(&":SOUR1:HARM:USER X0000000"));
    }
    #[test]
    fn refresh_falls_back_to_intended_state() {
        let mut manager = HarmonicStateManager::new(ChannelId::One, 2.0);
        let pacer = Pacer::immediate();
        manager.enable(&mut device_at("2.0"), &pacer).unwrap();
        let mut dev = RecordingTransport::new()
            .reply(":SOUR1:HARM:STAT?", "garbage")
            .reply(":SOUR1:HARM:USER?", "X0010000")
            .reply(":SOUR1:VOLT?", "2.0");
        for order in orders() {
            let volts = if order == 4 { "0.4" } else { "0" };
            dev = dev
                .reply(&format!(":SOUR1:HARM:AMPL? {order}"), volts)
                .reply(&format!(":SOUR1:HARM:PHAS? {order}"), "45");
        }
        manager.refresh(&mut dev, &pacer).unwrap();
        assert_eq!(manager.state(), HarmonicState::Enabled);
        assert!(manager.enabled_set().is_enabled(4));
        assert!(!manager.enabled_set().is_enabled(3));
        assert!(close(manager.amplitude(4).unwrap().percent_of_fundamental, 20.0));
        assert_eq!(manager.phase(7).unwrap(), 45.0);
    }
}
