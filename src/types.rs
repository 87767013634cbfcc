// src/types.rs
use std::fmt;
use serde::{Deserialize, Serialize};
use crate::drivers::channel::ChannelSnapshot;
use crate::drivers::dual_tone::DualToneMode;
use crate::drivers::harmonics::HarmonicAmplitudeMode;
use crate::drivers::pulse::RateMode;
use crate::drivers::units::AmplitudeMode;

// how the engine reaches the instrument
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub enum ConnectionMode {
    #[default]
    Simulation,
    Visa,
    Serial,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash)]
pub enum ChannelId {
    One,
    Two,
}

impl ChannelId {
    pub const ALL: [ChannelId; 2] = [ChannelId::One, ChannelId::Two];

    pub fn number(self) -> u8 {
        match self {
            ChannelId::One => 1,
            ChannelId::Two => 2,
        }
    }

    pub fn index(self) -> usize {
        self.number() as usize - 1
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CH{}", self.number())
    }
}

// Harmonic output is a sine with harmonics switched on, so it shares the SIN mnemonic.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum WaveformFamily {
    #[default]
    Sine,
    Square,
    Ramp,
    Pulse,
    Harmonic,
    DualTone,
}

impl WaveformFamily {
    pub const ALL: [WaveformFamily; 6] = [
        WaveformFamily::Sine,
        WaveformFamily::Square,
        WaveformFamily::Ramp,
        WaveformFamily::Pulse,
        WaveformFamily::Harmonic,
        WaveformFamily::DualTone,
    ];

    pub fn mnemonic(self) -> &'static str {
        match self {
            WaveformFamily::Sine | WaveformFamily::Harmonic => "SIN",
            WaveformFamily::Square => "SQU",
            WaveformFamily::Ramp => "RAMP",
            WaveformFamily::Pulse => "PULS",
            WaveformFamily::DualTone => "DUALT",
        }
    }

    pub fn from_mnemonic(text: &str) -> Option<Self> {
        match text.trim().trim_matches('"').to_ascii_uppercase().as_str() {
            "SIN" | "SINUSOID" => Some(WaveformFamily::Sine),
            "SQU" | "SQUARE" => Some(WaveformFamily::Square),
            "RAMP" => Some(WaveformFamily::Ramp),
            "PULS" | "PULSE" => Some(WaveformFamily::Pulse),
            "DUALT" | "DUALTONE" => Some(WaveformFamily::DualTone),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            WaveformFamily::Sine => "Sine",
            WaveformFamily::Square => "Square",
            WaveformFamily::Ramp => "Ramp",
            WaveformFamily::Pulse => "Pulse",
            WaveformFamily::Harmonic => "Harmonic",
            WaveformFamily::DualTone => "Dual tone",
        }
    }
}

// GUI -> engine. Numeric payloads are already in base units (Hz, s, V, degrees).
#[derive(Clone, Debug)]
pub enum GuiCommand {
    Connect(ConnectionMode),
    Disconnect,
    Refresh(ChannelId),
    SetWaveform(ChannelId, WaveformFamily),
    SetRateMode(ChannelId, RateMode),
    SetRate(ChannelId, f64),
    SetAmplitudeMode(ChannelId, AmplitudeMode),
    // value expressed in the channel's amplitude mode
    SetAmplitude(ChannelId, f64),
    SetOffset(ChannelId, f64),
    SetPhase(ChannelId, f64),
    SetPulseWidth(ChannelId, f64),
    SetRiseTime(ChannelId, f64),
    SetFallTime(ChannelId, f64),
    SetDualTone(ChannelId, f64, f64),
    // target mode, text of the two fields being left, and their unit
    SwitchDualToneMode(ChannelId, DualToneMode, [String; 2], String),
    SetHarmonicsEnabled(ChannelId, bool),
    SetHarmonicOrder(ChannelId, u8, bool),
    SetHarmonicAmplitudeMode(ChannelId, HarmonicAmplitudeMode),
    // value in the current harmonic amplitude mode (% or V)
    SetHarmonicAmplitude(ChannelId, u8, f64),
    SetHarmonicPhase(ChannelId, u8, f64),
    ApplyHarmonics(ChannelId),
    Shutdown,
}

// engine -> GUI
#[derive(Clone, Debug)]
pub enum EngineMessage {
    Log(String),
    Status(bool),
    Snapshot(Box<ChannelSnapshot>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnemonics_round_trip_except_harmonic() {
        for family in WaveformFamily::ALL {
            let back = WaveformFamily::from_mnemonic(family.mnemonic()).unwrap();
            if family == WaveformFamily::Harmonic {
                assert_eq!(back, WaveformFamily::Sine);
            } else {
                assert_eq!(back, family);
            }
        }
        assert_eq!(WaveformFamily::from_mnemonic("NOISE"), None);
    }

    #[test]
    fn channel_numbers() {
        assert_eq!(ChannelId::Two.index(), 1);
        assert_eq!(ChannelId::One.to_string(), "CH1");
    }
}
