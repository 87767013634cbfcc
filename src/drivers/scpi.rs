use crate::types::{ChannelId, WaveformFamily};
/// Builds wire commands for one output channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScpiCommands {
    prefix: u8,
}
fn number(value: f64) -> String {
    // 12 significant digits covers the device resolution without float noise
    format!("{value:.11e}")
}
fn on_off(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}
impl ScpiCommands {
    pub fn new(channel: ChannelId) -> Self {
        Self {
            prefix: channel.number(),
        }
    }
    fn set(&self, header: &str, value: f64) -> String {
        format!(":SOUR{}:{} {}", self.prefix, header, number(value))
    }
    fn query(&self, header: &str) -> String {
        format!(":SOUR{}:{}?", self.prefix, header)
    }
    pub fn function(&self, family: WaveformFamily) -> String {
        format!(":SOUR{}:FUNC {}", self.prefix, family.mnemonic())
    }
    pub fn function_query(&self) -> String {
        self.query("FUNC")
    }
    pub fn frequency(&self, hz: f64) -> String {
        self.set("FREQ", hz)
    }
    pub fn frequency_query(&self) -> String {
        self.query("FREQ")
    }
    pub fn period(&self, seconds: f64) -> String {
        self.set("PER", seconds)
    }
    pub fn period_query(&self) -> String {
        self.query("PER")
    }
    pub fn amplitude(&self, vpp: f64) -> String {
        self.set("VOLT", vpp)
    }
    pub fn amplitude_query(&self) -> String {
        self.query("VOLT")
    }
    pub fn offset(&self, volts: f64) -> String {
        self.set("VOLT:OFFS", volts)
    }
    pub fn offset_query(&self) -> String {
        self.query("VOLT:OFFS")
    }
    pub fn phase(&self, degrees: f64) -> String {
        self.set("PHAS", degrees)
    }
    pub fn phase_query(&self) -> String {
        self.query("PHAS")
    }
    pub fn pulse_width(&self, seconds: f64) -> String {
        self.set("PULS:WIDT", seconds)
    }
    pub fn pulse_width_query(&self) -> String {
        self.query("PULS:WIDT")
    }
    pub fn rise_time(&self, seconds: f64) -> String {
        self.set("PULS:TRAN:LEAD", seconds)
    }
    pub fn rise_time_query(&self) -> String {
        self.query("PULS:TRAN:LEAD")
    }
    pub fn fall_time(&self, seconds: f64) -> String {
        self.set("PULS:TRAN:TRA", seconds)
    }
    pub fn fall_time_query(&self) -> String {
        self.query("PULS:TRAN:TRA")
    }
    pub fn harmonic_amplitude(&self, order: u8, vpp: f64) -> String {
        format!(":SOUR{}:HARM:AMPL {},{}", self.prefix, order, number(vpp))
    }
    pub fn harmonic_amplitude_query(&self, order: u8) -> String {
        format!(":SOUR{}:HARM:AMPL? {}", self.prefix, order)
    }
    pub fn harmonic_phase(&self, order: u8, degrees: f64) -> String {
        format!(":SOUR{}:HARM:PHAS {},{}", self.prefix, order, number(degrees))
    }
    pub fn harmonic_phase_query(&self, order: u8) -> String {
        format!(":SOUR{}:HARM:PHAS? {}", self.prefix, order)
    }
    pub fn harmonic_pattern(&self, pattern: &str) -> String {
        format!(":SOUR{}:HARM:USER {}", self.prefix, pattern)
    }
    pub fn harmonic_pattern_query(&self) -> String {
        self.query("HARM:USER")
    }
    pub fn harmonic_order(&self, order: u8) -> String {
        format!(":SOUR{}:HARM:ORDE {}", self.prefix, order)
    }
    pub fn harmonic_state(&self, on: bool) -> String {
        format!(":SOUR{}:HARM:STAT {}", self.prefix, on_off(on))
    }
    pub fn harmonic_state_query(&self) -> String {
        self.query("HARM:STAT")
    }
    pub fn dual_tone_f1(&self, hz: f64) -> String {
        self.set("FUNC:DUALT:FREQ1", hz)
    }
    pub fn dual_tone_f1_query(&self) -> String {
        self.query("FUNC:DUALT:FREQ1")
    }
    pub fn dual_tone_f2(&self, hz: f64) -> String {
        self.set("FUNC:DUALT:FREQ2", hz)
    }
    pub fn dual_tone_f2_query(&self) -> String {
        self.query("FUNC:DUALT:FREQ2")
    }
    /// Re-applies a plain sine with all four fundamental parameters at once.
    pub fn apply_sine(&self, hz: f64, vpp: f64, offset: f64, phase: f64) -> String {
        format!(
            ":SOUR{}:APPL:SIN {},{},{},{}",
            self.prefix,
            number(hz),
            number(vpp),
            number(offset),
            number(phase)
        )
    }
}
/// Parses a numeric reply; instruments pad replies with whitespace and newlines.
pub fn parse_reply(reply: &str) -> Option<f64> {
    reply.trim().trim_matches('"').parse::<f64>().ok().filter(|v| v.is_finite())
}
/// Parses an `ON`/`OFF`/`1`/`0` reply.
pub fn parse_on_off(reply: &str) -> Option<bool> {
    match reply.trim().to_ascii_uppercase().as_str() {
        "ON" | "1" => Some(true),
        "OFF" | "0" => Some(false),
        _ => None,
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn commands_carry_channel_prefix() {
        let ch2 = ScpiCommands::new(ChannelId::Two);
        assert_eq!(ch2.harmonic_pattern("X0100000"), ":SOUR2:HARM:USER X0100000");
        assert_eq!(ch2.harmonic_state(true), ":SOUR2:HARM:STAT ON");
        assert_eq!(ch2.harmonic_amplitude_query(3), ":SOUR2:HARM:AMPL? 3");
        assert_eq!(ch2.frequency_query(), ":SOUR2:FREQ?");
    }
    #[test]
    fn numbers_survive_the_wire() {
        let ch1 = ScpiCommands::new(ChannelId::One);
        let cmd = ch1.frequency(1234.5);
        let value = cmd.split_whitespace().nth(1).and_then(parse_reply).unwrap();
        assert_eq!(value, 1234.5);
    }
    #[test]
    fn replies_are_trimmed() {
        assert_eq!(parse_reply(" 2.5E+00\n"), Some(2.5));
        assert_eq!(parse_reply("junk"), None);
        assert_eq!(parse_on_off("on\n"), Some(true));
        assert_eq!(parse_on_off("0"), Some(false));
        assert_eq!(parse_on_off("maybe"), None);
    }
}
