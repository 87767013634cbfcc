use log::debug;
use crate::drivers::harmonics::{orders, CLEARED_PATTERN, MIN_ORDER};
use crate::drivers::scpi::{parse_on_off, parse_reply};
use crate::drivers::transport::DeviceTransport;
use crate::drivers::GeneratorError;
use crate::types::WaveformFamily;
#[derive(Clone, Debug)]
struct SimChannel {
    function: WaveformFamily,
    frequency: f64,
    amplitude: f64,
    offset: f64,
    phase: f64,
    width: f64,
    lead: f64,
    trail: f64,
    harmonic_amplitude: [f64; 7],
    harmonic_phase: [f64; 7],
    pattern: String,
    order: u8,
    harmonics_on: bool,
    f1: f64,
    f2: f64,
}
impl Default for SimChannel {
    fn default() -> Self {
        Self {
            function: WaveformFamily::Sine,
            frequency: 1000.0,
            amplitude: 5.0,
            offset: 0.0,
            phase: 0.0,
            width: 5e-4,
            lead: 2e-8,
            trail: 2e-8,
            harmonic_amplitude: [0.0; 7],
            harmonic_phase: [0.0; 7],
            pattern: CLEARED_PATTERN.to_string(),
            order: MIN_ORDER,
            harmonics_on: false,
            f1: 1000.0,
            f2: 2000.0,
        }
    }
}
/// In-memory dual-channel generator that speaks the command set of
/// [`crate::drivers::scpi::ScpiCommands`].
#[derive(Clone, Debug, Default)]
pub struct SimulatedGenerator {
    channels: [SimChannel; 2],
    /// Every accepted set command, oldest first.
    pub history: Vec<String>,
}
struct Parsed<'a> {
    channel: usize,
    path: String,
    args: Vec<&'a str>,
}
fn parse(command: &str) -> Result<Parsed<'_>, GeneratorError> {
    let command = command.trim();
    let (header, rest) = command.split_once(' ').unwrap_or((command, ""));
    let header = header.trim_start_matches(':').trim_end_matches('?');
    let (source, path) = header
        .split_once(':')
        .ok_or_else(|| GeneratorError::Transport(format!("undefined header {command}")))?;
    let channel = match source.to_ascii_uppercase().as_str() {
        "SOUR1" => 0,
        "SOUR2" => 1,
        _ => return Err(GeneratorError::Transport(format!("undefined header {command}"))),
    };
    let args = rest
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .collect();
    Ok(Parsed {
        channel,
        path: path.to_ascii_uppercase(),
        args,
    })
}
fn number_arg(parsed: &Parsed<'_>, index: usize) -> Result<f64, GeneratorError> {
    parsed
        .args
        .get(index)
        .and_then(|a| parse_reply(a))
        .ok_or_else(|| GeneratorError::Transport(format!("bad parameter for {}", parsed.path)))
}
fn order_arg(parsed: &Parsed<'_>) -> Result<usize, GeneratorError> {
    let order = number_arg(parsed, 0)? as u8;
    if orders().any(|o| o == order) {
        Ok((order - MIN_ORDER) as usize)
    } else {
        Err(GeneratorError::Transport(format!("harmonic order {order} out of range")))
    }
}
impl SimulatedGenerator {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn harmonic_amplitude(&self, channel: usize, order: u8) -> f64 {
        self.channels[channel].harmonic_amplitude[(order - MIN_ORDER) as usize]
    }
    pub fn harmonics_on(&self, channel: usize) -> bool {
        self.channels[channel].harmonics_on
    }
    pub fn pattern(&self, channel: usize) -> &str {
        &self.channels[channel].pattern
    }
    pub fn amplitude(&self, channel: usize) -> f64 {
        self.channels[channel].amplitude
    }
    pub fn pulse_width(&self, channel: usize) -> f64 {
        self.channels[channel].width
    }
    pub fn dual_tone(&self, channel: usize) -> (f64, f64) {
        (self.channels[channel].f1, self.channels[channel].f2)
    }
    pub fn function(&self, channel: usize) -> WaveformFamily {
        self.channels[channel].function
    }
}
impl DeviceTransport for SimulatedGenerator {
    fn send(&mut self, command: &str) -> Result<(), GeneratorError> {
        let parsed = parse(command)?;
        let ch = &mut self.channels[parsed.channel];
        match parsed.path.as_str() {
            "FUNC" => {
                let name = parsed.args.first().copied().unwrap_or_default();
                ch.function = WaveformFamily::from_mnemonic(name)
                    .ok_or_else(|| GeneratorError::Transport(format!("unknown function {name}")))?;
            }
            "FREQ" => ch.frequency = number_arg(&parsed, 0)?,
            "PER" => ch.frequency = 1.0 / number_arg(&parsed, 0)?,
            "VOLT" => ch.amplitude = number_arg(&parsed, 0)?,
            "VOLT:OFFS" => ch.offset = number_arg(&parsed, 0)?,
            "PHAS" => ch.phase = number_arg(&parsed, 0)?,
            "PULS:WIDT" => ch.width = number_arg(&parsed, 0)?,
            "PULS:TRAN:LEAD" => ch.lead = number_arg(&parsed, 0)?,
            "PULS:TRAN:TRA" => ch.trail = number_arg(&parsed, 0)?,
            "HARM:AMPL" => {
                let i = order_arg(&parsed)?;
                ch.harmonic_amplitude[i] = number_arg(&parsed, 1)?;
            }
            "HARM:PHAS" => {
                let i = order_arg(&parsed)?;
                ch.harmonic_phase[i] = number_arg(&parsed, 1)?;
            }
            "HARM:USER" => {
                ch.pattern = parsed.args.first().copied().unwrap_or_default().to_string();
            }
            "HARM:ORDE" => ch.order = number_arg(&parsed, 0)? as u8,
            "HARM:STAT" => {
                ch.harmonics_on = parsed
                    .args
                    .first()
                    .and_then(|a| parse_on_off(a))
                    .ok_or_else(|| GeneratorError::Transport("bad state".into()))?;
            }
            "FUNC:DUALT:FREQ1" => ch.f1 = number_arg(&parsed, 0)?,
            "FUNC:DUALT:FREQ2" => ch.f2 = number_arg(&parsed, 0)?,
            "APPL:SIN" => {
                ch.function = WaveformFamily::Sine;
                ch.frequency = number_arg(&parsed, 0)?;
                ch.amplitude = number_arg(&parsed, 1)?;
                ch.offset = number_arg(&parsed, 2)?;
                ch.phase = number_arg(&parsed, 3)?;
            }
            other => {
                return Err(GeneratorError::Transport(format!("undefined header {other}")));
            }
        }
        debug!("sim accepted {command}");
        self.history.push(command.to_string());
        Ok(())
    }
    fn query(&mut self, command: &str) -> Result<String, GeneratorError> {
        let parsed = parse(command)?;
        let ch = &self.channels[parsed.channel];
        let reply = match parsed.path.as_str() {
            "FUNC" => ch.function.mnemonic().to_string(),
            "FREQ" => ch.frequency.to_string(),
            "PER" => (1.0 / ch.frequency).to_string(),
            "VOLT" => ch.amplitude.to_string(),
            "VOLT:OFFS" => ch.offset.to_string(),
            "PHAS" => ch.phase.to_string(),
            "PULS:WIDT" => ch.width.to_string(),
            "PULS:TRAN:LEAD" => ch.lead.to_string(),
            "PULS:TRAN:TRA" => ch.trail.to_string(),
            "HARM:AMPL" => ch.harmonic_amplitude[order_arg(&parsed)?].to_string(),
            "HARM:PHAS" => ch.harmonic_phase[order_arg(&parsed)?].to_string(),
            "HARM:USER" => ch.pattern.clone(),
            "HARM:ORDE" => ch.order.to_string(),
            "HARM:STAT" => (if ch.harmonics_on { "ON" } else { "OFF" }).to_string(),
            "FUNC:DUALT:FREQ1" => ch.f1.to_string(),
            "FUNC:DUALT:FREQ2" => ch.f2.to_string(),
            other => {
                return Err(GeneratorError::Transport(format!("undefined query {other}")));
            }
        };
        Ok(format!("{reply}\n"))
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::scpi::ScpiCommands;
    use crate::types::ChannelId;
    #[test]
    fn set_then_query_round_trips() {
        let mut sim = SimulatedGenerator::new();
        let ch2 = ScpiCommands::new(ChannelId::Two);
        sim.send(&ch2.amplitude(2.5)).unwrap();
        sim.send(&ch2.harmonic_amplitude(5, 0.25)).unwrap();
        assert_eq!(sim.query(&ch2.amplitude_query()).unwrap().trim(), "2.5");
        assert_eq!(sim.query(&ch2.harmonic_amplitude_query(5)).unwrap().trim(), "0.25");
        assert_eq!(sim.amplitude(0), 5.0);
    }
    #[test]
    fn period_sets_frequency() {
        let mut sim = SimulatedGenerator::new();
        let ch1 = ScpiCommands::new(ChannelId::One);
        sim.send(&ch1.period(1e-3)).unwrap();
        let hz = parse_reply(&sim.query(&ch1.frequency_query()).unwrap()).unwrap();
        assert!((hz - 1000.0).abs() < 1e-6);
    }
    #[test]
    fn unknown_headers_are_errors() {
        let mut sim = SimulatedGenerator::new();
        assert!(sim.send(":SOUR3:FREQ 1").is_err());
        assert!(sim.send(":SOUR1:BOGUS 1").is_err());
        assert!(sim.query(":SOUR1:HARM:AMPL? 9").is_err());
        assert!(sim.history.is_empty());
    }
}
