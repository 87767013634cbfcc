// src/engine.rs
use std::sync::mpsc::{Receiver, Sender};
use std::thread;
use anyhow::{Context, Result};
use log::{info, warn};
use crate::config::AppConfig;
use crate::drivers::serial::SerialLink;
use crate::drivers::visa::VisaSession;
use crate::drivers::{ChannelSession, DeviceTransport, GeneratorError, Pacer, SimulatedGenerator};
use crate::types::*;

pub fn spawn_thread(tx: Sender<EngineMessage>, rx_cmd: Receiver<GuiCommand>, config: AppConfig) {
    thread::spawn(move || {
        tx.send(EngineMessage::Log("Engine ready.".to_owned())).ok();
        let mut engine = Engine::new(config, tx);
        // one command at a time: every device exchange is serialized here
        while let Ok(cmd) = rx_cmd.recv() {
            if !engine.handle(cmd) {
                break;
            }
        }
        info!("engine stopped");
    });
}

fn open_device(config: &AppConfig, mode: ConnectionMode) -> Result<Box<dyn DeviceTransport>> {
    match mode {
        ConnectionMode::Simulation => Ok(Box::new(SimulatedGenerator::new())),
        ConnectionMode::Visa => {
            let timeout = u32::try_from(config.io_timeout_ms).map_err(|_| {
                GeneratorError::Config(format!("io_timeout_ms {} is too large", config.io_timeout_ms))
            })?;
            let session = VisaSession::open(&config.visa_library, &config.visa_resource, timeout)?;
            Ok(Box::new(session))
        }
        ConnectionMode::Serial => {
            if config.serial_baud == 0 {
                return Err(GeneratorError::Config("serial_baud must be non-zero".into()).into());
            }
            let link = SerialLink::open(&config.serial_port, config.serial_baud, config.io_timeout())
                .context("serial connect")?;
            Ok(Box::new(link))
        }
    }
}

fn channel_of(cmd: &GuiCommand) -> Option<ChannelId> {
    use GuiCommand::*;
    match cmd {
        Refresh(ch)
        | SetWaveform(ch, _)
        | SetRateMode(ch, _)
        | SetRate(ch, _)
        | SetAmplitudeMode(ch, _)
        | SetAmplitude(ch, _)
        | SetOffset(ch, _)
        | SetPhase(ch, _)
        | SetPulseWidth(ch, _)
        | SetRiseTime(ch, _)
        | SetFallTime(ch, _)
        | SetDualTone(ch, _, _)
        | SwitchDualToneMode(ch, _, _, _)
        | SetHarmonicsEnabled(ch, _)
        | SetHarmonicOrder(ch, _, _)
        | SetHarmonicAmplitudeMode(ch, _)
        | SetHarmonicAmplitude(ch, _, _)
        | SetHarmonicPhase(ch, _, _)
        | ApplyHarmonics(ch) => Some(*ch),
        Connect(_) | Disconnect | Shutdown => None,
    }
}

// Commands that only touch the session model.
fn apply_local(session: &mut ChannelSession, cmd: GuiCommand) -> Result<(), GeneratorError> {
    match cmd {
        GuiCommand::SetRateMode(_, mode) => session.set_rate_mode(mode),
        GuiCommand::SetAmplitudeMode(_, mode) => {
            session.set_amplitude_mode(mode);
            Ok(())
        }
        GuiCommand::SwitchDualToneMode(_, to, fields, unit) => {
            session.switch_dual_tone_mode(to, [fields[0].as_str(), fields[1].as_str()], &unit)
        }
        GuiCommand::SetHarmonicAmplitudeMode(_, mode) => {
            session.set_harmonic_amplitude_mode(mode);
            Ok(())
        }
        _ => Err(GeneratorError::Transport("not connected".into())),
    }
}

fn apply(
    session: &mut ChannelSession,
    cmd: GuiCommand,
    device: &mut dyn DeviceTransport,
    pacer: &Pacer,
) -> Result<(), GeneratorError> {
    match cmd {
        GuiCommand::Refresh(_) => session.refresh(device, pacer),
        GuiCommand::SetWaveform(_, family) => session.set_waveform(family, device, pacer),
        GuiCommand::SetRate(_, v) => session.set_rate(v, device, pacer),
        GuiCommand::SetAmplitude(_, v) => session.set_amplitude(v, device, pacer),
        GuiCommand::SetOffset(_, v) => session.set_offset(v, device, pacer),
        GuiCommand::SetPhase(_, v) => session.set_phase(v, device, pacer),
        GuiCommand::SetPulseWidth(_, v) => session.set_pulse_width(v, device, pacer).map(|_| ()),
        GuiCommand::SetRiseTime(_, v) => session.set_rise_time(v, device, pacer),
        GuiCommand::SetFallTime(_, v) => session.set_fall_time(v, device, pacer),
        GuiCommand::SetDualTone(_, a, b) => session.set_dual_tone(a, b, device, pacer),
        GuiCommand::SetHarmonicsEnabled(_, on) => session.set_harmonics_enabled(on, device, pacer),
        GuiCommand::SetHarmonicOrder(_, order, on) => session.set_harmonic_order(order, on, device, pacer),
        GuiCommand::SetHarmonicAmplitude(_, order, v) => {
            session.set_harmonic_amplitude(order, v, device, pacer)
        }
        GuiCommand::SetHarmonicPhase(_, order, v) => session.set_harmonic_phase(order, v, device, pacer),
        GuiCommand::ApplyHarmonics(_) => session.apply_harmonics(device, pacer),
        other => apply_local(session, other),
    }
}

/// Owns the instrument link and both channel sessions.
struct Engine {
    config: AppConfig,
    pacer: Pacer,
    device: Option<Box<dyn DeviceTransport>>,
    channels: [ChannelSession; 2],
    tx: Sender<EngineMessage>,
}

impl Engine {
    fn new(config: AppConfig, tx: Sender<EngineMessage>) -> Self {
        Self {
            pacer: Pacer::new(config.settle()),
            config,
            device: None,
            channels: [ChannelSession::new(ChannelId::One), ChannelSession::new(ChannelId::Two)],
            tx,
        }
    }

    fn log(&self, msg: String) {
        self.tx.send(EngineMessage::Log(msg)).ok();
    }

    /// Returns false once the engine should exit.
    fn handle(&mut self, cmd: GuiCommand) -> bool {
        match cmd {
            GuiCommand::Connect(mode) => self.connect(mode),
            GuiCommand::Disconnect => self.disconnect(),
            GuiCommand::Shutdown => {
                self.disconnect();
                return false;
            }
            other => {
                if let Some(ch) = channel_of(&other) {
                    self.on_channel(ch, other);
                }
            }
        }
        true
    }

    fn connect(&mut self, mode: ConnectionMode) {
        if self.device.is_some() {
            self.log("Already connected.".to_owned());
            return;
        }
        match open_device(&self.config, mode) {
            Ok(device) => {
                self.device = Some(device);
                info!("connected ({mode:?})");
                self.tx.send(EngineMessage::Status(true)).ok();
                self.log(format!("Connected ({mode:?})"));
                for ch in ChannelId::ALL {
                    if self.config.refresh_on_connect {
                        self.on_channel(ch, GuiCommand::Refresh(ch));
                    } else {
                        self.publish(ch);
                    }
                }
            }
            Err(err) => {
                warn!("connect failed: {err:#}");
                self.tx.send(EngineMessage::Status(false)).ok();
                self.log(format!("Connect failed: {err:#}"));
            }
        }
    }

    fn disconnect(&mut self) {
        if self.device.take().is_some() {
            info!("disconnected");
            self.log("Disconnected".to_owned());
        }
        self.tx.send(EngineMessage::Status(false)).ok();
    }

    fn on_channel(&mut self, ch: ChannelId, cmd: GuiCommand) {
        let session = &mut self.channels[ch.index()];
        let result = match self.device.as_mut() {
            Some(device) => apply(session, cmd, device.as_mut(), &self.pacer),
            None => apply_local(session, cmd),
        };
        if let Err(err) = result {
            // model keeps whatever state was reached; the panel stays usable
            if err.is_validation() {
                warn!("{ch} input rejected: {err}");
                self.log(format!("{ch} rejected: {err}"));
            } else {
                warn!("{ch} {err}");
                self.log(format!("{ch} {err}"));
            }
        }
        self.publish(ch);
    }

    fn publish(&mut self, ch: ChannelId) {
        let session = &mut self.channels[ch.index()];
        let notes = session.take_notes();
        let snapshot = session.snapshot();
        for note in notes {
            self.log(note);
        }
        self.tx.send(EngineMessage::Snapshot(Box::new(snapshot))).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::{channel, Receiver};
    use crate::drivers::channel::ChannelSnapshot;

    fn engine() -> (Engine, Receiver<EngineMessage>) {
        let (tx, rx) = channel();
        let config = AppConfig {
            settle_ms: 0,
            ..AppConfig::default()
        };
        (Engine::new(config, tx), rx)
    }

    fn drain(rx: &Receiver<EngineMessage>) -> (Vec<String>, Vec<ChannelSnapshot>) {
        let mut logs = Vec::new();
        let mut snaps = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            match msg {
                EngineMessage::Log(s) => logs.push(s),
                EngineMessage::Snapshot(s) => snaps.push(*s),
                EngineMessage::Status(_) => {}
            }
        }
        (logs, snaps)
    }

    #[test]
    fn connect_refreshes_both_channels() {
        let (mut engine, rx) = engine();
        assert!(engine.handle(GuiCommand::Connect(ConnectionMode::Simulation)));
        let (logs, snaps) = drain(&rx);
        assert!(logs.iter().any(|l| l.starts_with("Connected")));
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[1].channel, ChannelId::Two);
    }

    #[test]
    fn setter_publishes_display_values() {
        let (mut engine, rx) = engine();
        engine.handle(GuiCommand::Connect(ConnectionMode::Simulation));
        drain(&rx);
        engine.handle(GuiCommand::SetRate(ChannelId::One, 25_000.0));
        let (_, snaps) = drain(&rx);
        let snap = snaps.last().unwrap();
        assert_eq!(snap.rate.unit, "kHz");
        assert_eq!(snap.rate.text, "25.000");
    }

    #[test]
    fn rejected_value_is_logged_and_previous_kept() {
        let (mut engine, rx) = engine();
        engine.handle(GuiCommand::Connect(ConnectionMode::Simulation));
        drain(&rx);
        engine.handle(GuiCommand::SetRate(ChannelId::One, -5.0));
        let (logs, snaps) = drain(&rx);
        assert!(logs.iter().any(|l| l.contains("rejected")));
        assert_eq!(snaps.last().unwrap().frequency_hz, 1000.0);
    }

    #[test]
    fn clamp_diagnostic_reaches_the_log() {
        let (mut engine, rx) = engine();
        engine.handle(GuiCommand::Connect(ConnectionMode::Simulation));
        engine.handle(GuiCommand::SetWaveform(ChannelId::Two, WaveformFamily::Pulse));
        drain(&rx);
        engine.handle(GuiCommand::SetPulseWidth(ChannelId::Two, 2e-3));
        let (logs, _) = drain(&rx);
        assert!(logs.iter().any(|l| l.starts_with("CH2")));
    }

    #[test]
    fn device_commands_need_a_connection() {
        let (mut engine, rx) = engine();
        engine.handle(GuiCommand::SetAmplitude(ChannelId::One, 3.0));
        engine.handle(GuiCommand::SetAmplitudeMode(ChannelId::One, crate::drivers::units::AmplitudeMode::Vrms));
        let (logs, snaps) = drain(&rx);
        assert!(logs.iter().any(|l| l.contains("not connected")));
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[1].amplitude_vpp, 1.0);
        assert_eq!(snaps[1].amplitude_mode, crate::drivers::units::AmplitudeMode::Vrms);
    }

    #[test]
    fn shutdown_stops_the_loop() {
        let (mut engine, rx) = engine();
        engine.handle(GuiCommand::Connect(ConnectionMode::Simulation));
        assert!(!engine.handle(GuiCommand::Shutdown));
        assert!(engine.device.is_none());
        drain(&rx);
    }

    #[test]
    fn zero_baud_is_a_config_error() {
        let config = AppConfig {
            serial_baud: 0,
            ..AppConfig::default()
        };
        let err = open_device(&config, ConnectionMode::Serial).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<GeneratorError>(),
            Some(GeneratorError::Config(_))
        ));
    }
}
