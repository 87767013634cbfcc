// src/gui.rs
use eframe::egui;
use egui::{Color32, RichText};
use egui_plot::{Line, Plot, PlotPoints};
use log::debug;
use std::f64::consts::TAU;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::time::{Duration, Instant};
use crate::config::AppConfig;
use crate::debounce::Debouncer;
use crate::drivers::channel::ChannelSnapshot;
use crate::drivers::dual_tone::DualToneMode;
use crate::drivers::harmonics::{orders, HarmonicAmplitudeMode, MIN_ORDER};
use crate::drivers::pulse::RateMode;
use crate::drivers::units::{self, AmplitudeMode, DisplayValue, Kind};
use crate::drivers::GeneratorError;
use crate::engine;
use crate::types::*;

const MAX_LOG_LINES: usize = 200;
const ENGINE_POLL: Duration = Duration::from_millis(100);
const PREVIEW_POINTS: usize = 400;
const PREVIEW_CYCLES: f64 = 2.0;

// Every editable field has its own debounce timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Field {
    Rate,
    Amplitude,
    Offset,
    Phase,
    Width,
    Rise,
    Fall,
    // both tone fields go out together
    DualTone,
    HarmonicAmplitude(u8),
    HarmonicPhase(u8),
}

type FieldKey = (ChannelId, Field);

#[derive(Clone, Debug, PartialEq)]
struct Quantity {
    text: String,
    unit: &'static str,
}

impl Quantity {
    fn new(kind: Kind) -> Self {
        Self {
            text: String::new(),
            unit: kind.base_unit(),
        }
    }

    fn show(&mut self, shown: &DisplayValue) {
        self.text = shown.text.clone();
        self.unit = shown.unit;
    }
}

// Text the user is editing for one channel.
struct ChannelForm {
    rate_kind: Kind,
    rate: Quantity,
    amplitude: Quantity,
    offset: Quantity,
    phase: String,
    width: Quantity,
    rise: Quantity,
    fall: Quantity,
    tone_a: Quantity,
    tone_b: Quantity,
    harmonic_amplitude: [String; 7],
    harmonic_phase: [String; 7],
}

impl Default for ChannelForm {
    fn default() -> Self {
        Self {
            rate_kind: Kind::Frequency,
            rate: Quantity::new(Kind::Frequency),
            amplitude: Quantity::new(Kind::Voltage),
            offset: Quantity::new(Kind::Voltage),
            phase: String::new(),
            width: Quantity::new(Kind::Time),
            rise: Quantity::new(Kind::Time),
            fall: Quantity::new(Kind::Time),
            tone_a: Quantity::new(Kind::Frequency),
            tone_b: Quantity::new(Kind::Frequency),
            harmonic_amplitude: Default::default(),
            harmonic_phase: Default::default(),
        }
    }
}

/// Copies display values into the form, skipping fields with an edit in flight.
fn sync_form(form: &mut ChannelForm, snap: &ChannelSnapshot, pending: impl Fn(Field) -> bool) {
    form.rate_kind = match snap.rate_mode {
        RateMode::Frequency => Kind::Frequency,
        RateMode::Period => Kind::Time,
    };
    if !pending(Field::Rate) {
        form.rate.show(&snap.rate);
    }
    if !pending(Field::Amplitude) {
        form.amplitude.show(&snap.amplitude);
    }
    if !pending(Field::Offset) {
        form.offset.show(&snap.offset);
    }
    if !pending(Field::Phase) {
        form.phase = snap.phase.clone();
    }
    if !pending(Field::Width) {
        form.width.show(&snap.pulse.width);
    }
    if !pending(Field::Rise) {
        form.rise.show(&snap.pulse.rise_time);
    }
    if !pending(Field::Fall) {
        form.fall.show(&snap.pulse.fall_time);
    }
    if !pending(Field::DualTone) {
        form.tone_a.show(&snap.dual_tone.first);
        form.tone_b.show(&snap.dual_tone.second);
    }
    for (i, order) in orders().enumerate() {
        if !pending(Field::HarmonicAmplitude(order)) {
            form.harmonic_amplitude[i] = snap.harmonics.amplitude_text[i].clone();
        }
        if !pending(Field::HarmonicPhase(order)) {
            form.harmonic_phase[i] = snap.harmonics.phase_text[i].clone();
        }
    }
}

// Field contents captured when the edit was made; parsed when the timer fires.
#[derive(Clone, Debug)]
struct FieldEdit {
    field: Field,
    texts: [String; 2],
    units: [&'static str; 2],
    rate_kind: Kind,
}

impl FieldEdit {
    fn capture(form: &ChannelForm, field: Field) -> Self {
        let one = |q: &Quantity| ([q.text.clone(), String::new()], [q.unit, ""]);
        let plain = |t: &String| ([t.clone(), String::new()], ["", ""]);
        let (texts, units) = match field {
            Field::Rate => one(&form.rate),
            Field::Amplitude => one(&form.amplitude),
            Field::Offset => one(&form.offset),
            Field::Phase => plain(&form.phase),
            Field::Width => one(&form.width),
            Field::Rise => one(&form.rise),
            Field::Fall => one(&form.fall),
            Field::DualTone => (
                [form.tone_a.text.clone(), form.tone_b.text.clone()],
                [form.tone_a.unit, form.tone_b.unit],
            ),
            Field::HarmonicAmplitude(order) => plain(&form.harmonic_amplitude[slot(order)]),
            Field::HarmonicPhase(order) => plain(&form.harmonic_phase[slot(order)]),
        };
        Self {
            field,
            texts,
            units,
            rate_kind: form.rate_kind,
        }
    }

    fn quantity(&self, i: usize, kind: Kind) -> Result<f64, GeneratorError> {
        units::parse_quantity(&self.texts[i], self.units[i], kind)
    }

    fn command(&self, ch: ChannelId) -> Result<GuiCommand, GeneratorError> {
        Ok(match self.field {
            Field::Rate => GuiCommand::SetRate(ch, self.quantity(0, self.rate_kind)?),
            Field::Amplitude => GuiCommand::SetAmplitude(ch, self.quantity(0, Kind::Voltage)?),
            Field::Offset => GuiCommand::SetOffset(ch, self.quantity(0, Kind::Voltage)?),
            Field::Phase => GuiCommand::SetPhase(ch, units::parse_number(&self.texts[0])?),
            Field::Width => GuiCommand::SetPulseWidth(ch, self.quantity(0, Kind::Time)?),
            Field::Rise => GuiCommand::SetRiseTime(ch, self.quantity(0, Kind::Time)?),
            Field::Fall => GuiCommand::SetFallTime(ch, self.quantity(0, Kind::Time)?),
            Field::DualTone => GuiCommand::SetDualTone(
                ch,
                self.quantity(0, Kind::Frequency)?,
                self.quantity(1, Kind::Frequency)?,
            ),
            Field::HarmonicAmplitude(order) => {
                GuiCommand::SetHarmonicAmplitude(ch, order, units::parse_number(&self.texts[0])?)
            }
            Field::HarmonicPhase(order) => {
                GuiCommand::SetHarmonicPhase(ch, order, units::parse_number(&self.texts[0])?)
            }
        })
    }
}

fn slot(order: u8) -> usize {
    (order - MIN_ORDER) as usize
}

/// Fields (text as shown) handed to the engine when the dual-tone mode flips.
/// Both are expressed in Hz so a single unit covers them.
fn dual_tone_fields(form: &ChannelForm) -> [String; 2] {
    let to_hz = |q: &Quantity| match units::parse_quantity(&q.text, q.unit, Kind::Frequency) {
        Ok(hz) => hz.to_string(),
        Err(_) => q.text.clone(),
    };
    [to_hz(&form.tone_a), to_hz(&form.tone_b)]
}

// Pending edits whose meaning a command changes.
fn superseded_fields(cmd: &GuiCommand) -> Vec<Field> {
    match cmd {
        GuiCommand::SetRateMode(..) => vec![Field::Rate],
        GuiCommand::SetAmplitudeMode(..) => vec![Field::Amplitude],
        GuiCommand::SwitchDualToneMode(..) => vec![Field::DualTone],
        GuiCommand::SetHarmonicAmplitudeMode(..) => orders().map(Field::HarmonicAmplitude).collect(),
        GuiCommand::SetWaveform(..) => vec![Field::Width, Field::Rise, Field::Fall, Field::DualTone],
        _ => Vec::new(),
    }
}

/// Fundamental plus enabled harmonics over two cycles, x in cycles, y in volts.
fn preview_points(snap: &ChannelSnapshot) -> Vec<[f64; 2]> {
    let half = snap.amplitude_vpp / 2.0;
    let harmonics = &snap.harmonics;
    (0..=PREVIEW_POINTS)
        .map(|i| {
            let x = PREVIEW_CYCLES * i as f64 / PREVIEW_POINTS as f64;
            let mut y = half * (TAU * x).sin();
            if harmonics.enabled {
                for (k, order) in orders().enumerate() {
                    if harmonics.orders[k] {
                        let phase = harmonics.phases[k].to_radians();
                        y += harmonics.volts[k] / 2.0 * (TAU * order as f64 * x + phase).sin();
                    }
                }
            }
            [x, y]
        })
        .collect()
}

enum UiAction {
    Edit(Field),
    Send(GuiCommand),
    FlipDualTone(DualToneMode),
}

fn quantity_row(
    ui: &mut egui::Ui,
    id: impl std::hash::Hash,
    label: &str,
    q: &mut Quantity,
    kind: Kind,
) -> bool {
    let mut changed = false;
    ui.horizontal(|ui| {
        ui.add_sized([90.0, 18.0], egui::Label::new(label));
        changed |= ui
            .add(egui::TextEdit::singleline(&mut q.text).desired_width(110.0))
            .changed();
        let before = q.unit;
        egui::ComboBox::from_id_source(id)
            .selected_text(q.unit)
            .width(60.0)
            .show_ui(ui, |ui| {
                for sym in kind.symbols() {
                    ui.selectable_value(&mut q.unit, sym, sym);
                }
            });
        changed |= q.unit != before;
    });
    changed
}

fn text_row(ui: &mut egui::Ui, label: &str, text: &mut String, suffix: &str) -> bool {
    ui.horizontal(|ui| {
        ui.add_sized([90.0, 18.0], egui::Label::new(label));
        let changed = ui
            .add(egui::TextEdit::singleline(text).desired_width(110.0))
            .changed();
        ui.label(suffix);
        changed
    })
    .inner
}

fn channel_ui(
    ui: &mut egui::Ui,
    ch: ChannelId,
    form: &mut ChannelForm,
    snap: &ChannelSnapshot,
    actions: &mut Vec<UiAction>,
) {
    let mut send = |cmd: GuiCommand| actions.push(UiAction::Send(cmd));
    ui.horizontal(|ui| {
        for family in WaveformFamily::ALL {
            if ui
                .selectable_label(snap.waveform == family, family.label())
                .clicked()
                && snap.waveform != family
            {
                send(GuiCommand::SetWaveform(ch, family));
            }
        }
    });
    ui.separator();

    let mut edits = Vec::new();
    ui.horizontal(|ui| {
        for (mode, label) in [(RateMode::Frequency, "Freq"), (RateMode::Period, "Period")] {
            if ui.selectable_label(snap.rate_mode == mode, label).clicked() && snap.rate_mode != mode {
                send(GuiCommand::SetRateMode(ch, mode));
            }
        }
    });
    let rate_label = match snap.rate_mode {
        RateMode::Frequency => "Frequency",
        RateMode::Period => "Period",
    };
    if quantity_row(ui, (ch, Field::Rate), rate_label, &mut form.rate, form.rate_kind) {
        edits.push(Field::Rate);
    }
    if let Some(derived) = &snap.derived_rate {
        ui.label(RichText::new(format!("= {} {}", derived.text, derived.unit)).color(Color32::GRAY));
    }
    ui.horizontal(|ui| {
        for mode in [AmplitudeMode::Vpp, AmplitudeMode::Vrms] {
            if ui.selectable_label(snap.amplitude_mode == mode, mode.label()).clicked()
                && snap.amplitude_mode != mode
            {
                send(GuiCommand::SetAmplitudeMode(ch, mode));
            }
        }
    });
    if quantity_row(ui, (ch, Field::Amplitude), "Amplitude", &mut form.amplitude, Kind::Voltage) {
        edits.push(Field::Amplitude);
    }
    if quantity_row(ui, (ch, Field::Offset), "Offset", &mut form.offset, Kind::Voltage) {
        edits.push(Field::Offset);
    }
    if text_row(ui, "Phase", &mut form.phase, "°") {
        edits.push(Field::Phase);
    }

    match snap.waveform {
        WaveformFamily::Pulse => {
            ui.separator();
            ui.label("PULSE");
            if quantity_row(ui, (ch, Field::Width), "Width", &mut form.width, Kind::Time) {
                edits.push(Field::Width);
            }
            if quantity_row(ui, (ch, Field::Rise), "Rise", &mut form.rise, Kind::Time) {
                edits.push(Field::Rise);
            }
            if quantity_row(ui, (ch, Field::Fall), "Fall", &mut form.fall, Kind::Time) {
                edits.push(Field::Fall);
            }
        }
        WaveformFamily::DualTone => {
            ui.separator();
            ui.label("DUAL TONE");
            let current = snap.dual_tone.mode;
            ui.horizontal(|ui| {
                for (mode, label) in [(DualToneMode::Direct, "F1 / F2"), (DualToneMode::CenterOffset, "Center / Offset")] {
                    if ui.selectable_label(current == mode, label).clicked() && current != mode {
                        actions.push(UiAction::FlipDualTone(mode));
                    }
                }
            });
            let (a, b) = match current {
                DualToneMode::Direct => ("F1", "F2"),
                DualToneMode::CenterOffset => ("Center", "Offset"),
            };
            let mut changed = quantity_row(ui, (ch, "tone_a"), a, &mut form.tone_a, Kind::Frequency);
            changed |= quantity_row(ui, (ch, "tone_b"), b, &mut form.tone_b, Kind::Frequency);
            if changed {
                edits.push(Field::DualTone);
            }
        }
        WaveformFamily::Harmonic => {
            ui.separator();
            harmonics_ui(ui, ch, form, snap, actions, &mut edits);
        }
        _ => {}
    }
    actions.extend(edits.into_iter().map(UiAction::Edit));
}

fn harmonics_ui(
    ui: &mut egui::Ui,
    ch: ChannelId,
    form: &mut ChannelForm,
    snap: &ChannelSnapshot,
    actions: &mut Vec<UiAction>,
    edits: &mut Vec<Field>,
) {
    let view = &snap.harmonics;
    ui.horizontal(|ui| {
        ui.label("HARMONICS");
        let mut on = view.enabled;
        if ui.checkbox(&mut on, "Output").changed() {
            actions.push(UiAction::Send(GuiCommand::SetHarmonicsEnabled(ch, on)));
        }
        for (mode, label) in [(HarmonicAmplitudeMode::Percentage, "%"), (HarmonicAmplitudeMode::Absolute, "V")] {
            if ui.selectable_label(view.mode == mode, label).clicked() && view.mode != mode {
                actions.push(UiAction::Send(GuiCommand::SetHarmonicAmplitudeMode(ch, mode)));
            }
        }
        if ui.button("APPLY").clicked() {
            actions.push(UiAction::Send(GuiCommand::ApplyHarmonics(ch)));
        }
    });
    let unit = match view.mode {
        HarmonicAmplitudeMode::Percentage => "%",
        HarmonicAmplitudeMode::Absolute => "V",
    };
    egui::Grid::new((ch, "harmonics")).striped(true).show(ui, |ui| {
        for (i, order) in orders().enumerate() {
            let mut on = view.orders[i];
            if ui.checkbox(&mut on, format!("H{order}")).changed() {
                actions.push(UiAction::Send(GuiCommand::SetHarmonicOrder(ch, order, on)));
            }
            if ui
                .add(egui::TextEdit::singleline(&mut form.harmonic_amplitude[i]).desired_width(70.0))
                .changed()
            {
                edits.push(Field::HarmonicAmplitude(order));
            }
            ui.label(unit);
            if ui
                .add(egui::TextEdit::singleline(&mut form.harmonic_phase[i]).desired_width(60.0))
                .changed()
            {
                edits.push(Field::HarmonicPhase(order));
            }
            ui.label("°");
            ui.end_row();
        }
    });
}

pub struct WavegenApp {
    config: AppConfig,
    is_connected: bool,
    connection_mode: ConnectionMode,
    selected: ChannelId,
    forms: [ChannelForm; 2],
    snapshots: [Option<ChannelSnapshot>; 2],
    debouncer: Debouncer<FieldKey>,
    log_messages: Vec<String>,
    rx: Receiver<EngineMessage>,
    tx_cmd: Sender<GuiCommand>,
}

impl WavegenApp {
    pub fn new(config: AppConfig) -> Self {
        let (tx, rx) = channel();
        let (tx_cmd, rx_cmd) = channel();
        engine::spawn_thread(tx, rx_cmd, config.clone());
        Self {
            is_connected: false,
            connection_mode: config.connection,
            selected: ChannelId::One,
            forms: Default::default(),
            snapshots: [None, None],
            debouncer: Debouncer::new(),
            log_messages: vec!["Waveform generator panel ready.".to_owned()],
            rx,
            tx_cmd,
            config,
        }
    }

    fn log(&mut self, msg: &str) {
        self.log_messages.push(format!("> {}", msg));
        if self.log_messages.len() > MAX_LOG_LINES {
            self.log_messages.remove(0);
        }
    }

    fn absorb(&mut self, snap: ChannelSnapshot) {
        let ch = snap.channel;
        let debouncer = &self.debouncer;
        sync_form(&mut self.forms[ch.index()], &snap, |field| debouncer.is_pending(&(ch, field)));
        self.snapshots[ch.index()] = Some(snap);
    }

    fn send(&mut self, cmd: GuiCommand) {
        if let Some(ch) = command_channel(&cmd) {
            for field in superseded_fields(&cmd) {
                self.debouncer.cancel(&(ch, field));
            }
        }
        self.tx_cmd.send(cmd).ok();
    }

    fn schedule(&mut self, ch: ChannelId, field: Field) {
        let edit = FieldEdit::capture(&self.forms[ch.index()], field);
        let tx = self.tx_cmd.clone();
        self.debouncer.schedule((ch, field), self.config.debounce(), move || {
            match edit.command(ch) {
                Ok(cmd) => {
                    tx.send(cmd).ok();
                }
                // the field reverts on the next snapshot
                Err(err) => debug!("{ch} ignoring input: {err}"),
            }
        });
    }

    fn perform(&mut self, ch: ChannelId, action: UiAction) {
        match action {
            UiAction::Edit(field) => self.schedule(ch, field),
            UiAction::Send(cmd) => self.send(cmd),
            UiAction::FlipDualTone(mode) => {
                let fields = dual_tone_fields(&self.forms[ch.index()]);
                self.send(GuiCommand::SwitchDualToneMode(ch, mode, fields, "Hz".to_owned()));
            }
        }
    }
}

fn command_channel(cmd: &GuiCommand) -> Option<ChannelId> {
    match cmd {
        GuiCommand::SetWaveform(ch, _)
        | GuiCommand::SetRateMode(ch, _)
        | GuiCommand::SetAmplitudeMode(ch, _)
        | GuiCommand::SwitchDualToneMode(ch, ..)
        | GuiCommand::SetHarmonicAmplitudeMode(ch, _) => Some(*ch),
        _ => None,
    }
}

impl Drop for WavegenApp {
    fn drop(&mut self) {
        self.tx_cmd.send(GuiCommand::Shutdown).ok();
    }
}

impl eframe::App for WavegenApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // 1. engine messages
        while let Ok(msg) = self.rx.try_recv() {
            match msg {
                EngineMessage::Log(s) => self.log(&s),
                EngineMessage::Status(b) => self.is_connected = b,
                EngineMessage::Snapshot(snap) => self.absorb(*snap),
            }
        }

        // 2. debounced edits whose quiet time has elapsed
        self.debouncer.fire_due(Instant::now());

        // 3. UI
        let mut actions = Vec::new();
        egui::SidePanel::left("L").min_width(260.0).show(ctx, |ui| {
            ui.add_space(10.0);
            ui.heading("Waveform Generator");
            ui.separator();
            ui.horizontal(|ui| {
                ui.selectable_value(&mut self.connection_mode, ConnectionMode::Simulation, "SIM");
                ui.selectable_value(&mut self.connection_mode, ConnectionMode::Visa, "VISA");
                ui.selectable_value(&mut self.connection_mode, ConnectionMode::Serial, "SERIAL");
            });
            let btn_txt = if self.is_connected { "DISCONNECT" } else { "CONNECT" };
            if ui.button(btn_txt).clicked() {
                if !self.is_connected {
                    actions.push(UiAction::Send(GuiCommand::Connect(self.connection_mode)));
                } else {
                    actions.push(UiAction::Send(GuiCommand::Disconnect));
                }
            }
            if self.is_connected && ui.button("REFRESH").clicked() {
                actions.push(UiAction::Send(GuiCommand::Refresh(self.selected)));
            }
            ui.add_space(10.0);
            ui.separator();
            egui::ScrollArea::vertical().stick_to_bottom(true).show(ui, |ui| {
                for m in &self.log_messages {
                    ui.monospace(m);
                }
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.horizontal(|ui| {
                for ch in ChannelId::ALL {
                    ui.selectable_value(&mut self.selected, ch, ch.to_string());
                }
            });
            ui.separator();
            let ch = self.selected;
            let Some(snap) = self.snapshots[ch.index()].as_ref() else {
                ui.label("Connect first.");
                return;
            };
            channel_ui(ui, ch, &mut self.forms[ch.index()], snap, &mut actions);
            ui.separator();
            if matches!(snap.waveform, WaveformFamily::Sine | WaveformFamily::Harmonic) {
                Plot::new("preview")
                    .view_aspect(2.5)
                    .allow_scroll(false)
                    .show(ui, |plot_ui| {
                        plot_ui.line(
                            Line::new(PlotPoints::new(preview_points(snap)))
                                .name(format!("{ch} preview"))
                                .color(Color32::from_rgb(0, 255, 255)),
                        );
                    });
            }
        });

        let ch = self.selected;
        for action in actions {
            self.perform(ch, action);
        }

        // keep polling: timers and engine replies arrive without input events
        let wait = self
            .debouncer
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .map_or(ENGINE_POLL, |d| d.min(ENGINE_POLL));
        ctx.request_repaint_after(wait);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::channel::ChannelSession;

    fn snapshot() -> ChannelSnapshot {
        ChannelSession::new(ChannelId::One).snapshot()
    }

    #[test]
    fn pending_fields_are_not_overwritten() {
        let mut form = ChannelForm::default();
        form.rate.text = "12".to_owned();
        form.amplitude.text = "9".to_owned();
        sync_form(&mut form, &snapshot(), |field| field == Field::Rate);
        assert_eq!(form.rate.text, "12");
        assert_eq!(form.amplitude.text, "1.000");
        assert_eq!(form.amplitude.unit, "V");
    }

    #[test]
    fn edit_parses_with_its_unit() {
        let mut form = ChannelForm::default();
        form.rate.text = "2.5".to_owned();
        form.rate.unit = "kHz";
        let cmd = FieldEdit::capture(&form, Field::Rate).command(ChannelId::Two).unwrap();
        assert!(matches!(cmd, GuiCommand::SetRate(ChannelId::Two, v) if v == 2500.0));
        form.tone_a.text = "1".to_owned();
        form.tone_a.unit = "kHz";
        form.tone_b.text = "1500".to_owned();
        let cmd = FieldEdit::capture(&form, Field::DualTone).command(ChannelId::One).unwrap();
        assert!(matches!(cmd, GuiCommand::SetDualTone(_, a, b) if a == 1000.0 && b == 1500.0));
    }

    #[test]
    fn unparsable_edit_is_rejected() {
        let mut form = ChannelForm::default();
        form.harmonic_phase[1] = "abc".to_owned();
        let err = FieldEdit::capture(&form, Field::HarmonicPhase(3))
            .command(ChannelId::One)
            .unwrap_err();
        assert_eq!(err, GeneratorError::Unparsable("abc".into()));
    }

    #[test]
    fn dual_tone_fields_are_sent_in_hertz() {
        let mut form = ChannelForm::default();
        form.tone_a = Quantity { text: "1.5".into(), unit: "kHz" };
        form.tone_b = Quantity { text: "oops".into(), unit: "Hz" };
        assert_eq!(dual_tone_fields(&form), ["1500".to_string(), "oops".to_string()]);
    }

    #[test]
    fn preview_adds_enabled_harmonics() {
        let mut snap = snapshot();
        let plain = preview_points(&snap);
        assert_eq!(plain.len(), PREVIEW_POINTS + 1);
        // quarter cycle of a 1 Vpp sine
        assert!((plain[PREVIEW_POINTS / 8][1] - 0.5).abs() < 1e-9);
        snap.harmonics.enabled = true;
        snap.harmonics.orders[0] = true;
        snap.harmonics.volts[0] = 0.2;
        let mixed = preview_points(&snap);
        // second harmonic is at a zero crossing at a quarter cycle
        assert!((mixed[PREVIEW_POINTS / 8][1] - 0.5).abs() < 1e-9);
        assert!((mixed[PREVIEW_POINTS / 16][1] - plain[PREVIEW_POINTS / 16][1] - 0.1).abs() < 1e-9);
    }

    #[test]
    fn mode_changes_cancel_stale_edits() {
        assert_eq!(
            superseded_fields(&GuiCommand::SetRateMode(ChannelId::One, RateMode::Period)),
            vec![Field::Rate]
        );
        assert_eq!(
            superseded_fields(&GuiCommand::SetHarmonicAmplitudeMode(
                ChannelId::One,
                HarmonicAmplitudeMode::Absolute
            ))
            .len(),
            7
        );
        assert!(superseded_fields(&GuiCommand::SetOffset(ChannelId::One, 0.0)).is_empty());
    }
}
