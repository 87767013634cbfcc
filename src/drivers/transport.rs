#[cfg(test)]
use std::collections::{HashMap, VecDeque};
use std::thread;
use std::time::Duration;
use log::debug;
use crate::drivers::GeneratorError;
/// Blocking, FIFO-ordered request/response link to the instrument.
pub trait DeviceTransport {
    fn send(&mut self, command: &str) -> Result<(), GeneratorError>;
    fn query(&mut self, command: &str) -> Result<String, GeneratorError>;
}
impl<T: DeviceTransport + ?Sized> DeviceTransport for Box<T> {
    fn send(&mut self, command: &str) -> Result<(), GeneratorError> {
        (**self).send(command)
    }
    fn query(&mut self, command: &str) -> Result<String, GeneratorError> {
        (**self).query(command)
    }
}
/// Issues commands with the mandatory settling pause after each one.
#[derive(Clone, Copy, Debug)]
pub struct Pacer {
    settle: Duration,
}
impl Pacer {
    pub fn new(settle: Duration) -> Self {
        Self { settle }
    }
    /// No pause; for in-memory transports.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO)
    }
    fn pause(&self) {
        if !self.settle.is_zero() {
            thread::sleep(self.settle);
        }
    }
    pub fn send(&self, device: &mut dyn DeviceTransport, command: &str) -> Result<(), GeneratorError> {
        debug!("-> {command}");
        let result = device.send(command);
        self.pause();
        result
    }
    pub fn query(&self, device: &mut dyn DeviceTransport, command: &str) -> Result<String, GeneratorError> {
        debug!("-> {command}");
        let reply = device.query(command);
        self.pause();
        if let Ok(text) = &reply {
            debug!("<- {}", text.trim());
        }
        reply
    }
    /// Queries and parses a numeric reply.
    pub fn query_number(&self, device: &mut dyn DeviceTransport, command: &str) -> Result<f64, GeneratorError> {
        let reply = self.query(device, command)?;
        crate::drivers::scpi::parse_reply(&reply).ok_or(GeneratorError::Unparsable(reply))
    }
}
/// One exchange seen by a [`RecordingTransport`].
#[cfg(test)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Exchange {
    Sent(String),
    Queried(String),
}
/// In-memory transport useful for tests: records traffic and answers queries
/// from canned replies.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingTransport {
    pub log: Vec<Exchange>,
    replies: HashMap<String, VecDeque<String>>,
    defaults: HashMap<String, String>,
    fail_after: Option<usize>,
}
#[cfg(test)]
impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }
    /// Reply used every time `command` is queried.
    pub fn reply(mut self, command: &str, reply: &str) -> Self {
        self.defaults.insert(command.to_string(), reply.to_string());
        self
    }
    /// Reply used once, ahead of any default for the same query.
    pub fn reply_once(mut self, command: &str, reply: &str) -> Self {
        self.replies
            .entry(command.to_string())
            .or_default()
            .push_back(reply.to_string());
        self
    }
    /// Every exchange after the first `count` fails with a transport error.
    pub fn fail_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }
    pub fn sent(&self) -> Vec<&str> {
        self.log
            .iter()
            .filter_map(|e| match e {
                Exchange::Sent(cmd) => Some(cmd.as_str()),
                Exchange::Queried(_) => None,
            })
            .collect()
    }
    fn check_budget(&self) -> Result<(), GeneratorError> {
        match self.fail_after {
            Some(limit) if self.log.len() >= limit => {
                Err(GeneratorError::Transport("link dropped".into()))
            }
            _ => Ok(()),
        }
    }
}
#[cfg(test)]
impl DeviceTransport for RecordingTransport {
    fn send(&mut self, command: &str) -> Result<(), GeneratorError> {
        self.check_budget()?;
        self.log.push(Exchange::Sent(command.to_string()));
        Ok(())
    }
    fn query(&mut self, command: &str) -> Result<String, GeneratorError> {
        self.check_budget()?;
        self.log.push(Exchange::Queried(command.to_string()));
        if let Some(reply) = self.replies.get_mut(command).and_then(|q| q.pop_front()) {
            return Ok(reply);
        }
        self.defaults
            .get(command)
            .cloned()
            .ok_or_else(|| GeneratorError::Transport(format!("no reply for {command}")))
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn recording_transport_prefers_one_shot_replies() {
        let mut dev = RecordingTransport::new()
            .reply("A?", "1")
            .reply_once("A?", "2");
        assert_eq!(dev.query("A?").unwrap(), "2");
        assert_eq!(dev.query("A?").unwrap(), "1");
        assert!(dev.query("B?").is_err());
    }
    #[test]
    fn failure_budget_stops_traffic() {
        let mut dev = RecordingTransport::new().fail_after(1);
        dev.send("X").unwrap();
        assert!(matches!(dev.send("Y"), Err(GeneratorError::Transport(_))));
        assert_eq!(dev.sent(), vec!["X"]);
    }
    #[test]
    fn pacer_parses_numeric_replies() {
        let mut dev = RecordingTransport::new().reply("V?", "2.0\n").reply("W?", "n/a");
        let pacer = Pacer::immediate();
        assert_eq!(pacer.query_number(&mut dev, "V?").unwrap(), 2.0);
        assert!(matches!(
            pacer.query_number(&mut dev, "W?"),
            Err(GeneratorError::Unparsable(_))
        ));
    }
    #[test]
    fn pacer_waits_between_commands() {
        let mut dev = RecordingTransport::new();
        let pacer = Pacer::new(Duration::from_millis(5));
        let started = std::time::Instant::now();
        pacer.send(&mut dev, "A").unwrap();
        pacer.send(&mut dev, "B").unwrap();
        assert!(started.elapsed() >= Duration::from_millis(10));
    }
}
