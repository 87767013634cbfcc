// src/drivers/mod.rs
pub mod channel;
pub mod dual_tone;
pub mod error;
pub mod harmonics;
pub mod pulse;
pub mod scpi;
pub mod serial;
pub mod simulator;
pub mod transport;
pub mod units;
pub mod visa;
pub use channel::ChannelSession;
pub use error::GeneratorError;
pub use simulator::SimulatedGenerator;
pub use transport::{DeviceTransport, Pacer};
