//! RTP packet framing, the port allocator and the per-dialog RTP engine.

pub mod engine;
pub mod error;
pub mod packet;
pub mod payload_type;
pub mod port_allocator;
pub mod queue;

pub use engine::{RtpEngine, RtpStats};
pub use error::{Result, RtpError};
pub use packet::RtpPacket;
pub use payload_type::PayloadType;
pub use port_allocator::PortAllocator;
pub use queue::AudioQueue;
