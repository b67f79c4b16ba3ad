//! Datagram sources

mod replay;
mod udp;

pub use replay::ReplayProvider;
pub use udp::{FrameSender, UdpProvider};
