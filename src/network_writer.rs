use std::net::SocketAddr;

use super::element::Element;
use super::error::SinkError;
use super::run_id::RunId;
use super::sender::FrameSender;

/// # NetworkWriter
/// Forwards generations to another receiver by re-framing them with a FrameSender.
#[derive(Debug)]
pub struct NetworkWriter {
    sender: FrameSender
}

impl NetworkWriter {

    pub fn new(target: SocketAddr, run_id: RunId, max_datagram_size: usize) -> Result<Self, SinkError> {
        let sender = FrameSender::new(target, run_id, max_datagram_size)?;
        log::info!("Forwarding frames to {}", target);
        Ok(NetworkWriter { sender })
    }

    pub fn get_sender(&self) -> &FrameSender {
        &self.sender
    }

    pub fn get_run_id(&self) -> RunId {
        self.sender.get_run_id()
    }

    /// Subsequent frames carry the new run id, which makes the downstream receiver rotate
    pub fn split(&self, run_id: RunId) -> Result<(), SinkError> {
        self.sender.set_run_id(run_id);
        Ok(())
    }

    pub fn write<E: Element>(&self, elements: &[E], digitizer_id: u32, timestamp: u64) -> Result<(), SinkError> {
        self.sender.send(elements, digitizer_id, timestamp)?;
        Ok(())
    }
}
