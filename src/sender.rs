use std::net::{SocketAddr, UdpSocket};
use std::sync::Mutex;
use fxhash::FxHashMap;

use super::constants::*;
use super::element::{Element, Header};
use super::error::{FrameError, SenderError};
use super::frame_buffer::FrameBuffer;
use super::run_id::RunId;

#[derive(Debug)]
struct SenderState {
    run_id: RunId,
    sequence: FxHashMap<u32, u32>,
    frames_sent: u64,
    bytes_sent: u64
}

/// # FrameSender
/// Packs records into datagram sized frames and sends them to a single UDP target.
/// One lock spans a whole send call, so frames of concurrent callers never interleave
/// within a batch.
#[derive(Debug)]
pub struct FrameSender {
    socket: UdpSocket,
    target: SocketAddr,
    max_datagram_size: usize,
    state: Mutex<SenderState>
}

impl FrameSender {

    pub fn new(target: SocketAddr, run_id: RunId, max_datagram_size: usize) -> Result<Self, SenderError> {
        let bind_addr = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr)?;
        Ok( Self {
            socket,
            target,
            max_datagram_size,
            state: Mutex::new(SenderState { run_id, sequence: FxHashMap::default(), frames_sent: 0, bytes_sent: 0 })
        } )
    }

    pub fn get_run_id(&self) -> RunId {
        match self.state.lock() {
            Ok(state) => state.run_id,
            Err(poisoned) => poisoned.into_inner().run_id
        }
    }

    /// Stamp subsequent frames with a new run
    pub fn set_run_id(&self, run_id: RunId) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner()
        };
        state.run_id = run_id;
    }

    /// Frames and bytes sent since creation
    pub fn get_stats(&self) -> (u64, u64) {
        let state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner()
        };
        (state.frames_sent, state.bytes_sent)
    }

    /// Send one generation of records, split over as many frames as needed.
    /// Returns the number of frames sent. A generation holding a record too large for any
    /// frame is rejected before anything is sent.
    pub fn send<E: Element>(&self, elements: &[E], digitizer_id: u32, global_time: u64) -> Result<usize, SenderError> {
        let mut frame: FrameBuffer<E> = FrameBuffer::new(self.max_datagram_size);
        if let Some(element) = elements.iter().find(|e| !frame.can_ever_hold(e.size())) {
            return Err(SenderError::ElementTooLarge(element.size(), self.max_datagram_size.saturating_sub(HEADER_SIZE)));
        }

        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner()
        };
        let mut n_frames = 0;
        for element in elements.iter() {
            match frame.push(element) {
                Ok(()) => (),
                Err(FrameError::CapacityExceeded(_, _)) => {
                    self.transmit(&mut frame, &mut state, digitizer_id, global_time)?;
                    n_frames += 1;
                    frame.push(element)?;
                }
                Err(e) => return Err(SenderError::from(e))
            }
        }
        if !frame.is_empty() {
            self.transmit(&mut frame, &mut state, digitizer_id, global_time)?;
            n_frames += 1;
        }
        Ok(n_frames)
    }

    fn transmit<E: Element>(&self, frame: &mut FrameBuffer<E>, state: &mut SenderState, digitizer_id: u32, global_time: u64) -> Result<(), SenderError> {
        let seq_num = state.sequence.entry(digitizer_id).or_insert(0);
        let header = Header {
            run_id: state.run_id.get_value(),
            global_time,
            digitizer_id,
            seq_num: *seq_num,
            version: FORMAT_VERSION,
            ..Default::default()
        };
        *seq_num = seq_num.wrapping_add(1);
        let datagram = frame.finish(&header)?;
        self.socket.send_to(datagram, self.target)?;
        state.frames_sent += 1;
        state.bytes_sent += datagram.len() as u64;
        frame.clear();
        Ok(())
    }
}
