use std::net::{ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use fxhash::{FxHashMap, FxHashSet};
use human_bytes::human_bytes;

use super::config::Config;
use super::constants::*;
use super::element::{ElementBatch, Header};
use super::error::{ProtocolError, ReceiverError};
use super::run_id::RunId;
use super::sink::Sink;

/// What happened to a frame that passed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    Accepted,
    Stale
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    pub frames_received: u64,
    pub frames_accepted: u64,
    pub frames_rejected: u64,
    pub frames_stale: u64,
    pub frames_lost: u64,
    pub bytes_received: u64,
    pub records_written: u64,
    pub write_failures: u64
}

impl ReceiverStats {
    pub fn log_summary(&self) {
        log::info!("Received {} frames ({}), accepted {}, rejected {}, stale {}, lost {}",
            self.frames_received, human_bytes(self.bytes_received as f64), self.frames_accepted,
            self.frames_rejected, self.frames_stale, self.frames_lost);
        log::info!("Wrote {} records with {} failed writes", self.records_written, self.write_failures);
    }
}

#[derive(Debug)]
struct DigitizerState {
    global_time: u64,
    batch: Option<ElementBatch>,
    next_seq: Option<u32>
}

impl DigitizerState {
    fn track_sequence(&mut self, seq_num: u32, stats: &mut ReceiverStats) {
        if let Some(expected) = self.next_seq {
            let gap = seq_num.wrapping_sub(expected);
            //Anything behind the expected number is a duplicate or reorder, not a loss
            if gap != 0 && gap < u32::MAX / 2 {
                stats.frames_lost += gap as u64;
            }
        }
        self.next_seq = Some(seq_num.wrapping_add(1));
    }
}

/// # Reassembler
/// Gathers frames into generations per digitizer and hands complete generations to a sink.
/// A generation is complete once any digitizer moves past it. Frames older than their
/// digitizer's current generation are dropped, and a new run id flushes everything of the
/// old run before the sink is split. Runs that were replaced never come back; their late
/// frames are stale.
#[derive(Debug)]
pub struct Reassembler {
    sink: Sink,
    run_id: Option<u64>,
    retired_runs: FxHashSet<u64>,
    digitizers: FxHashMap<u32, DigitizerState>,
    sort: bool,
    stats: ReceiverStats
}

impl Reassembler {

    pub fn new(sink: Sink, sort: bool) -> Self {
        Reassembler { sink, run_id: None, retired_runs: FxHashSet::default(), digitizers: FxHashMap::default(), sort, stats: ReceiverStats::default() }
    }

    pub fn get_stats(&self) -> &ReceiverStats {
        &self.stats
    }

    pub fn get_run_id(&self) -> Option<u64> {
        self.run_id
    }

    pub fn handle_frame(&mut self, frame: &[u8]) -> Result<FrameDisposition, ProtocolError> {
        self.stats.frames_received += 1;
        self.stats.bytes_received += frame.len() as u64;
        match self.process_frame(frame) {
            Ok(disposition) => {
                match disposition {
                    FrameDisposition::Accepted => self.stats.frames_accepted += 1,
                    FrameDisposition::Stale => self.stats.frames_stale += 1
                }
                Ok(disposition)
            }
            Err(e) => {
                self.stats.frames_rejected += 1;
                Err(e)
            }
        }
    }

    fn process_frame(&mut self, frame: &[u8]) -> Result<FrameDisposition, ProtocolError> {
        let header = Header::read_from(frame)?;
        let element_type = header.validate()?;
        let mut incoming = ElementBatch::new(element_type);
        incoming.extend_from_payload(&frame[HEADER_SIZE..], header.num_elements)?;

        match self.run_id {
            None => self.adopt(header.run_id),
            Some(current) if current == header.run_id => (),
            Some(_) if self.retired_runs.contains(&header.run_id) => {
                log::warn!("Frame of finished run {} from digitizer {}, dropping {} records",
                    RunId(header.run_id), header.digitizer_id, header.num_elements);
                return Ok(FrameDisposition::Stale);
            }
            Some(_) => self.rotate(header.run_id)
        }

        if !self.digitizers.contains_key(&header.digitizer_id) {
            log::info!("New digitizer {} sending {}", header.digitizer_id, element_type);
            if let Err(e) = self.sink.add_digitizer(header.digitizer_id) {
                log::error!("Sink could not add digitizer {}: {}", header.digitizer_id, e);
            }
            self.digitizers.insert(header.digitizer_id, DigitizerState { global_time: header.global_time, batch: None, next_seq: None });
        }

        let previous_time = match self.digitizers.get(&header.digitizer_id) {
            Some(state) => state.global_time,
            None => return Ok(FrameDisposition::Stale)
        };

        if header.global_time < previous_time {
            log::warn!("Digitizer {} sent stale generation {} behind {}, dropping {} records",
                header.digitizer_id, header.global_time, previous_time, header.num_elements);
            if let Some(state) = self.digitizers.get_mut(&header.digitizer_id) {
                state.track_sequence(header.seq_num, &mut self.stats);
            }
            return Ok(FrameDisposition::Stale);
        }
        if header.global_time > previous_time {
            self.flush_through(previous_time);
            if let Some(state) = self.digitizers.get_mut(&header.digitizer_id) {
                state.global_time = header.global_time;
            }
        }

        if let Some(state) = self.digitizers.get_mut(&header.digitizer_id) {
            match state.batch {
                None => state.batch = Some(incoming),
                Some(ref mut pending) => {
                    let pending_type = pending.element_type();
                    if pending.append(incoming).is_err() {
                        return Err(ProtocolError::MixedElementTypes(header.digitizer_id, pending_type.code(), element_type.code()));
                    }
                }
            }
            state.track_sequence(header.seq_num, &mut self.stats);
        }
        Ok(FrameDisposition::Accepted)
    }

    /// Write every pending generation at or before the given time
    fn flush_through(&mut self, time: u64) {
        let mut ready = Vec::new();
        for (id, state) in self.digitizers.iter_mut() {
            if state.global_time <= time {
                if let Some(batch) = state.batch.take() {
                    ready.push((*id, state.global_time, batch));
                }
            }
        }
        ready.sort_by_key(|(id, time, _)| (*time, *id));
        for (id, time, batch) in ready {
            self.write_generation(id, time, batch);
        }
    }

    fn write_generation(&mut self, digitizer_id: u32, time: u64, mut batch: ElementBatch) {
        if self.sort {
            batch.sort();
        }
        match self.sink.write_batch(&batch, digitizer_id, time) {
            Ok(()) => self.stats.records_written += batch.len() as u64,
            Err(e) => {
                log::error!("Sink failed to write digitizer {} generation {}, dropping {} records: {}", digitizer_id, time, batch.len(), e);
                self.stats.write_failures += 1;
            }
        }
    }

    //First run seen. The sink is relabelled unless it already carries this run.
    fn adopt(&mut self, run: u64) {
        log::info!("Adopting run {}", RunId(run));
        if self.sink.get_run_id() != Some(RunId(run)) {
            if let Err(e) = self.sink.split(RunId(run)) {
                log::error!("Sink could not split for run {}: {}", RunId(run), e);
            }
        }
        self.run_id = Some(run);
    }

    fn rotate(&mut self, new_run: u64) {
        log::info!("Run {} replaced by run {}", RunId(self.run_id.unwrap_or_default()), RunId(new_run));
        self.flush_through(u64::MAX);
        self.digitizers.clear();
        if let Some(old_run) = self.run_id {
            self.retired_runs.insert(old_run);
        }
        if let Err(e) = self.sink.split(RunId(new_run)) {
            log::error!("Sink could not split for run {}: {}", RunId(new_run), e);
        }
        self.run_id = Some(new_run);
    }

    /// Flush everything still pending. Call once at shutdown.
    pub fn finish(&mut self) -> ReceiverStats {
        self.flush_through(u64::MAX);
        self.stats.log_summary();
        self.stats.clone()
    }
}

/// # Receiver
/// Blocking UDP receive loop feeding a Reassembler. The read timeout bounds how long a stop
/// request can go unnoticed.
#[derive(Debug)]
pub struct Receiver {
    socket: UdpSocket,
    reassembler: Reassembler,
    buffer: Vec<u8>
}

impl Receiver {

    pub fn bind(config: &Config, sink: Sink) -> Result<Self, ReceiverError> {
        let address = config.get_listen_address();
        let resolved = match address.to_socket_addrs()?.next() {
            Some(addr) => addr,
            None => return Err(ReceiverError::BadAddress(address))
        };
        let socket = UdpSocket::bind(resolved)?;
        socket.set_read_timeout(Some(Duration::from_millis(config.receive_timeout_ms.max(1))))?;
        log::info!("Receiver listening on {} with {} sink", socket.local_addr()?, sink.get_name());
        Ok( Self {
            socket,
            reassembler: Reassembler::new(sink, config.sort),
            buffer: vec![0; MAX_RECEIVE_SIZE]
        } )
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ReceiverError> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive until the stop flag is raised. Pending generations are flushed on the way out,
    /// including when a transport error ends the loop.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<ReceiverStats, ReceiverError> {
        while !stop.load(Ordering::Relaxed) {
            match self.socket.recv(&mut self.buffer) {
                Ok(size) => {
                    if let Err(e) = self.reassembler.handle_frame(&self.buffer[..size]) {
                        log::warn!("Dropped frame: {}", e);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => {
                    log::error!("Receive failed: {}", e);
                    self.reassembler.finish();
                    return Err(ReceiverError::from(e));
                }
            }
        }
        Ok(self.reassembler.finish())
    }
}
