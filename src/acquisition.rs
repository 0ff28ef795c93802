use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use fxhash::FxHashMap;

use super::aggregate::AggregateDecoder;
use super::element::{ElementBatch, ElementType};
use super::error::{BoardError, DecodeError};
use super::sink::Sink;

/// # DigitizerBoard
/// The capabilities the acquisition needs from a board. The vendor binding implementing this
/// is picked once at startup.
pub trait DigitizerBoard {
    fn open_handle(&mut self) -> Result<(), BoardError>;
    fn read_register(&self, address: u32) -> Result<u32, BoardError>;
    fn write_register(&mut self, address: u32, value: u32) -> Result<(), BoardError>;
    /// Fill the buffer with one readout, returning the number of bytes
    fn poll_buffer(&mut self, buffer: &mut Vec<u8>) -> Result<usize, BoardError>;
    fn digitizer_id(&self) -> u32;
    /// Whether the board runs with extended time tags and baselines
    fn is_extended(&self) -> bool;
}

fn now_ms() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_millis() as u64,
        Err(_) => 0
    }
}

//Decode a whole readout into one batch, or reject all of it. The first event fixes the
//record kind; an event with a different layout is a LayoutMismatch.
fn decode_batch(buffer: &[u8], extended: bool) -> Result<Option<ElementBatch>, DecodeError> {
    let mut batch: Option<ElementBatch> = None;
    for item in AggregateDecoder::new(buffer) {
        let (_, event) = item?;
        match batch {
            Some(ref mut pending) => pending.push_event(&event)?,
            None => {
                let mut first = ElementBatch::new(ElementType::for_layout(extended, event.has_waveform()));
                first.push_event(&event)?;
                batch = Some(first);
            }
        }
    }
    Ok(batch)
}

/// # AcquisitionHandler
/// Entry point for a polling loop: decodes a raw readout and hands the records to a sink,
/// stamped with a per-digitizer global time that never goes backwards.
#[derive(Debug)]
pub struct AcquisitionHandler {
    sink: Arc<Sink>,
    clocks: FxHashMap<u32, u64>,
    buffer: Vec<u8>,
    corrupt_buffers: u64
}

impl AcquisitionHandler {

    pub fn new(sink: Arc<Sink>) -> Self {
        AcquisitionHandler { sink, clocks: FxHashMap::default(), buffer: Vec::new(), corrupt_buffers: 0 }
    }

    pub fn get_corrupt_buffers(&self) -> u64 {
        self.corrupt_buffers
    }

    /// Returns the number of records handed to the sink
    pub fn handle_poll(&mut self, buffer: &[u8], digitizer_id: u32, extended: bool) -> usize {
        self.handle_poll_at(buffer, digitizer_id, extended, now_ms())
    }

    /// Same as handle_poll with an explicit wall clock reading in milliseconds
    pub fn handle_poll_at(&mut self, buffer: &[u8], digitizer_id: u32, extended: bool, now: u64) -> usize {
        let batch = match decode_batch(buffer, extended) {
            Ok(Some(batch)) => batch,
            Ok(None) => return 0,
            Err(e) => {
                log::error!("Digitizer {} readout of {} bytes is corrupt, discarding it: {}", digitizer_id, buffer.len(), e);
                self.corrupt_buffers += 1;
                return 0;
            }
        };

        let clock = self.clocks.entry(digitizer_id).or_insert(0);
        *clock = now.max(*clock);
        let global_time = *clock;

        match self.sink.write_batch(&batch, digitizer_id, global_time) {
            Ok(()) => batch.len(),
            Err(e) => {
                log::error!("Sink failed on {} records from digitizer {}: {}", batch.len(), digitizer_id, e);
                0
            }
        }
    }

    /// Read one buffer from the board and handle it
    pub fn poll_board<B: DigitizerBoard>(&mut self, board: &mut B) -> Result<usize, BoardError> {
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.clear();
        let result = board.poll_buffer(&mut buffer);
        let handed = match result {
            Ok(size) => {
                let size = size.min(buffer.len());
                Ok(self.handle_poll(&buffer[..size], board.digitizer_id(), board.is_extended()))
            }
            Err(e) => Err(e)
        };
        self.buffer = buffer;
        handed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::net::UdpSocket;
    use std::time::Duration;
    use crate::aggregate::test_support::*;
    use crate::config::{Backend, Config};
    use crate::constants::*;
    use crate::network_writer::NetworkWriter;
    use crate::receiver::Reassembler;
    use crate::run_id::RunId;

    struct MockBoard {
        id: u32,
        extended: bool,
        is_open: bool,
        registers: FxHashMap<u32, u32>,
        readouts: VecDeque<Vec<u8>>
    }

    impl DigitizerBoard for MockBoard {
        fn open_handle(&mut self) -> Result<(), BoardError> {
            self.is_open = true;
            Ok(())
        }

        fn read_register(&self, address: u32) -> Result<u32, BoardError> {
            if !self.is_open {
                return Err(BoardError::NotOpen(self.id));
            }
            self.registers.get(&address).copied().ok_or(BoardError::RegisterAccess(address, String::from("unmapped")))
        }

        fn write_register(&mut self, address: u32, value: u32) -> Result<(), BoardError> {
            if !self.is_open {
                return Err(BoardError::NotOpen(self.id));
            }
            self.registers.insert(address, value);
            Ok(())
        }

        fn poll_buffer(&mut self, buffer: &mut Vec<u8>) -> Result<usize, BoardError> {
            match self.readouts.pop_front() {
                Some(readout) => {
                    buffer.extend_from_slice(&readout);
                    Ok(readout.len())
                }
                None => Err(BoardError::Readout(String::from("no data")))
            }
        }

        fn digitizer_id(&self) -> u32 {
            self.id
        }

        fn is_extended(&self) -> bool {
            self.extended
        }
    }

    fn null_sink() -> Arc<Sink> {
        Arc::new(Sink::Null(Default::default()))
    }

    fn compact_readout(n_events: u32) -> Vec<u8> {
        let slots: Vec<SlotSpec> = (0..n_events).map(|i| SlotSpec::new(i, 0, 1)).collect();
        to_bytes(&board_words(&[(0, group_words(false, 0, &slots))]))
    }

    #[test]
    fn compact_readout_is_handed_on() {
        let sink = null_sink();
        let mut handler = AcquisitionHandler::new(sink.clone());
        assert_eq!(handler.handle_poll(&compact_readout(6), 1, false), 6);
        match sink.as_ref() {
            Sink::Null(null) => assert_eq!(null.get_records(), 6),
            _ => panic!("Expected the null sink")
        }
    }

    #[test]
    fn corrupt_readout_is_discarded_whole() {
        let mut handler = AcquisitionHandler::new(null_sink());
        let mut bytes = compact_readout(3);
        //Board header claims one word more than the buffer holds
        bytes[0] = bytes[0].wrapping_add(1);
        assert_eq!(handler.handle_poll(&bytes, 1, false), 0);
        //Compact records cannot come from a group with extras
        let mut slot = SlotSpec::new(1, 0, 1);
        slot.extras = Some((0, 0));
        let extended = to_bytes(&board_words(&[(0, group_words(true, 0, &[slot]))]));
        assert_eq!(handler.handle_poll(&extended, 1, false), 0);
        assert_eq!(handler.get_corrupt_buffers(), 2);
        assert_eq!(handler.handle_poll(&extended, 1, true), 1);
    }

    #[test]
    fn global_time_never_goes_backwards() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config { backend: Backend::Text, output_path: dir.path().to_path_buf(), ..Default::default() };
        let sink = Arc::new(Sink::from_config(&config, RunId(4)).unwrap());
        let mut handler = AcquisitionHandler::new(sink);
        handler.handle_poll_at(&compact_readout(1), 2, false, 1000);
        handler.handle_poll_at(&compact_readout(1), 2, false, 900);
        handler.handle_poll_at(&compact_readout(1), 2, false, 1100);

        let text = std::fs::read_to_string(config.get_output_file(&RunId(4), "txt")).unwrap();
        let stamps: Vec<&str> = text.lines().filter(|l| l.starts_with('@')).collect();
        assert_eq!(stamps, vec!["@1000", "@1000", "@1100"]);
    }

    fn waveform_slot(time: u32) -> SlotSpec {
        let mut slot = SlotSpec::new(time, 1, 10);
        slot.waveform_words = vec![0; 4];
        slot
    }

    #[test]
    fn waveform_groups_select_waveform_records() {
        let words = board_words(&[(0, group_words(false, 1, &[waveform_slot(5)])), (1, group_words(false, 1, &[waveform_slot(6)]))]);
        let batch = decode_batch(&to_bytes(&words), false).unwrap().unwrap();
        assert_eq!(batch.element_type(), ElementType::Waveform422);
        assert_eq!(batch.len(), 2);
        assert!(decode_batch(&[], false).unwrap().is_none());
    }

    #[test]
    fn mixed_waveform_readout_is_discarded_whole() {
        let words = board_words(&[(0, group_words(false, 1, &[waveform_slot(5)])), (1, group_words(false, 0, &[SlotSpec::new(6, 1, 11)]))]);
        let mixed = to_bytes(&words);
        assert!(matches!(decode_batch(&mixed, false), Err(DecodeError::LayoutMismatch(3, false, false))));

        let listener = UdpSocket::bind("127.0.0.1:0").unwrap();
        listener.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
        let forward = NetworkWriter::new(listener.local_addr().unwrap(), RunId(5), DEFAULT_MAX_DATAGRAM_SIZE).unwrap();
        let mut handler = AcquisitionHandler::new(Arc::new(Sink::Network(forward)));
        assert_eq!(handler.handle_poll_at(&mixed, 2, false, 100), 0);
        assert_eq!(handler.get_corrupt_buffers(), 1);
        let pure = to_bytes(&board_words(&[(0, group_words(false, 1, &[waveform_slot(7), waveform_slot(8)]))]));
        assert_eq!(handler.handle_poll_at(&pure, 2, false, 101), 2);

        let mut reassembler = Reassembler::new(Sink::Null(Default::default()), false);
        let mut buffer = vec![0u8; MAX_RECEIVE_SIZE];
        while let Ok(size) = listener.recv(&mut buffer) {
            reassembler.handle_frame(&buffer[..size]).unwrap();
        }
        let stats = reassembler.finish();
        assert_eq!(stats.frames_accepted, 1);
        assert_eq!(stats.frames_rejected, 0);
        assert_eq!(stats.records_written, 2);
    }

    #[test]
    fn polls_mock_board() {
        let mut board = MockBoard { id: 7, extended: false, is_open: false, registers: FxHashMap::default(), readouts: VecDeque::from(vec![compact_readout(2), compact_readout(5)]) };
        assert!(matches!(board.write_register(0x8000, 1), Err(BoardError::NotOpen(7))));
        board.open_handle().unwrap();
        board.write_register(0x8000, 0x10).unwrap();
        assert_eq!(board.read_register(0x8000).unwrap(), 0x10);

        let mut handler = AcquisitionHandler::new(null_sink());
        assert_eq!(handler.poll_board(&mut board).unwrap(), 2);
        assert_eq!(handler.poll_board(&mut board).unwrap(), 5);
        assert!(handler.poll_board(&mut board).is_err());
    }
}
