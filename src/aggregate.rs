use bitvec::prelude::*;
use byteorder::{ByteOrder, LittleEndian};

use super::constants::*;
use super::error::DecodeError;
use super::waveform::Waveform;

fn read_word(buffer: &[u8], word_index: usize) -> u32 {
    LittleEndian::read_u32(&buffer[word_index * WORD_SIZE..])
}

/*
    GroupFormat is the decoded format word of a group aggregate. It fixes the slot size
    for every event in the group.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupFormat {
    pub has_extras: bool,
    pub has_waveform: bool,
    pub sample_field: u32,
    pub slot_words: usize
}

impl GroupFormat {
    pub fn parse(group: u8, format: u32) -> Result<Self, DecodeError> {
        //bit 31 clear, charge (30) and time tag (29) always enabled
        if (format >> 29) & 0b111 != 0b011 {
            return Err(DecodeError::BadGroupFormat(group, format));
        }
        let has_extras = (format >> 28) & 1 == 1;
        let has_waveform = (format >> 27) & 1 == 1;
        let sample_field = format & GROUP_SAMPLES_MASK;
        let mut slot_words: usize = 2;
        if has_extras {
            slot_words += 1;
        }
        if has_waveform {
            slot_words += (sample_field as usize) << 2;
        }
        Ok(GroupFormat { has_extras, has_waveform, sample_field, slot_words })
    }
}

/// # EventView
/// A non-owning view over the words of one slot in a group aggregate. Field accessors decode
/// straight from the raw buffer; nothing is copied until a record is built from the view.
#[derive(Debug, Clone, Copy)]
pub struct EventView<'a> {
    group: u8,
    slot: &'a [u8],
    format: GroupFormat
}

impl<'a> EventView<'a> {

    fn word(&self, index: usize) -> u32 {
        read_word(self.slot, index)
    }

    fn last_word(&self) -> u32 {
        self.word(self.format.slot_words - 1)
    }

    fn extras_word(&self) -> Option<u32> {
        if self.format.has_extras {
            Some(self.word(self.format.slot_words - 2))
        } else {
            None
        }
    }

    pub fn group(&self) -> u8 {
        self.group
    }

    pub fn has_extras(&self) -> bool {
        self.format.has_extras
    }

    pub fn has_waveform(&self) -> bool {
        self.format.has_waveform
    }

    pub fn time_tag(&self) -> u32 {
        self.word(0)
    }

    pub fn charge(&self) -> u16 {
        (self.last_word() & 0x0000FFFF) as u16
    }

    pub fn sub_channel(&self) -> u8 {
        (self.last_word() >> 28) as u8
    }

    pub fn channel(&self) -> u16 {
        (self.group as u16) * CHANNELS_PER_GROUP + self.sub_channel() as u16
    }

    pub fn extended_time_tag(&self) -> Option<u16> {
        self.extras_word().map(|word| (word & 0x0000FFFF) as u16)
    }

    pub fn baseline(&self) -> Option<u16> {
        self.extras_word().map(|word| (word >> 16) as u16)
    }

    /// 48-bit time: the time tag merged with the extended time tag above bit 32
    pub fn full_time(&self) -> Option<u64> {
        self.extended_time_tag().map(|ext| (self.time_tag() as u64) | ((ext as u64) << 32))
    }

    /// Decode the waveform into caller-owned storage. Returns false if the slot has none.
    pub fn waveform_into(&self, waveform: &mut Waveform) -> bool {
        if !self.format.has_waveform {
            return false;
        }
        let n_words = self.format.slot_words - 2 - self.format.has_extras as usize;
        waveform.decode_from_words(&self.slot[WORD_SIZE..(1 + n_words) * WORD_SIZE]);
        true
    }

    pub fn waveform(&self) -> Option<Waveform> {
        let mut waveform = Waveform::default();
        if self.waveform_into(&mut waveform) {
            Some(waveform)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct GroupState {
    group: u8,
    format: GroupFormat,
    end: usize
}

/// # AggregateDecoder
/// Walks a readout buffer board aggregate by board aggregate, group by group, yielding one
/// (group, EventView) per slot. The first structural violation is returned as an error and
/// the decoder yields nothing afterwards; restarting means building a new decoder.
#[derive(Debug)]
pub struct AggregateDecoder<'a> {
    buffer: &'a [u8],
    total_words: usize,
    next_board: usize,
    board_end: usize,
    cursor: usize,
    in_board: bool,
    group_mask: u8,
    next_group: usize,
    current_group: Option<GroupState>,
    is_done: bool
}

impl<'a> AggregateDecoder<'a> {

    pub fn new(buffer: &'a [u8]) -> Self {
        AggregateDecoder {
            buffer,
            total_words: buffer.len() / WORD_SIZE,
            next_board: 0,
            board_end: 0,
            cursor: 0,
            in_board: false,
            group_mask: 0,
            next_group: 0,
            current_group: None,
            is_done: false
        }
    }

    /// Decode a whole buffer up front. Either every slot is returned or the buffer is rejected.
    pub fn decode_all(buffer: &'a [u8]) -> Result<Vec<(u8, EventView<'a>)>, DecodeError> {
        AggregateDecoder::new(buffer).collect()
    }

    fn read_board_header(&mut self) -> Result<(), DecodeError> {
        let words_left = self.total_words - self.next_board;
        if words_left < BOARD_HEADER_WORDS {
            return Err(DecodeError::BadBoardSize(words_left as u32, words_left));
        }
        let header = read_word(self.buffer, self.next_board);
        if header >> 28 != BOARD_AGGREGATE_MAGIC {
            return Err(DecodeError::BadBoardMagic(header));
        }
        let size = header & BOARD_SIZE_MASK;
        if (size as usize) < BOARD_HEADER_WORDS || (size as usize) > words_left {
            return Err(DecodeError::BadBoardSize(size, words_left));
        }
        self.group_mask = (read_word(self.buffer, self.next_board + 1) & 0xFF) as u8;
        self.cursor = self.next_board + BOARD_HEADER_WORDS;
        self.board_end = self.next_board + size as usize;
        self.next_group = 0;
        self.in_board = true;
        Ok(())
    }

    fn read_group_header(&mut self, group: u8) -> Result<GroupState, DecodeError> {
        let words_left = self.board_end - self.cursor;
        if words_left < GROUP_HEADER_WORDS {
            return Err(DecodeError::BadGroupSize(group, 0, words_left));
        }
        let header = read_word(self.buffer, self.cursor);
        if header >> 31 != 1 {
            return Err(DecodeError::BadGroupHeader(group, header));
        }
        let size = header & GROUP_SIZE_MASK;
        if (size as usize) < GROUP_HEADER_WORDS || (size as usize) > words_left {
            return Err(DecodeError::BadGroupSize(group, size, words_left));
        }
        let format = GroupFormat::parse(group, read_word(self.buffer, self.cursor + 1))?;
        let payload = size as usize - GROUP_HEADER_WORDS;
        if payload % format.slot_words != 0 {
            return Err(DecodeError::InexactSlotDivision(group, payload, format.slot_words));
        }
        let end = self.cursor + size as usize;
        self.cursor += GROUP_HEADER_WORDS;
        Ok(GroupState { group, format, end })
    }

    fn next_event(&mut self) -> Result<Option<(u8, EventView<'a>)>, DecodeError> {
        if self.buffer.len() % WORD_SIZE != 0 {
            return Err(DecodeError::MisalignedBuffer(self.buffer.len()));
        }
        loop {
            if let Some(state) = self.current_group {
                if self.cursor < state.end {
                    let start = self.cursor * WORD_SIZE;
                    let stop = start + state.format.slot_words * WORD_SIZE;
                    self.cursor += state.format.slot_words;
                    let view = EventView { group: state.group, slot: &self.buffer[start..stop], format: state.format };
                    return Ok(Some((state.group, view)));
                }
                self.current_group = None;
            }

            if self.in_board {
                let bits = self.group_mask.view_bits::<Lsb0>();
                match bits[self.next_group..].first_one() {
                    Some(offset) => {
                        let group = (self.next_group + offset) as u8;
                        self.next_group += offset + 1;
                        self.current_group = Some(self.read_group_header(group)?);
                    }
                    None => {
                        if self.cursor != self.board_end {
                            let size = self.board_end - self.next_board;
                            return Err(DecodeError::BoardSizeMismatch(self.cursor - self.next_board, size));
                        }
                        self.in_board = false;
                        self.next_board = self.board_end;
                    }
                }
                continue;
            }

            if self.next_board >= self.total_words {
                return Ok(None);
            }
            self.read_board_header()?;
        }
    }
}

impl<'a> Iterator for AggregateDecoder<'a> {
    type Item = Result<(u8, EventView<'a>), DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_done {
            return None;
        }
        match self.next_event() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.is_done = true;
                None
            }
            Err(e) => {
                self.is_done = true;
                Some(Err(e))
            }
        }
    }
}

/*
    Builders for synthetic aggregates, shared with the other test modules
 */
#[cfg(test)]
pub(crate) mod test_support {

    #[derive(Debug, Clone, Default)]
    pub struct SlotSpec {
        pub time_tag: u32,
        pub charge: u16,
        pub sub_channel: u8,
        pub extras: Option<(u16, u16)>,
        pub waveform_words: Vec<u32>
    }

    impl SlotSpec {
        pub fn new(time_tag: u32, sub_channel: u8, charge: u16) -> Self {
            SlotSpec { time_tag, charge, sub_channel, ..Default::default() }
        }
    }

    pub fn format_word(extras: bool, waveform: bool, sample_field: u32) -> u32 {
        (1 << 30) | (1 << 29) | ((extras as u32) << 28) | ((waveform as u32) << 27) | sample_field
    }

    pub fn group_words(extras: bool, sample_field: u32, slots: &[SlotSpec]) -> Vec<u32> {
        let waveform = sample_field != 0;
        let mut words = vec![0, format_word(extras, waveform, sample_field)];
        for slot in slots {
            words.push(slot.time_tag);
            words.extend_from_slice(&slot.waveform_words);
            if let Some((ext, baseline)) = slot.extras {
                words.push(((baseline as u32) << 16) | ext as u32);
            }
            words.push(((slot.sub_channel as u32) << 28) | slot.charge as u32);
        }
        words[0] = (1 << 31) | words.len() as u32;
        words
    }

    pub fn board_words(groups: &[(u8, Vec<u32>)]) -> Vec<u32> {
        let mask = groups.iter().fold(0u32, |mask, (group, _)| mask | (1u32 << *group));
        let mut words = vec![0, mask, 0, 0];
        for (_, group) in groups {
            words.extend_from_slice(group);
        }
        words[0] = (0xA << 28) | words.len() as u32;
        words
    }

    pub fn to_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }
}
