use std::marker::PhantomData;

use super::constants::*;
use super::element::{Element, Header};
use super::error::FrameError;

/// # FrameBuffer
/// Fixed capacity byte buffer holding one outbound datagram: header space followed by
/// serialized records of a single element type. Appends either fit whole or fail.
#[derive(Debug)]
pub struct FrameBuffer<E: Element> {
    data: Vec<u8>,
    capacity: usize,
    count: u16,
    element: PhantomData<E>
}

impl<E: Element> FrameBuffer<E> {

    pub fn new(capacity: usize) -> Self {
        let mut data = Vec::with_capacity(capacity);
        data.resize(HEADER_SIZE, 0);
        FrameBuffer { data, capacity, count: 0, element: PhantomData }
    }

    /// Append one record. On failure the buffer is left untouched.
    pub fn push(&mut self, element: &E) -> Result<(), FrameError> {
        let needed = element.size();
        let left = self.capacity.saturating_sub(self.data.len());
        if needed > left || self.count == u16::MAX {
            return Err(FrameError::CapacityExceeded(needed, left));
        }
        let start = self.data.len();
        if let Err(e) = element.write_to(&mut self.data) {
            self.data.truncate(start);
            return Err(FrameError::from(e));
        }
        self.count += 1;
        Ok(())
    }

    /// Stamp the header (with this frame's element type and count) and hand back the datagram
    pub fn finish(&mut self, header: &Header) -> Result<&[u8], FrameError> {
        let stamped = Header { element_type: E::TYPE.code(), num_elements: self.count, ..*header };
        let mut header_space: &mut [u8] = &mut self.data[..HEADER_SIZE];
        stamped.write_to(&mut header_space)?;
        Ok(&self.data)
    }

    pub fn clear(&mut self) {
        self.data.truncate(HEADER_SIZE);
        self.count = 0;
    }

    /// Number of records held
    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes of record payload held, header excluded
    pub fn data_size(&self) -> usize {
        self.data.len() - HEADER_SIZE
    }

    /// Whether a record of this size could fit an empty frame
    pub fn can_ever_hold(&self, size: usize) -> bool {
        HEADER_SIZE + size <= self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ListElement422, ListElement8222, ElementType};

    #[test]
    fn push_is_all_or_nothing() {
        let mut buffer: FrameBuffer<ListElement8222> = FrameBuffer::new(HEADER_SIZE + 40);
        let element = ListElement8222 { time: 1, channel: 2, charge: 3, baseline: 4 };
        buffer.push(&element).unwrap();
        buffer.push(&element).unwrap();
        let result = buffer.push(&element);
        assert!(matches!(result, Err(FrameError::CapacityExceeded(16, 8))));
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.data_size(), 32);
    }

    #[test]
    fn finish_stamps_type_and_count() {
        let mut buffer: FrameBuffer<ListElement422> = FrameBuffer::new(DEFAULT_MAX_DATAGRAM_SIZE);
        for i in 0..5 {
            buffer.push(&ListElement422 { time: i, channel: 0, charge: 0 }).unwrap();
        }
        let header = Header { run_id: 42, global_time: 1000, digitizer_id: 3, seq_num: 9, ..Default::default() };
        let bytes = buffer.finish(&header).unwrap().to_vec();
        assert_eq!(bytes.len(), HEADER_SIZE + 5 * 8);

        let read = Header::read_from(&bytes).unwrap();
        assert_eq!(read.run_id, 42);
        assert_eq!(read.num_elements, 5);
        assert_eq!(read.validate().unwrap(), ElementType::List422);

        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.data_size(), 0);
        assert_eq!(buffer.capacity(), DEFAULT_MAX_DATAGRAM_SIZE);
    }
}
