use std::fmt::Display;
use std::io::{Read, Write};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use hdf5::types::VarLenArray;

use super::aggregate::EventView;
use super::constants::*;
use super::error::{DecodeError, ProtocolError};
use super::waveform::{Interval, Waveform};

/// # ElementType
/// Tag carried in every header naming the record layout of the payload.
/// Code 0 is reserved for "no type" and is never accepted on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ElementType {
    List422 = 1,
    List8222 = 2,
    Waveform422 = 3,
    Waveform8222 = 4
}

impl TryFrom<u16> for ElementType {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ElementType::List422),
            2 => Ok(ElementType::List8222),
            3 => Ok(ElementType::Waveform422),
            4 => Ok(ElementType::Waveform8222),
            _ => Err(ProtocolError::UnsupportedElementType(value))
        }
    }
}

impl ElementType {

    /// Record kind for a digitizer in compact or extended mode, with or without waveforms
    pub fn for_layout(extended: bool, waveform: bool) -> Self {
        match (extended, waveform) {
            (false, false) => ElementType::List422,
            (true, false) => ElementType::List8222,
            (false, true) => ElementType::Waveform422,
            (true, true) => ElementType::Waveform8222
        }
    }

    pub fn code(&self) -> u16 {
        *self as u16
    }
}

impl Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElementType::List422 => write!(f, "List422"),
            ElementType::List8222 => write!(f, "List8222"),
            ElementType::Waveform422 => write!(f, "Waveform422"),
            ElementType::Waveform8222 => write!(f, "Waveform8222")
        }
    }
}

/// # Header
/// The fixed 32 byte little-endian header preceding every frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub run_id: u64,
    pub global_time: u64,
    pub digitizer_id: u32,
    pub element_type: u16,
    pub num_elements: u16,
    pub version: u16,
    pub seq_num: u32
}

impl Default for Header {
    fn default() -> Self {
        Header { run_id: 0, global_time: 0, digitizer_id: 0, element_type: 0, num_elements: 0, version: FORMAT_VERSION, seq_num: 0 }
    }
}

impl Header {

    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u64::<LittleEndian>(self.run_id)?;
        writer.write_u64::<LittleEndian>(self.global_time)?;
        writer.write_u32::<LittleEndian>(self.digitizer_id)?;
        writer.write_u16::<LittleEndian>(self.element_type)?;
        writer.write_u16::<LittleEndian>(self.num_elements)?;
        writer.write_u16::<LittleEndian>(self.version)?;
        writer.write_u32::<LittleEndian>(self.seq_num)?;
        writer.write_all(&[0u8; 2])
    }

    /// Parse the header at the front of a frame. Only the size is checked here.
    pub fn read_from(frame: &[u8]) -> Result<Self, ProtocolError> {
        if frame.len() < HEADER_SIZE {
            return Err(ProtocolError::TooSmall(frame.len()));
        }
        let mut cursor = &frame[..HEADER_SIZE];
        Ok(Header {
            run_id: cursor.read_u64::<LittleEndian>()?,
            global_time: cursor.read_u64::<LittleEndian>()?,
            digitizer_id: cursor.read_u32::<LittleEndian>()?,
            element_type: cursor.read_u16::<LittleEndian>()?,
            num_elements: cursor.read_u16::<LittleEndian>()?,
            version: cursor.read_u16::<LittleEndian>()?,
            seq_num: cursor.read_u32::<LittleEndian>()?
        })
    }

    /// Check the version and resolve the element tag
    pub fn validate(&self) -> Result<ElementType, ProtocolError> {
        if self.version != FORMAT_VERSION {
            return Err(ProtocolError::UnsupportedVersion(self.version));
        }
        ElementType::try_from(self.element_type)
    }
}

/// # Element
/// A record that can travel in a frame and be stored by a sink.
pub trait Element: Sized + Clone + Ord + Display + Send + Sync {
    const TYPE: ElementType;
    type Row: hdf5::H5Type;

    /// Serialized size in bytes
    fn size(&self) -> usize;
    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()>;
    fn read_from<R: Read>(reader: &mut R) -> std::io::Result<Self>;
    fn column_header() -> String;
    fn to_row(&self) -> Self::Row;
    fn from_event(event: &EventView) -> Result<Self, DecodeError>;
}

/// # ListElement
/// The fixed-size list part of a record. Knows how to pair itself with a waveform.
pub trait ListElement: Element + Copy {
    const SIZE: usize;
    const WAVEFORM_TYPE: ElementType;
    type WaveformRow: hdf5::H5Type;

    /// Build from an event ignoring its waveform
    fn from_list_fields(event: &EventView) -> Result<Self, DecodeError>;
    fn waveform_row(&self, waveform: &Waveform) -> Self::WaveformRow;
}

/*
    Compact list record
 */
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, hdf5::H5Type)]
#[repr(C)]
pub struct ListElement422 {
    pub time: u32,
    pub channel: u16,
    pub charge: u16
}

impl Element for ListElement422 {
    const TYPE: ElementType = ElementType::List422;
    type Row = Self;

    fn size(&self) -> usize {
        Self::SIZE
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u32::<LittleEndian>(self.time)?;
        writer.write_u16::<LittleEndian>(self.channel)?;
        writer.write_u16::<LittleEndian>(self.charge)
    }

    fn read_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        Ok(ListElement422 {
            time: reader.read_u32::<LittleEndian>()?,
            channel: reader.read_u16::<LittleEndian>()?,
            charge: reader.read_u16::<LittleEndian>()?
        })
    }

    fn column_header() -> String {
        format!("{:>10} {:>7} {:>6}", "time", "channel", "charge")
    }

    fn to_row(&self) -> Self::Row {
        *self
    }

    fn from_event(event: &EventView) -> Result<Self, DecodeError> {
        if event.has_waveform() {
            return Err(DecodeError::LayoutMismatch(Self::TYPE.code(), event.has_extras(), true));
        }
        Self::from_list_fields(event)
    }
}

impl ListElement for ListElement422 {
    const SIZE: usize = 8;
    const WAVEFORM_TYPE: ElementType = ElementType::Waveform422;
    type WaveformRow = Waveform422Row;

    fn from_list_fields(event: &EventView) -> Result<Self, DecodeError> {
        if event.has_extras() {
            return Err(DecodeError::LayoutMismatch(Self::TYPE.code(), true, event.has_waveform()));
        }
        Ok(ListElement422 { time: event.time_tag(), channel: event.channel(), charge: event.charge() })
    }

    fn waveform_row(&self, waveform: &Waveform) -> Self::WaveformRow {
        Waveform422Row {
            time: self.time,
            channel: self.channel,
            charge: self.charge,
            num_samples: waveform.num_samples(),
            trigger: waveform.trigger,
            gate: waveform.gate,
            holdoff: waveform.holdoff,
            overthreshold: waveform.overthreshold,
            samples: VarLenArray::from_slice(&waveform.samples)
        }
    }
}

impl Display for ListElement422 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:>10} {:>7} {:>6}", self.time, self.channel, self.charge)
    }
}

/*
    Extended list record. Two bytes of padding on the wire.
 */
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, hdf5::H5Type)]
#[repr(C)]
pub struct ListElement8222 {
    pub time: u64,
    pub channel: u16,
    pub charge: u16,
    pub baseline: u16
}

impl Element for ListElement8222 {
    const TYPE: ElementType = ElementType::List8222;
    type Row = Self;

    fn size(&self) -> usize {
        Self::SIZE
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u64::<LittleEndian>(self.time)?;
        writer.write_u16::<LittleEndian>(self.channel)?;
        writer.write_u16::<LittleEndian>(self.charge)?;
        writer.write_u16::<LittleEndian>(self.baseline)?;
        writer.write_all(&[0u8; 2])
    }

    fn read_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let element = ListElement8222 {
            time: reader.read_u64::<LittleEndian>()?,
            channel: reader.read_u16::<LittleEndian>()?,
            charge: reader.read_u16::<LittleEndian>()?,
            baseline: reader.read_u16::<LittleEndian>()?
        };
        reader.read_u16::<LittleEndian>()?;
        Ok(element)
    }

    fn column_header() -> String {
        format!("{:>15} {:>7} {:>6} {:>8}", "time", "channel", "charge", "baseline")
    }

    fn to_row(&self) -> Self::Row {
        *self
    }

    fn from_event(event: &EventView) -> Result<Self, DecodeError> {
        if event.has_waveform() {
            return Err(DecodeError::LayoutMismatch(Self::TYPE.code(), event.has_extras(), true));
        }
        Self::from_list_fields(event)
    }
}

impl ListElement for ListElement8222 {
    const SIZE: usize = 16;
    const WAVEFORM_TYPE: ElementType = ElementType::Waveform8222;
    type WaveformRow = Waveform8222Row;

    fn from_list_fields(event: &EventView) -> Result<Self, DecodeError> {
        match (event.full_time(), event.baseline()) {
            (Some(time), Some(baseline)) => Ok(ListElement8222 { time, channel: event.channel(), charge: event.charge(), baseline }),
            _ => Err(DecodeError::LayoutMismatch(Self::TYPE.code(), false, event.has_waveform()))
        }
    }

    fn waveform_row(&self, waveform: &Waveform) -> Self::WaveformRow {
        Waveform8222Row {
            time: self.time,
            channel: self.channel,
            charge: self.charge,
            baseline: self.baseline,
            num_samples: waveform.num_samples(),
            trigger: waveform.trigger,
            gate: waveform.gate,
            holdoff: waveform.holdoff,
            overthreshold: waveform.overthreshold,
            samples: VarLenArray::from_slice(&waveform.samples)
        }
    }
}

impl Display for ListElement8222 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:>15} {:>7} {:>6} {:>8}", self.time, self.channel, self.charge, self.baseline)
    }
}

/*
    HDF5 compound rows for the waveform records. Samples are stored variable length.
 */
#[derive(hdf5::H5Type)]
#[repr(C)]
pub struct Waveform422Row {
    pub time: u32,
    pub channel: u16,
    pub charge: u16,
    pub num_samples: u16,
    pub trigger: Interval,
    pub gate: Interval,
    pub holdoff: Interval,
    pub overthreshold: Interval,
    pub samples: VarLenArray<u16>
}

#[derive(hdf5::H5Type)]
#[repr(C)]
pub struct Waveform8222Row {
    pub time: u64,
    pub channel: u16,
    pub charge: u16,
    pub baseline: u16,
    pub num_samples: u16,
    pub trigger: Interval,
    pub gate: Interval,
    pub holdoff: Interval,
    pub overthreshold: Interval,
    pub samples: VarLenArray<u16>
}

/// # WaveformElement
/// A list record followed by its waveform. Orders by the list part first.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct WaveformElement<L> {
    pub list: L,
    pub waveform: Waveform
}

pub type WaveformElement422 = WaveformElement<ListElement422>;
pub type WaveformElement8222 = WaveformElement<ListElement8222>;

impl<L: ListElement> Element for WaveformElement<L> {
    const TYPE: ElementType = L::WAVEFORM_TYPE;
    type Row = L::WaveformRow;

    fn size(&self) -> usize {
        L::SIZE + self.waveform.size()
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        self.list.write_to(writer)?;
        self.waveform.write_to(writer)
    }

    fn read_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let list = L::read_from(reader)?;
        let waveform = Waveform::read_from(reader)?;
        Ok(WaveformElement { list, waveform })
    }

    fn column_header() -> String {
        format!("{} {}", L::column_header(), Waveform::column_header())
    }

    fn to_row(&self) -> Self::Row {
        self.list.waveform_row(&self.waveform)
    }

    fn from_event(event: &EventView) -> Result<Self, DecodeError> {
        let list = L::from_list_fields(event)?;
        match event.waveform() {
            Some(waveform) => Ok(WaveformElement { list, waveform }),
            None => Err(DecodeError::LayoutMismatch(Self::TYPE.code(), event.has_extras(), false))
        }
    }
}

impl<L: Display> Display for WaveformElement<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.list, self.waveform)
    }
}

//Read exactly count records or fail without keeping any of them
fn read_elements<E: Element>(payload: &[u8], count: u16) -> Result<Vec<E>, ProtocolError> {
    let mut reader = payload;
    let mut elements = Vec::with_capacity(count as usize);
    for _ in 0..count {
        match E::read_from(&mut reader) {
            Ok(element) => elements.push(element),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(ProtocolError::TruncatedPayload(count, payload.len()));
            }
            Err(e) => return Err(ProtocolError::IOError(e))
        }
    }
    Ok(elements)
}

/// # ElementBatch
/// A homogeneous batch of records. The variant is the element type, so a batch can never mix types.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementBatch {
    List422(Vec<ListElement422>),
    List8222(Vec<ListElement8222>),
    Waveform422(Vec<WaveformElement422>),
    Waveform8222(Vec<WaveformElement8222>)
}

impl ElementBatch {

    pub fn new(element_type: ElementType) -> Self {
        match element_type {
            ElementType::List422 => ElementBatch::List422(Vec::new()),
            ElementType::List8222 => ElementBatch::List8222(Vec::new()),
            ElementType::Waveform422 => ElementBatch::Waveform422(Vec::new()),
            ElementType::Waveform8222 => ElementBatch::Waveform8222(Vec::new())
        }
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            ElementBatch::List422(_) => ElementType::List422,
            ElementBatch::List8222(_) => ElementType::List8222,
            ElementBatch::Waveform422(_) => ElementType::Waveform422,
            ElementBatch::Waveform8222(_) => ElementType::Waveform8222
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ElementBatch::List422(v) => v.len(),
            ElementBatch::List8222(v) => v.len(),
            ElementBatch::Waveform422(v) => v.len(),
            ElementBatch::Waveform8222(v) => v.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialized size of all records in bytes
    pub fn data_size(&self) -> usize {
        match self {
            ElementBatch::List422(v) => v.len() * ListElement422::SIZE,
            ElementBatch::List8222(v) => v.len() * ListElement8222::SIZE,
            ElementBatch::Waveform422(v) => v.iter().map(|e| e.size()).sum(),
            ElementBatch::Waveform8222(v) => v.iter().map(|e| e.size()).sum()
        }
    }

    pub fn sort(&mut self) {
        match self {
            ElementBatch::List422(v) => v.sort(),
            ElementBatch::List8222(v) => v.sort(),
            ElementBatch::Waveform422(v) => v.sort(),
            ElementBatch::Waveform8222(v) => v.sort()
        }
    }

    pub fn clear(&mut self) {
        match self {
            ElementBatch::List422(v) => v.clear(),
            ElementBatch::List8222(v) => v.clear(),
            ElementBatch::Waveform422(v) => v.clear(),
            ElementBatch::Waveform8222(v) => v.clear()
        }
    }

    /// Move the records of another batch of the same type into this one. A batch of another
    /// type is handed back untouched.
    pub fn append(&mut self, other: ElementBatch) -> Result<(), ElementBatch> {
        match (self, other) {
            (ElementBatch::List422(v), ElementBatch::List422(mut o)) => v.append(&mut o),
            (ElementBatch::List8222(v), ElementBatch::List8222(mut o)) => v.append(&mut o),
            (ElementBatch::Waveform422(v), ElementBatch::Waveform422(mut o)) => v.append(&mut o),
            (ElementBatch::Waveform8222(v), ElementBatch::Waveform8222(mut o)) => v.append(&mut o),
            (_, other) => return Err(other)
        }
        Ok(())
    }

    /// Append count records parsed from a frame payload. Nothing is appended on failure.
    pub fn extend_from_payload(&mut self, payload: &[u8], count: u16) -> Result<(), ProtocolError> {
        match self {
            ElementBatch::List422(v) => v.extend(read_elements::<ListElement422>(payload, count)?),
            ElementBatch::List8222(v) => v.extend(read_elements::<ListElement8222>(payload, count)?),
            ElementBatch::Waveform422(v) => v.extend(read_elements::<WaveformElement422>(payload, count)?),
            ElementBatch::Waveform8222(v) => v.extend(read_elements::<WaveformElement8222>(payload, count)?)
        }
        Ok(())
    }

    /// Convert a decoded event to this batch's record type and append it
    pub fn push_event(&mut self, event: &EventView) -> Result<(), DecodeError> {
        match self {
            ElementBatch::List422(v) => v.push(ListElement422::from_event(event)?),
            ElementBatch::List8222(v) => v.push(ListElement8222::from_event(event)?),
            ElementBatch::Waveform422(v) => v.push(WaveformElement422::from_event(event)?),
            ElementBatch::Waveform8222(v) => v.push(WaveformElement8222::from_event(event)?)
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregateDecoder;
    use crate::aggregate::test_support::*;

    #[test]
    fn list_elements_order_by_time_then_channel() {
        let mut elements = vec![
            ListElement422 { time: 20, channel: 1, charge: 5 },
            ListElement422 { time: 10, channel: 9, charge: 1 },
            ListElement422 { time: 10, channel: 2, charge: 7 },
            ListElement422 { time: 20, channel: 0, charge: 3 },
        ];
        elements.sort();
        let keys: Vec<(u32, u16)> = elements.iter().map(|e| (e.time, e.channel)).collect();
        assert_eq!(keys, vec![(10, 2), (10, 9), (20, 0), (20, 1)]);

        let a = ListElement8222 { time: 5, channel: 3, charge: 0, baseline: 0 };
        let b = ListElement8222 { time: 5, channel: 4, charge: 0, baseline: 0 };
        let c = ListElement8222 { time: 4, channel: 60, charge: 0, baseline: 0 };
        assert!(c < a && a < b);
    }

    #[test]
    fn header_layout_is_thirty_two_bytes() {
        let header = Header { run_id: 0x0102030405060708, global_time: 99, digitizer_id: 7, element_type: 2, num_elements: 3, version: FORMAT_VERSION, seq_num: 11 };
        let mut bytes: Vec<u8> = Vec::new();
        header.write_to(&mut bytes).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(bytes[0], 0x08);
        assert_eq!(&bytes[20..22], &[2, 0]);
        assert_eq!(&bytes[24..26], &FORMAT_VERSION.to_le_bytes());
        assert_eq!(Header::read_from(&bytes).unwrap(), header);
        assert_eq!(header.validate().unwrap(), ElementType::List8222);
    }

    #[test]
    fn short_frame_is_rejected() {
        assert!(matches!(Header::read_from(&[0u8; 20]), Err(ProtocolError::TooSmall(20))));
    }

    #[test]
    fn unknown_version_and_type_are_rejected() {
        let header = Header { version: 0x0101, element_type: 1, ..Default::default() };
        assert!(matches!(header.validate(), Err(ProtocolError::UnsupportedVersion(0x0101))));
        let header = Header { element_type: 0, ..Default::default() };
        assert!(matches!(header.validate(), Err(ProtocolError::UnsupportedElementType(0))));
        assert!(ElementType::try_from(5).is_err());
    }

    #[test]
    fn record_sizes() {
        assert_eq!(ListElement422::default().size(), 8);
        assert_eq!(ListElement8222::default().size(), 16);
        let element = WaveformElement422 { list: ListElement422::default(), waveform: Waveform { samples: vec![0; 10], ..Default::default() } };
        assert_eq!(element.size(), 8 + 18 + 20);
        let mut bytes: Vec<u8> = Vec::new();
        element.write_to(&mut bytes).unwrap();
        assert_eq!(bytes.len(), element.size());
    }

    #[test]
    fn truncated_payload_appends_nothing() {
        let elements = vec![ListElement8222 { time: 1, channel: 2, charge: 3, baseline: 4 }; 3];
        let mut payload: Vec<u8> = Vec::new();
        for e in elements.iter() {
            e.write_to(&mut payload).unwrap();
        }
        let mut batch = ElementBatch::new(ElementType::List8222);
        batch.extend_from_payload(&payload, 3).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch, ElementBatch::List8222(elements));

        let result = batch.extend_from_payload(&payload[..40], 3);
        assert!(matches!(result, Err(ProtocolError::TruncatedPayload(3, 40))));
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn events_convert_to_matching_layout_only() {
        let mut slot = SlotSpec::new(0x10, 4, 300);
        slot.extras = Some((0x2, 77));
        let bytes = to_bytes(&board_words(&[(1, group_words(true, 0, &[slot]))]));
        let events = AggregateDecoder::decode_all(&bytes).unwrap();
        let event = &events[0].1;

        let extended = ListElement8222::from_event(event).unwrap();
        assert_eq!(extended, ListElement8222 { time: 0x2_0000_0010, channel: 12, charge: 300, baseline: 77 });
        assert!(matches!(ListElement422::from_event(event), Err(DecodeError::LayoutMismatch(1, true, false))));
        assert!(WaveformElement8222::from_event(event).is_err());

        let mut batch = ElementBatch::new(ElementType::for_layout(true, false));
        batch.push_event(event).unwrap();
        assert_eq!(batch.element_type(), ElementType::List8222);
        assert_eq!(batch.data_size(), 16);
    }

    #[test]
    fn waveform_batch_sorts_by_list_part() {
        let make = |time: u32, channel: u16| WaveformElement422 {
            list: ListElement422 { time, channel, charge: 0 },
            waveform: Waveform::default()
        };
        let mut batch = ElementBatch::Waveform422(vec![make(3, 0), make(1, 5), make(1, 2)]);
        batch.sort();
        match batch {
            ElementBatch::Waveform422(v) => {
                let keys: Vec<(u32, u16)> = v.iter().map(|e| (e.list.time, e.list.channel)).collect();
                assert_eq!(keys, vec![(1, 2), (1, 5), (3, 0)]);
            }
            _ => panic!("Batch changed type")
        }
    }
}
