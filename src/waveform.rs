use std::fmt::Display;
use std::io::{Read, Write};
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};

use super::constants::*;

/// Size in bytes of the fixed part of a serialized waveform (sample count + four intervals)
pub const WAVEFORM_FIXED_SIZE: usize = 2 + 4 * Interval::SIZE;

/// # Interval
/// Start and end position of a digital probe signal in half-sample units (the sample index).
/// Either bound holds the sentinel 0xFFFF when the transition never happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, hdf5::H5Type)]
#[repr(C)]
pub struct Interval {
    pub start: u16,
    pub end: u16
}

impl Default for Interval {
    fn default() -> Self {
        Interval { start: INTERVAL_SENTINEL, end: INTERVAL_SENTINEL }
    }
}

impl Interval {
    pub const SIZE: usize = 4;

    pub fn new(start: u16, end: u16) -> Self {
        Interval { start, end }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u16::<LittleEndian>(self.start)?;
        writer.write_u16::<LittleEndian>(self.end)
    }

    pub fn read_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let start = reader.read_u16::<LittleEndian>()?;
        let end = reader.read_u16::<LittleEndian>()?;
        Ok(Interval { start, end })
    }

    //Level signal: start at the first asserted sample, end at the first deasserted one after it
    fn track_level(&mut self, position: u16, asserted: bool) {
        if self.start == INTERVAL_SENTINEL {
            if asserted {
                self.start = position;
            }
        } else if self.end == INTERVAL_SENTINEL && !asserted {
            self.end = position;
        }
    }

    //Edge signal: a single position
    fn track_edge(&mut self, position: u16, asserted: bool) {
        if asserted && self.start == INTERVAL_SENTINEL {
            self.start = position;
            self.end = position;
        }
    }
}

impl Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:>6} {:>6}", self.start, self.end)
    }
}

/// # Waveform
/// Samples of one event trace along with the digital probes recorded next to them.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Waveform {
    pub trigger: Interval,
    pub gate: Interval,
    pub holdoff: Interval,
    pub overthreshold: Interval,
    pub samples: Vec<u16>
}

impl Waveform {

    /// Decode packed waveform words (little-endian, two 12-bit samples per word) into this
    /// waveform, reusing its sample storage.
    pub fn decode_from_words(&mut self, words: &[u8]) {
        self.samples.clear();
        self.trigger = Interval::default();
        self.gate = Interval::default();
        self.holdoff = Interval::default();
        self.overthreshold = Interval::default();

        for (index, chunk) in words.chunks_exact(WORD_SIZE).enumerate() {
            let word = LittleEndian::read_u32(chunk);
            for half in 0..2u32 {
                let bits = word >> (half * HIGH_HALF_SHIFT);
                let position = ((index as u32) << 1 | half) as u16;
                self.samples.push((bits & SAMPLE_MASK) as u16);
                self.trigger.track_edge(position, bits & (1 << TRIGGER_BIT) != 0);
                self.gate.track_level(position, bits & (1 << GATE_BIT) != 0);
                self.holdoff.track_level(position, bits & (1 << HOLDOFF_BIT) != 0);
                self.overthreshold.track_level(position, bits & (1 << OVER_THRESHOLD_BIT) != 0);
            }
        }
    }

    pub fn num_samples(&self) -> u16 {
        self.samples.len() as u16
    }

    pub fn size(&self) -> usize {
        WAVEFORM_FIXED_SIZE + 2 * self.samples.len()
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u16::<LittleEndian>(self.num_samples())?;
        self.trigger.write_to(writer)?;
        self.gate.write_to(writer)?;
        self.holdoff.write_to(writer)?;
        self.overthreshold.write_to(writer)?;
        for sample in self.samples.iter() {
            writer.write_u16::<LittleEndian>(*sample)?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let num_samples = reader.read_u16::<LittleEndian>()? as usize;
        let trigger = Interval::read_from(reader)?;
        let gate = Interval::read_from(reader)?;
        let holdoff = Interval::read_from(reader)?;
        let overthreshold = Interval::read_from(reader)?;
        let mut samples = vec![0; num_samples];
        reader.read_u16_into::<LittleEndian>(&mut samples)?;
        Ok(Waveform { trigger, gate, holdoff, overthreshold, samples })
    }

    pub fn column_header() -> String {
        format!("{:>11} {:>13} {:>13} {:>13} {:>13} samples", "num_samples", "trigger", "gate", "holdoff", "overthreshold")
    }
}

impl Display for Waveform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:>11} {} {} {} {}", self.num_samples(), self.trigger, self.gate, self.holdoff, self.overthreshold)?;
        for sample in self.samples.iter() {
            write!(f, " {:>5}", sample)?;
        }
        Ok(())
    }
}
