use std::sync::atomic::{AtomicU64, Ordering};

use super::config::{Backend, Config};
use super::element::{Element, ElementBatch};
use super::error::SinkError;
use super::hdf_writer::HDFWriter;
use super::network_writer::NetworkWriter;
use super::run_id::RunId;
use super::text_writer::TextWriter;

/// Discards everything, only counting what it was given
#[derive(Debug, Default)]
pub struct NullSink {
    records: AtomicU64
}

impl NullSink {
    pub fn get_records(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }
}

/// # Sink
/// Storage backends behind one write contract. Every backend is safe to share between
/// threads; each guards its own state with a single lock per call.
#[derive(Debug)]
pub enum Sink {
    Null(NullSink),
    Text(TextWriter),
    Hdf5(HDFWriter),
    Network(NetworkWriter)
}

impl Sink {

    /// Build the configured backend. Failing here is fatal for the caller.
    pub fn from_config(config: &Config, run_id: RunId) -> Result<Self, SinkError> {
        match config.backend {
            Backend::Null => Ok(Sink::Null(NullSink::default())),
            Backend::Text => Ok(Sink::Text(TextWriter::new(&config.output_path, &config.basename, run_id)?)),
            Backend::Hdf5 => Ok(Sink::Hdf5(HDFWriter::new(&config.output_path, &config.basename, run_id)?)),
            Backend::Network => {
                let target = config.get_forward_address()?;
                Ok(Sink::Network(NetworkWriter::new(target, run_id, config.max_datagram_size)?))
            }
        }
    }

    pub fn get_name(&self) -> &'static str {
        match self {
            Sink::Null(_) => "null",
            Sink::Text(_) => "text",
            Sink::Hdf5(_) => "hdf5",
            Sink::Network(_) => "network"
        }
    }

    pub fn add_digitizer(&self, digitizer_id: u32) -> Result<(), SinkError> {
        match self {
            Sink::Null(_) => Ok(()),
            Sink::Text(writer) => writer.add_digitizer(digitizer_id),
            Sink::Hdf5(writer) => writer.add_digitizer(digitizer_id),
            Sink::Network(_) => Ok(())
        }
    }

    /// Run the output is currently labelled with. The null sink keeps none.
    pub fn get_run_id(&self) -> Option<RunId> {
        match self {
            Sink::Null(_) => None,
            Sink::Text(writer) => Some(writer.get_run_id()),
            Sink::Hdf5(writer) => Some(writer.get_run_id()),
            Sink::Network(writer) => Some(writer.get_run_id())
        }
    }

    /// Start a new output identity for a new run
    pub fn split(&self, run_id: RunId) -> Result<(), SinkError> {
        match self {
            Sink::Null(_) => Ok(()),
            Sink::Text(writer) => writer.split(run_id),
            Sink::Hdf5(writer) => writer.split(run_id),
            Sink::Network(writer) => writer.split(run_id)
        }
    }

    /// Store one generation of records. An empty slice is a no-op.
    pub fn write<E: Element>(&self, elements: &[E], digitizer_id: u32, timestamp: u64) -> Result<(), SinkError> {
        if elements.is_empty() {
            return Ok(());
        }
        match self {
            Sink::Null(sink) => {
                sink.records.fetch_add(elements.len() as u64, Ordering::Relaxed);
                Ok(())
            }
            Sink::Text(writer) => writer.write(elements, digitizer_id, timestamp),
            Sink::Hdf5(writer) => writer.write(elements, digitizer_id, timestamp),
            Sink::Network(writer) => writer.write(elements, digitizer_id, timestamp)
        }
    }

    pub fn write_batch(&self, batch: &ElementBatch, digitizer_id: u32, timestamp: u64) -> Result<(), SinkError> {
        match batch {
            ElementBatch::List422(v) => self.write(v, digitizer_id, timestamp),
            ElementBatch::List8222(v) => self.write(v, digitizer_id, timestamp),
            ElementBatch::Waveform422(v) => self.write(v, digitizer_id, timestamp),
            ElementBatch::Waveform8222(v) => self.write(v, digitizer_id, timestamp)
        }
    }
}
