pub mod acquisition;
pub mod aggregate;
pub mod config;
pub mod constants;
pub mod element;
pub mod error;
pub mod frame_buffer;
pub mod hdf_writer;
pub mod network_writer;
pub mod receiver;
pub mod run_id;
pub mod sender;
pub mod sink;
pub mod text_writer;
pub mod waveform;
