
//Board aggregate layout
pub const BOARD_AGGREGATE_MAGIC: u32 = 0xA;
pub const BOARD_HEADER_WORDS: usize = 4;
pub const BOARD_SIZE_MASK: u32 = 0x0FFF_FFFF;

//Group aggregate layout
pub const GROUP_HEADER_WORDS: usize = 2;
pub const GROUP_SIZE_MASK: u32 = 0x7FFF_FFFF;
pub const GROUP_SAMPLES_MASK: u32 = 0x0FFF;
pub const CHANNELS_PER_GROUP: u16 = 8;
pub const WORD_SIZE: usize = 4;

//Waveform words
pub const SAMPLE_MASK: u32 = 0x0FFF;
pub const GATE_BIT: u32 = 12;
pub const TRIGGER_BIT: u32 = 13;
pub const HOLDOFF_BIT: u32 = 14;
pub const OVER_THRESHOLD_BIT: u32 = 15;
pub const HIGH_HALF_SHIFT: u32 = 16;
pub const INTERVAL_SENTINEL: u16 = 0xFFFF;

//Wire format
pub const HEADER_SIZE: usize = 32;
pub const FORMAT_VERSION: u16 = 0x0102;

//Transport
pub const DEFAULT_PORT: u16 = 12345;
pub const DEFAULT_MAX_DATAGRAM_SIZE: usize = 8972;
pub const MAX_RECEIVE_SIZE: usize = 65536;
