use std::fmt::Display;

/// # RunId
/// Random 64-bit identity of an acquisition run. Stamped on every frame header and used to
/// name output files, rendered as 16 hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(pub u64);

impl RunId {

    pub fn random() -> Self {
        RunId(rand::random::<u64>())
    }

    pub fn get_value(&self) -> u64 {
        self.0
    }
}

impl Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
