//! Durability mode for document log appends.

/// When appended log frames are forced to stable storage.
///
/// | Mode | Guarantee |
/// |------|-----------|
/// | Always | Every upsert/delete is fsynced before it returns |
/// | Buffered | Frames reach the OS page cache; fsync on compaction and close |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurabilityMode {
    /// fsync after every append.
    #[default]
    Always,

    /// Flush to the OS without fsync.
    ///
    /// A process crash loses nothing; a power loss may drop the most
    /// recent writes. Torn frames are discarded on replay either way.
    Buffered,
}

impl DurabilityMode {
    /// Whether each append must be fsynced.
    pub fn requires_immediate_fsync(&self) -> bool {
        matches!(self, DurabilityMode::Always)
    }

    /// Parse the configuration spelling (`"always"` / `"buffered"`).
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "always" => Some(DurabilityMode::Always),
            "buffered" => Some(DurabilityMode::Buffered),
            _ => None,
        }
    }

    /// Human-readable description of the mode.
    pub fn description(&self) -> &'static str {
        match self {
            DurabilityMode::Always => "fsync every write (safest)",
            DurabilityMode::Buffered => "OS-buffered writes (faster, may lose recent writes on power loss)",
        }
    }
}
