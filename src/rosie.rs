// rosie.rs - Public types and constants.
//
// The status codes and the sentinel protocol mirror librosie.h, so that
// code written against the C library's contract translates directly.

/// Call completed normally (including semantic failures reported in-band).
pub const SUCCESS: i32 = 0;
/// Allocation failed, or the soft allocation ceiling was exceeded.
pub const ERR_OUT_OF_MEMORY: i32 = -2;
/// An OS-level operation (file read, path lookup) failed unexpectedly.
pub const ERR_SYSCALL_FAILED: i32 = -3;
/// The engine itself failed: bad argument, internal limit, or a bug.
pub const ERR_ENGINE_CALL_FAILED: i32 = -4;

// Sentinel explanation codes. The C library returned these in the `len`
// field of a rosie_string whose `ptr` was NULL; here they survive as the
// discriminants of `MatchData` and `TraceData`.
pub const ERR_NO_MATCH: i32 = 0;
pub const ERR_NO_PATTERN: i32 = 1;
pub const ERR_NO_ENCODER: i32 = 2; // also used for "no such trace style"
pub const ERR_NO_FILE: i32 = 3;

/// Initial size of an engine's compiled-pattern arena.
pub const INITIAL_RPLX_SLOTS: usize = 32;

/// Smallest accepted nonzero allocation ceiling, in kilobytes.
/// Zero means "no limit".
pub const MIN_ALLOC_LIMIT_KB: i32 = 8192;

/// Default ceiling on the matching VM's backtrack stack.
pub const DEFAULT_MATCH_STACK_LIMIT: usize = 10_000;

/// Version of the RPL dialect accepted by this engine.
pub const RPL_VERSION: &str = "1.1";

/// Pattern handles are integers scoped to their owning engine.
/// Zero is the invalid sentinel; a freed handle is reset to it.
pub type PatternId = i32;

/// Byte payloads crossing the engine boundary. The C library used
/// length-prefixed buffers (never NUL-terminated) so that embedded and
/// invalid byte sequences round-trip; `Vec<u8>` has the same property.
pub type RosieString = Vec<u8>;

/// Encoded match payload, or the reason there is none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchData {
    /// The match succeeded; payload is in the requested encoding.
    Bytes(RosieString),
    /// The pattern did not match at the requested position.
    NoMatch,
    /// The pattern id names no live compiled pattern.
    NoPattern,
    /// The output encoder name is not recognized.
    NoEncoder,
}

impl MatchData {
    /// The sentinel code the C library would have reported for this state.
    pub fn sentinel(&self) -> Option<i32> {
        match self {
            MatchData::Bytes(_) => None,
            MatchData::NoMatch => Some(ERR_NO_MATCH),
            MatchData::NoPattern => Some(ERR_NO_PATTERN),
            MatchData::NoEncoder => Some(ERR_NO_ENCODER),
        }
    }
}

/// Result of one match call, mirroring `struct rosie_matchresult`.
///
/// `leftover` counts input bytes after the matched region (the whole
/// remainder from `start` when nothing matched). Times are microseconds:
/// `tmatch` for the VM run alone, `ttotal` including output encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMatch {
    pub data: MatchData,
    pub leftover: i32,
    pub abend: bool,
    pub ttotal: i32,
    pub tmatch: i32,
}

/// Trace payload, or the reason there is none. Distinguishing an unknown
/// style from a dead pattern is part of the contract: callers map the two
/// to different errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceData {
    Text(RosieString),
    NoStyle,
    NoPattern,
}

/// Result of one trace call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTrace {
    pub matched: bool,
    pub data: TraceData,
}
