// prelude.rs - Convenient re-exports for the idiomatic API.
//
//! # Prelude
//!
//! ```
//! use rosella::prelude::*;
//!
//! let engine = Engine::new().unwrap();
//! let (pat, _msgs) = engine.compile("[:digit:]+").unwrap();
//! let m = pat.unwrap().match_str("12345").unwrap();
//! assert!(m.data.is_some());
//! ```

pub use crate::api::{
    ConfigEntry, Configuration, EncodedMatch, Engine, Import, Load, Match, Messages, Pattern,
};
pub use crate::error::RosieError;
