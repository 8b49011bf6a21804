//! # Rosella
//!
//! Pure-Rust engine for the [Rosie Pattern Language](https://rosie-lang.org)
//! (RPL) matching contract: engine lifecycle, expression compilation,
//! anchored matching with pluggable output encoders, tracing, RPL source
//! loading, package import over a search path, and soft allocation
//! limits. No bindings, no FFI -- the librosie C API's shapes survive as
//! ordinary Rust functions and types.
//!
//! ## Quick Start
//!
//! ```rust
//! use rosella::prelude::*;
//!
//! let engine = Engine::new().unwrap();
//! let (pat, msgs) = engine.compile("[:digit:]+").unwrap();
//! let pat = pat.expect("compiles cleanly");
//! assert!(msgs.is_empty());
//!
//! let m = pat.match_str("12345").unwrap();
//! assert!(m.data.is_some());
//! assert_eq!(m.leftover, 0);
//! ```
//!
//! Loading definitions and matching by name:
//!
//! ```rust
//! use rosella::prelude::*;
//!
//! let engine = Engine::new().unwrap();
//! let load = engine.load_string("w = [:alpha:]+").unwrap();
//! assert!(load.ok);
//!
//! let (pat, _) = engine.compile("w").unwrap();
//! let m = pat.unwrap().match_str("hello").unwrap();
//! assert_eq!(m.data.unwrap()["type"], "w");
//! ```
//!
//! ## Low-Level C-Style API
//!
//! The C library's surface is also available directly, status codes,
//! sentinel protocol and all:
//!
//! ```rust
//! use rosella::librosie::*;
//! use rosella::rosie::*;
//!
//! let mut messages = RosieString::new();
//! let mut engine = rosie_new(&mut messages).unwrap();
//!
//! let (pat, msgs) = rosie_compile(&mut engine, b"[:digit:]+").unwrap();
//! assert!(pat > 0 && msgs.is_none());
//!
//! let m = rosie_match(&engine, pat, 1, "json", b"12345").unwrap();
//! assert!(matches!(m.data, MatchData::Bytes(_)));
//! assert_eq!(m.leftover, 0);
//!
//! rosie_free_rplx(&mut engine, pat);
//! rosie_finalize(engine);
//! ```
//!
//! ## Module Structure
//!
//! Each area of the original library maps to one module:
//!
//! | Original | Rust Module | Purpose |
//! |----------|-------------|---------|
//! | `librosie.c` | [`librosie`] | Engine, pattern arena, C-shaped API |
//! | `librosie.h` | [`rosie`] | Public constants, status/sentinel codes |
//! | RPL parser | [`rplparse`] | Expression/statement parser |
//! | RPL compiler | [`rplcomp`] | AST-to-bytecode compiler, environment |
//! | rpeg VM | [`rpeg`] | Backtracking PEG matching VM |
//! | output encoders | [`encoders`] | json / line / bool / data renderings |
//! | trace | [`trace`] | AST-walking trace evaluator and styles |
//! | load/import | [`loadpkg`] | Source loading, packages, libpath |

pub mod api;
pub mod encoders;
pub mod error;
pub mod librosie;
pub mod loadpkg;
pub mod prelude;
pub mod rosie;
pub mod rpeg;
pub mod rplcomp;
pub mod rplparse;
pub mod trace;
