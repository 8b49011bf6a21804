// api.rs - Idiomatic Rust API for rosella.
//
// Wraps the C-shaped layer (rosie_new, rosie_match, etc.) with
// Rust-native types: Engine, Pattern, Match, Messages, Configuration.
// Resource release is deterministic: Engine and Pattern free their
// underlying resources on drop, and a Pattern cannot outlive its
// Engine.

use std::cell::{Cell, RefCell};
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::RosieError;
use crate::librosie::{
    rosie_alloc_limit, rosie_compile, rosie_config, rosie_finalize, rosie_free_rplx,
    rosie_libpath, rosie_load, rosie_loadfile, rosie_import, rosie_match, rosie_new,
    rosie_trace, RosieEngine,
};
use crate::rosie::{MatchData, PatternId, RosieString, TraceData};

/// Diagnostic records accompanying compile/load/import outcomes.
/// Empty means nothing to report.
pub type Messages = Vec<Value>;

/// One engine configuration record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConfigEntry {
    pub name: String,
    pub value: String,
    pub desc: String,
}

/// Read-only snapshot of the engine's configuration.
pub type Configuration = Vec<ConfigEntry>;

/// Outcome of loading RPL source. `ok=false` with messages is a
/// recoverable rejection, not an error.
#[derive(Debug, Clone)]
pub struct Load {
    pub ok: bool,
    /// Package declared by the source; empty when it declares none.
    pub pkgname: String,
    pub messages: Messages,
}

/// Outcome of a package import.
#[derive(Debug, Clone)]
pub struct Import {
    pub ok: bool,
    /// The name the package declares for itself.
    pub pkgname: String,
    pub messages: Messages,
}

/// Result of a match call.
///
/// `data` is the decoded JSON match tree, absent when the pattern did
/// not match. `leftover` counts input bytes after the matched region.
/// Times are microseconds.
#[derive(Debug, Clone)]
pub struct Match {
    pub data: Option<Value>,
    pub leftover: usize,
    pub abend: bool,
    pub total_time: i32,
    pub match_time: i32,
}

/// Like [`Match`], but carrying the raw payload of whichever output
/// encoder was requested instead of a decoded tree.
#[derive(Debug, Clone)]
pub struct EncodedMatch {
    pub data: Option<Vec<u8>>,
    pub leftover: usize,
    pub abend: bool,
    pub total_time: i32,
    pub match_time: i32,
}

/// A Rosie Pattern Language engine.
///
/// Engines are independent; create as many as needed, but access each
/// from one thread at a time.
///
/// # Examples
///
/// ```
/// use rosella::api::Engine;
///
/// let engine = Engine::new().unwrap();
/// let (pat, msgs) = engine.compile("[:digit:]+").unwrap();
/// let pat = pat.expect("compiles cleanly");
/// assert!(msgs.is_empty());
///
/// let m = pat.match_str("12345").unwrap();
/// assert!(m.data.is_some());
/// assert_eq!(m.leftover, 0);
/// ```
pub struct Engine {
    raw: RefCell<RosieEngine>,
}

impl Engine {
    /// Create a new engine. On failure the error carries the engine's
    /// diagnostic text when available.
    pub fn new() -> Result<Engine, RosieError> {
        let mut messages = RosieString::new();
        match rosie_new(&mut messages) {
            Some(raw) => Ok(Engine {
                raw: RefCell::new(raw),
            }),
            None => {
                let message = if messages.is_empty() {
                    "initialization failed with an unknown error".to_string()
                } else {
                    String::from_utf8_lossy(&messages).into_owned()
                };
                Err(RosieError::Initialization { message })
            }
        }
    }

    /// Release the engine now. Dropping has the same effect; this form
    /// just makes the timing explicit.
    pub fn finalize(self) {
        rosie_finalize(self.raw.into_inner());
    }

    /// Fetch and decode the engine's configuration.
    pub fn config(&self) -> Result<Configuration, RosieError> {
        let payload = rosie_config(&self.raw.borrow()).map_err(RosieError::from)?;
        let cfg = serde_json::from_slice(&payload)?;
        Ok(cfg)
    }

    /// Compile an expression. A rejected expression yields `None` plus
    /// diagnostics; `Err` is reserved for the engine itself failing.
    pub fn compile(&self, exp: &str) -> Result<(Option<Pattern<'_>>, Messages), RosieError> {
        let (id, msgs) =
            rosie_compile(&mut self.raw.borrow_mut(), exp.as_bytes()).map_err(RosieError::from)?;
        let messages = decode_messages(msgs)?;
        if id == 0 {
            Ok((None, messages))
        } else {
            Ok((
                Some(Pattern {
                    id: Cell::new(id),
                    engine: self,
                }),
                messages,
            ))
        }
    }

    /// Load RPL source from a string into the engine.
    pub fn load_string(&self, src: &str) -> Result<Load, RosieError> {
        let (ok, pkgname, msgs) =
            rosie_load(&mut self.raw.borrow_mut(), src.as_bytes()).map_err(RosieError::from)?;
        Ok(Load {
            ok,
            pkgname,
            messages: decode_messages(msgs)?,
        })
    }

    /// Load RPL source from a file. A missing file is a rejection with
    /// diagnostics, not an error.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<Load, RosieError> {
        let path = path.as_ref().to_string_lossy().into_owned();
        let (ok, pkgname, msgs) =
            rosie_loadfile(&mut self.raw.borrow_mut(), &path).map_err(RosieError::from)?;
        Ok(Load {
            ok,
            pkgname,
            messages: decode_messages(msgs)?,
        })
    }

    /// Import a package via the libpath, binding it under its own name.
    pub fn import_pkg(&self, name: &str) -> Result<Import, RosieError> {
        self.import(name, None)
    }

    /// Import a package via the libpath, binding it under `alias`.
    pub fn import_pkg_as(&self, name: &str, alias: &str) -> Result<Import, RosieError> {
        self.import(name, Some(alias))
    }

    fn import(&self, name: &str, alias: Option<&str>) -> Result<Import, RosieError> {
        let (ok, pkgname, msgs) =
            rosie_import(&mut self.raw.borrow_mut(), name, alias).map_err(RosieError::from)?;
        Ok(Import {
            ok,
            pkgname,
            messages: decode_messages(msgs)?,
        })
    }

    /// The colon-separated directory list consulted by import.
    pub fn libpath(&self) -> String {
        rosie_libpath(&mut self.raw.borrow_mut(), None)
    }

    pub fn set_libpath(&self, path: &str) {
        rosie_libpath(&mut self.raw.borrow_mut(), Some(path));
    }

    /// Current `(limit, usage)` in kilobytes. A limit of zero means no
    /// ceiling.
    pub fn alloc_limit(&self) -> Result<(i32, i32), RosieError> {
        rosie_alloc_limit(&mut self.raw.borrow_mut(), None).map_err(RosieError::from)
    }

    /// Set the soft allocation ceiling, in kilobytes above current
    /// usage. Zero removes the ceiling; nonzero values below the
    /// minimum are rejected.
    pub fn set_alloc_limit(&self, kb: i32) -> Result<(i32, i32), RosieError> {
        rosie_alloc_limit(&mut self.raw.borrow_mut(), Some(kb)).map_err(|_| {
            RosieError::InvalidArgument {
                message: "new allocation limit must be 8192 KB or higher (or zero for unlimited)"
                    .to_string(),
            }
        })
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

// === Pattern ===

/// A compiled pattern, owned by the engine that compiled it. Freed on
/// drop; cannot outlive its engine.
pub struct Pattern<'e> {
    id: Cell<PatternId>,
    engine: &'e Engine,
}

impl<'e> Pattern<'e> {
    /// The pattern's id within its engine (nonzero while live).
    pub fn id(&self) -> PatternId {
        self.id.get()
    }

    /// Match against `input` from the beginning.
    pub fn match_str(&self, input: &str) -> Result<Match, RosieError> {
        self.match_bytes_from(input.as_bytes(), 1)
    }

    /// Match against `input` starting at 1-based byte position `start`.
    pub fn match_str_from(&self, input: &str, start: usize) -> Result<Match, RosieError> {
        self.match_bytes_from(input.as_bytes(), start)
    }

    /// Match against a byte slice from the beginning.
    pub fn match_bytes(&self, input: &[u8]) -> Result<Match, RosieError> {
        self.match_bytes_from(input, 1)
    }

    /// Match against a byte slice starting at 1-based `start`, decoding
    /// the json encoder's output into a structured tree.
    pub fn match_bytes_from(&self, input: &[u8], start: usize) -> Result<Match, RosieError> {
        let raw = rosie_match(
            &self.engine.raw.borrow(),
            self.id.get(),
            start as i32,
            "json",
            input,
        )
        .map_err(RosieError::from)?;
        let data = match raw.data {
            MatchData::Bytes(payload) => Some(serde_json::from_slice(&payload)?),
            MatchData::NoMatch => None,
            MatchData::NoPattern => return Err(RosieError::NoPattern),
            MatchData::NoEncoder => return Err(RosieError::NoEncoder),
        };
        Ok(Match {
            data,
            leftover: raw.leftover as usize,
            abend: raw.abend,
            total_time: raw.ttotal,
            match_time: raw.tmatch,
        })
    }

    /// Match with an explicit output encoder, returning its raw payload.
    pub fn match_encoded(
        &self,
        input: &[u8],
        start: usize,
        encoder: &str,
    ) -> Result<EncodedMatch, RosieError> {
        let raw = rosie_match(
            &self.engine.raw.borrow(),
            self.id.get(),
            start as i32,
            encoder,
            input,
        )
        .map_err(RosieError::from)?;
        let data = match raw.data {
            MatchData::Bytes(payload) => Some(payload),
            MatchData::NoMatch => None,
            MatchData::NoPattern => return Err(RosieError::NoPattern),
            MatchData::NoEncoder => return Err(RosieError::NoEncoder),
        };
        Ok(EncodedMatch {
            data,
            leftover: raw.leftover as usize,
            abend: raw.abend,
            total_time: raw.ttotal,
            match_time: raw.tmatch,
        })
    }

    /// Produce a trace of the match attempt in the given style
    /// (`"condensed"`, `"full"`, or `"json"`). Returns the overall
    /// outcome and the rendered trace text.
    pub fn trace(&self, input: &str, start: usize, style: &str) -> Result<(bool, String), RosieError> {
        let raw = rosie_trace(
            &self.engine.raw.borrow(),
            self.id.get(),
            start as i32,
            style,
            input.as_bytes(),
        )
        .map_err(RosieError::from)?;
        match raw.data {
            TraceData::Text(text) => {
                Ok((raw.matched, String::from_utf8_lossy(&text).into_owned()))
            }
            TraceData::NoStyle => Err(RosieError::NoEncoder),
            TraceData::NoPattern => Err(RosieError::NoPattern),
        }
    }

    /// Release the pattern now. Dropping has the same effect.
    pub fn free(self) {
        drop(self);
    }
}

impl Drop for Pattern<'_> {
    fn drop(&mut self) {
        let id = self.id.replace(0);
        if id != 0 {
            rosie_free_rplx(&mut self.engine.raw.borrow_mut(), id);
        }
    }
}

impl std::fmt::Debug for Pattern<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pattern").field("id", &self.id.get()).finish()
    }
}

fn decode_messages(payload: Option<RosieString>) -> Result<Messages, RosieError> {
    match payload {
        None => Ok(Messages::new()),
        Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_new_and_config() {
        let engine = Engine::new().unwrap();
        let cfg = engine.config().unwrap();
        assert!(cfg.iter().any(|c| c.name == "ROSIE_VERSION"));
        assert!(cfg.iter().all(|c| !c.desc.is_empty()));
    }

    #[test]
    fn compile_match_roundtrip() {
        let engine = Engine::new().unwrap();
        let (pat, msgs) = engine.compile("[:digit:]+").unwrap();
        let pat = pat.expect("valid pattern");
        assert!(msgs.is_empty());

        let m = pat.match_str("12345").unwrap();
        let data = m.data.expect("match succeeds");
        assert_eq!(data["type"], "*");
        assert_eq!(data["data"], "12345");
        assert_eq!(m.leftover, 0);
        assert!(!m.abend);
    }

    #[test]
    fn anchored_no_match_is_not_an_error() {
        let engine = Engine::new().unwrap();
        let (pat, _) = engine.compile("[:digit:]+").unwrap();
        let pat = pat.unwrap();
        let m = pat.match_str("kjh12345").unwrap();
        assert!(m.data.is_none());
        assert_eq!(m.leftover, 8);
    }

    #[test]
    fn invalid_expression_yields_no_pattern_plus_messages() {
        let engine = Engine::new().unwrap();
        let (pat, msgs) = engine.compile("foo").unwrap();
        assert!(pat.is_none());
        assert!(!msgs.is_empty());
    }

    #[test]
    fn pattern_drop_frees_slot() {
        let engine = Engine::new().unwrap();
        let first_id;
        {
            let (pat, _) = engine.compile("[:digit:]+").unwrap();
            first_id = pat.unwrap().id();
        }
        let (pat, _) = engine.compile("[:alpha:]+").unwrap();
        assert_eq!(pat.unwrap().id(), first_id);
    }

    #[test]
    fn match_encoded_line() {
        let engine = Engine::new().unwrap();
        let (pat, _) = engine.compile("\"123\"").unwrap();
        let pat = pat.unwrap();
        let m = pat.match_encoded(b"abc\n123 tail\nxyz", 5, "line").unwrap();
        assert_eq!(m.data.as_deref(), Some(b"123 tail".as_slice()));
    }

    #[test]
    fn unknown_encoder_is_error_at_this_layer() {
        let engine = Engine::new().unwrap();
        let (pat, _) = engine.compile("\"a\"").unwrap();
        let pat = pat.unwrap();
        let err = pat.match_encoded(b"a", 1, "nope").unwrap_err();
        assert!(matches!(err, RosieError::NoEncoder));
    }

    #[test]
    fn trace_styles_and_failures() {
        let engine = Engine::new().unwrap();
        let (pat, _) = engine.compile("[:digit:]+").unwrap();
        let pat = pat.unwrap();

        let (matched, text) = pat.trace("123", 1, "condensed").unwrap();
        assert!(matched);
        assert!(!text.is_empty());

        let err = pat.trace("123", 1, "fancy").unwrap_err();
        assert!(matches!(err, RosieError::NoEncoder));
    }

    #[test]
    fn load_and_import_surface() {
        let engine = Engine::new().unwrap();
        let load = engine.load_string("w = [:alpha:]+").unwrap();
        assert!(load.ok);
        assert_eq!(load.pkgname, "");
        assert!(load.messages.is_empty());

        let load = engine.load_string("w = [aa]+").unwrap();
        assert!(!load.ok);
        assert!(!load.messages.is_empty());

        let import = engine.import_pkg("foobarbaz").unwrap();
        assert!(!import.ok);
        assert_eq!(import.pkgname, "");
        assert!(!import.messages.is_empty());
    }

    #[test]
    fn libpath_and_alloc_limit() {
        let engine = Engine::new().unwrap();
        engine.set_libpath("foo");
        assert_eq!(engine.libpath(), "foo");

        let err = engine.set_alloc_limit(100).unwrap_err();
        assert!(matches!(err, RosieError::InvalidArgument { .. }));
        let (limit, usage) = engine.set_alloc_limit(8192).unwrap();
        assert_eq!(limit, 8192);
        assert!(usage > 0);
        let (limit, _) = engine.set_alloc_limit(0).unwrap();
        assert_eq!(limit, 0);
    }

    #[test]
    fn explicit_finalize() {
        let engine = Engine::new().unwrap();
        let load = engine.load_string("w = [:alpha:]+").unwrap();
        assert!(load.ok);
        engine.finalize();
    }
}
