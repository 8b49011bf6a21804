// librosie.rs - The engine and its C-shaped API.
//
// Function-for-function realization of the librosie surface: engine
// construction/finalization, configuration query, expression
// compilation, pattern release, matching with a chosen output encoding,
// trace generation with selectable style, string/file source loading,
// package import with optional alias, libpath get/set, and the soft
// allocation-limit get/set. Hard failures are status codes; semantic
// failures ride in-band (ok flags, sentinel payloads, diagnostics).
//
// Compiled patterns live in an arena of integer-indexed slots; id 0 is
// reserved as the invalid sentinel and freed slots are reused.

use std::time::Instant;

use serde::Serialize;
use tracing::{debug, warn};

use crate::encoders::Encoder;
use crate::loadpkg;
use crate::rosie::*;
use crate::rpeg::{exec, ExecFault};
use crate::rplcomp::{compile_expression, Compiled, Environment};
use crate::rplparse::{parse_expression, Exp};
use crate::trace::{trace, TraceStyle};

/// Baseline footprint charged to every engine, in bytes.
const ENGINE_BASE_BYTES: usize = 64 * 1024;

/// One live engine: pattern namespace, compiled-pattern arena, import
/// search path, and the soft allocation ceiling. Not `Sync`; callers
/// serialize access per engine.
pub struct RosieEngine {
    env: Environment,
    rplx: Vec<Option<Rplx>>,
    libpath: String,
    alloc_limit_kb: i32,
    limit_base_kb: i32,
}

/// A compiled pattern: the bytecode the VM runs plus the AST the trace
/// evaluator walks.
struct Rplx {
    ast: Exp,
    compiled: Compiled,
}

/// Create an engine. `messages` receives diagnostic text when creation
/// fails (in which case `None` is returned).
pub fn rosie_new(messages: &mut RosieString) -> Option<RosieEngine> {
    messages.clear();
    let mut rplx = Vec::with_capacity(INITIAL_RPLX_SLOTS);
    rplx.resize_with(INITIAL_RPLX_SLOTS, || None);
    debug!("engine created");
    Some(RosieEngine {
        env: Environment::new(),
        rplx,
        libpath: ".".to_string(),
        alloc_limit_kb: 0,
        limit_base_kb: 0,
    })
}

/// Release an engine and everything it owns. Consuming the engine makes
/// release exactly-once by construction.
pub fn rosie_finalize(engine: RosieEngine) {
    debug!("engine finalized");
    drop(engine);
}

#[derive(Serialize)]
struct ConfigEntry {
    name: &'static str,
    value: String,
    desc: &'static str,
}

/// Configuration snapshot as a JSON payload: a list of
/// name/value/description records.
pub fn rosie_config(engine: &RosieEngine) -> Result<RosieString, i32> {
    let entries = vec![
        ConfigEntry {
            name: "ROSIE_VERSION",
            value: env!("CARGO_PKG_VERSION").to_string(),
            desc: "engine version",
        },
        ConfigEntry {
            name: "RPL_VERSION",
            value: RPL_VERSION.to_string(),
            desc: "RPL language version accepted by this engine",
        },
        ConfigEntry {
            name: "ROSIE_LIBPATH",
            value: engine.libpath.clone(),
            desc: "directories searched by import",
        },
        ConfigEntry {
            name: "ROSIE_ALLOC_LIMIT",
            value: engine.alloc_limit_kb.to_string(),
            desc: "soft allocation ceiling in KB (0 = no limit)",
        },
        ConfigEntry {
            name: "ROSIE_MEM_USAGE",
            value: memory_usage_kb(engine).to_string(),
            desc: "approximate engine heap usage in KB",
        },
    ];
    serde_json::to_vec(&entries).map_err(|_| ERR_ENGINE_CALL_FAILED)
}

/// Compile an expression. On success returns a nonzero pattern id and
/// no messages; a rejected expression returns the id 0 sentinel plus a
/// JSON array of diagnostics. No slot is occupied by a failed compile.
pub fn rosie_compile(
    engine: &mut RosieEngine,
    expression: &[u8],
) -> Result<(PatternId, Option<RosieString>), i32> {
    if over_limit(engine) {
        warn!("allocation ceiling exceeded; compile refused");
        return Err(ERR_OUT_OF_MEMORY);
    }
    let ast = match parse_expression(expression) {
        Ok(ast) => ast,
        Err(e) => {
            let msgs = violations_json(&[loadpkg::Violation {
                who: "parser".to_string(),
                message: e.to_string(),
            }])?;
            return Ok((0, Some(msgs)));
        }
    };
    let compiled = match compile_expression(&ast, &engine.env) {
        Ok(c) => c,
        Err(e) => {
            let msgs = violations_json(&[loadpkg::Violation {
                who: "compiler".to_string(),
                message: e.to_string(),
            }])?;
            return Ok((0, Some(msgs)));
        }
    };
    let id = alloc_slot(engine, Rplx { ast, compiled });
    Ok((id, None))
}

/// Release a compiled pattern. Releasing an id that is already free or
/// out of range is a no-op, as in the C library.
pub fn rosie_free_rplx(engine: &mut RosieEngine, pat: PatternId) -> i32 {
    if pat >= 1 {
        if let Some(slot) = engine.rplx.get_mut(pat as usize) {
            *slot = None;
        }
    }
    SUCCESS
}

/// Match `input` against pattern `pat` starting at 1-based `start`,
/// rendering any match with the named encoder. Semantic outcomes (no
/// match, dead pattern, unknown encoder) ride in the result's sentinel;
/// only argument and VM faults are status-code errors.
pub fn rosie_match(
    engine: &RosieEngine,
    pat: PatternId,
    start: i32,
    encoder: &str,
    input: &[u8],
) -> Result<RawMatch, i32> {
    let t0 = Instant::now();
    if start < 1 || start as usize > input.len() + 1 {
        return Err(ERR_ENGINE_CALL_FAILED);
    }
    let rplx = match get_rplx(engine, pat) {
        Some(r) => r,
        None => return Ok(sentinel_match(MatchData::NoPattern)),
    };
    let enc = match Encoder::from_name(encoder) {
        Some(e) => e,
        None => return Ok(sentinel_match(MatchData::NoEncoder)),
    };
    let start0 = (start - 1) as usize;
    let len = input.len();

    let result = exec(&rplx.compiled.program, input, start0).map_err(|fault| {
        let ExecFault::StackLimit = fault;
        warn!("match aborted: backtrack stack limit exceeded");
        ERR_ENGINE_CALL_FAILED
    })?;
    let tmatch = t0.elapsed().as_micros() as i32;

    let raw = if result.abend {
        RawMatch {
            data: MatchData::NoMatch,
            leftover: (len - result.end) as i32,
            abend: true,
            ttotal: t0.elapsed().as_micros() as i32,
            tmatch,
        }
    } else if !result.matched {
        RawMatch {
            data: MatchData::NoMatch,
            leftover: (len - start0) as i32,
            abend: false,
            ttotal: t0.elapsed().as_micros() as i32,
            tmatch,
        }
    } else {
        let data = match result.caps.first() {
            Some(root) => MatchData::Bytes(enc.encode(input, root)),
            None => MatchData::NoMatch,
        };
        RawMatch {
            data,
            leftover: (len - result.end) as i32,
            abend: false,
            ttotal: t0.elapsed().as_micros() as i32,
            tmatch,
        }
    };
    Ok(raw)
}

fn sentinel_match(data: MatchData) -> RawMatch {
    RawMatch {
        data,
        leftover: 0,
        abend: false,
        ttotal: 0,
        tmatch: 0,
    }
}

/// Trace a match attempt in the named style. The style/pattern failure
/// distinction is part of the contract and is preserved in `TraceData`.
pub fn rosie_trace(
    engine: &RosieEngine,
    pat: PatternId,
    start: i32,
    style: &str,
    input: &[u8],
) -> Result<RawTrace, i32> {
    if start < 1 || start as usize > input.len() + 1 {
        return Err(ERR_ENGINE_CALL_FAILED);
    }
    let rplx = match get_rplx(engine, pat) {
        Some(r) => r,
        None => {
            return Ok(RawTrace {
                matched: false,
                data: TraceData::NoPattern,
            })
        }
    };
    let style = match TraceStyle::from_name(style) {
        Some(s) => s,
        None => {
            return Ok(RawTrace {
                matched: false,
                data: TraceData::NoStyle,
            })
        }
    };
    let (matched, text) = trace(&rplx.ast, &engine.env, input, (start - 1) as usize, style);
    Ok(RawTrace {
        matched,
        data: TraceData::Text(text),
    })
}

/// Load RPL source from a string. `ok=false` plus diagnostics is a
/// recoverable outcome; the error path is reserved for the engine
/// itself failing.
pub fn rosie_load(
    engine: &mut RosieEngine,
    src: &[u8],
) -> Result<(bool, String, Option<RosieString>), i32> {
    if over_limit(engine) {
        warn!("allocation ceiling exceeded; load refused");
        return Err(ERR_OUT_OF_MEMORY);
    }
    let libpath = engine.libpath.clone();
    let r = loadpkg::load_string(&mut engine.env, &libpath, src);
    let msgs = messages_json(&r.messages)?;
    Ok((r.ok, r.pkgname, msgs))
}

/// Load RPL source from a file. A missing file is `ok=false` with a
/// diagnostic, not an error.
pub fn rosie_loadfile(
    engine: &mut RosieEngine,
    path: &str,
) -> Result<(bool, String, Option<RosieString>), i32> {
    if over_limit(engine) {
        warn!("allocation ceiling exceeded; load refused");
        return Err(ERR_OUT_OF_MEMORY);
    }
    let libpath = engine.libpath.clone();
    let r = loadpkg::load_file(&mut engine.env, &libpath, path);
    let msgs = messages_json(&r.messages)?;
    Ok((r.ok, r.pkgname, msgs))
}

/// Import a package by name, optionally binding it under an alias.
/// Explicit import always re-reads the package from the libpath.
pub fn rosie_import(
    engine: &mut RosieEngine,
    pkgname: &str,
    as_name: Option<&str>,
) -> Result<(bool, String, Option<RosieString>), i32> {
    if over_limit(engine) {
        warn!("allocation ceiling exceeded; import refused");
        return Err(ERR_OUT_OF_MEMORY);
    }
    let libpath = engine.libpath.clone();
    let r = loadpkg::import_pkg(&mut engine.env, &libpath, pkgname, as_name);
    let msgs = messages_json(&r.messages)?;
    Ok((r.ok, r.pkgname, msgs))
}

/// Get, and optionally set, the colon-separated import search path.
pub fn rosie_libpath(engine: &mut RosieEngine, newpath: Option<&str>) -> String {
    if let Some(p) = newpath {
        debug!(libpath = %p, "libpath changed");
        engine.libpath = p.to_string();
    }
    engine.libpath.clone()
}

/// Get, and optionally set, the soft allocation ceiling (KB above the
/// usage measured at set time). Returns `(limit, current_usage)`.
/// Nonzero values below [`MIN_ALLOC_LIMIT_KB`] are rejected; zero
/// removes the limit.
pub fn rosie_alloc_limit(
    engine: &mut RosieEngine,
    newlimit: Option<i32>,
) -> Result<(i32, i32), i32> {
    if let Some(n) = newlimit {
        if n != 0 && n < MIN_ALLOC_LIMIT_KB {
            return Err(ERR_ENGINE_CALL_FAILED);
        }
        engine.alloc_limit_kb = n;
        engine.limit_base_kb = memory_usage_kb(engine);
        debug!(limit_kb = n, "allocation ceiling changed");
    }
    Ok((engine.alloc_limit_kb, memory_usage_kb(engine)))
}

// === Internals ===

fn get_rplx(engine: &RosieEngine, pat: PatternId) -> Option<&Rplx> {
    if pat < 1 {
        return None;
    }
    engine.rplx.get(pat as usize)?.as_ref()
}

fn alloc_slot(engine: &mut RosieEngine, rplx: Rplx) -> PatternId {
    // Slot 0 stays empty forever: id 0 is the invalid sentinel.
    for (i, slot) in engine.rplx.iter_mut().enumerate().skip(1) {
        if slot.is_none() {
            *slot = Some(rplx);
            return i as PatternId;
        }
    }
    engine.rplx.push(Some(rplx));
    (engine.rplx.len() - 1) as PatternId
}

fn memory_usage_kb(engine: &RosieEngine) -> i32 {
    let rplx_bytes: usize = engine
        .rplx
        .iter()
        .flatten()
        .map(|r| r.compiled.program.footprint_bytes())
        .sum();
    ((ENGINE_BASE_BYTES + rplx_bytes + engine.env.footprint_bytes()) / 1024) as i32
}

fn over_limit(engine: &RosieEngine) -> bool {
    engine.alloc_limit_kb != 0
        && memory_usage_kb(engine) > engine.limit_base_kb + engine.alloc_limit_kb
}

fn violations_json(violations: &[loadpkg::Violation]) -> Result<RosieString, i32> {
    serde_json::to_vec(violations).map_err(|_| ERR_ENGINE_CALL_FAILED)
}

fn messages_json(violations: &[loadpkg::Violation]) -> Result<Option<RosieString>, i32> {
    if violations.is_empty() {
        Ok(None)
    } else {
        Ok(Some(violations_json(violations)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_engine() -> RosieEngine {
        let mut messages = RosieString::new();
        rosie_new(&mut messages).expect("engine")
    }

    #[test]
    fn compile_and_match_digits() {
        let mut e = new_engine();
        let (pat, msgs) = rosie_compile(&mut e, b"[:digit:]+").unwrap();
        assert!(pat > 0);
        assert!(msgs.is_none());

        let m = rosie_match(&e, pat, 1, "json", b"12345").unwrap();
        assert!(matches!(m.data, MatchData::Bytes(_)));
        assert_eq!(m.leftover, 0);
        assert!(!m.abend);
        assert!(m.ttotal >= m.tmatch);
    }

    #[test]
    fn match_is_anchored() {
        let mut e = new_engine();
        let (pat, _) = rosie_compile(&mut e, b"[:digit:]+").unwrap();
        let m = rosie_match(&e, pat, 1, "json", b"kjh12345").unwrap();
        assert_eq!(m.data, MatchData::NoMatch);
        assert_eq!(m.leftover, 8);
        assert!(!m.abend);
    }

    #[test]
    fn match_from_interior_start() {
        let mut e = new_engine();
        let (pat, _) = rosie_compile(&mut e, b"[:digit:]+").unwrap();
        // "321" from position 2 matches "21" with nothing left over.
        let m = rosie_match(&e, pat, 2, "json", b"321").unwrap();
        let payload = match m.data {
            MatchData::Bytes(b) => b,
            other => panic!("expected match, got {:?}", other),
        };
        let v: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(v["type"], "*");
        assert_eq!(v["s"], 2);
        assert_eq!(v["e"], 4);
        assert_eq!(v["data"], "21");
        assert_eq!(m.leftover, 0);
    }

    #[test]
    fn leftover_counts_trailing_bytes() {
        let mut e = new_engine();
        let (pat, _) = rosie_compile(&mut e, b"[:digit:]+").unwrap();
        let m = rosie_match(&e, pat, 1, "json", b"12345xyz").unwrap();
        assert!(matches!(m.data, MatchData::Bytes(_)));
        assert_eq!(m.leftover, 3);
    }

    #[test]
    fn failed_compile_returns_zero_id_and_messages() {
        let mut e = new_engine();
        let (pat, msgs) = rosie_compile(&mut e, b"foo").unwrap();
        assert_eq!(pat, 0);
        let msgs = msgs.expect("diagnostics expected");
        let v: Vec<serde_json::Value> = serde_json::from_slice(&msgs).unwrap();
        assert!(!v.is_empty());
        assert!(v[0]["message"]
            .as_str()
            .unwrap()
            .contains("unbound identifier"));
    }

    #[test]
    fn freed_pattern_is_no_pattern() {
        let mut e = new_engine();
        let (pat, _) = rosie_compile(&mut e, b"[:digit:]+").unwrap();
        assert_eq!(rosie_free_rplx(&mut e, pat), SUCCESS);
        let m = rosie_match(&e, pat, 1, "json", b"123").unwrap();
        assert_eq!(m.data, MatchData::NoPattern);
        // Freeing twice is harmless.
        assert_eq!(rosie_free_rplx(&mut e, pat), SUCCESS);
    }

    #[test]
    fn freed_slot_is_reused() {
        let mut e = new_engine();
        let (a, _) = rosie_compile(&mut e, b"[:digit:]+").unwrap();
        rosie_free_rplx(&mut e, a);
        let (b, _) = rosie_compile(&mut e, b"[:alpha:]+").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_encoder_is_sentinel_not_error() {
        let mut e = new_engine();
        let (pat, _) = rosie_compile(&mut e, b"[:digit:]+").unwrap();
        let m = rosie_match(&e, pat, 1, "no_such_encoder", b"123").unwrap();
        assert_eq!(m.data, MatchData::NoEncoder);
    }

    #[test]
    fn out_of_range_start_is_an_error() {
        let mut e = new_engine();
        let (pat, _) = rosie_compile(&mut e, b"[:digit:]+").unwrap();
        assert_eq!(rosie_match(&e, pat, 0, "json", b"123").unwrap_err(), ERR_ENGINE_CALL_FAILED);
        assert_eq!(rosie_match(&e, pat, 5, "json", b"123").unwrap_err(), ERR_ENGINE_CALL_FAILED);
        // One past the end is legal: the empty tail.
        assert!(rosie_match(&e, pat, 4, "json", b"123").is_ok());
    }

    #[test]
    fn trace_distinguishes_style_and_pattern_failures() {
        let mut e = new_engine();
        let (pat, _) = rosie_compile(&mut e, b"[:digit:]+").unwrap();

        let t = rosie_trace(&e, pat, 1, "fancy", b"123").unwrap();
        assert_eq!(t.data, TraceData::NoStyle);

        let t = rosie_trace(&e, 999, 1, "condensed", b"123").unwrap();
        assert_eq!(t.data, TraceData::NoPattern);

        let t = rosie_trace(&e, pat, 1, "condensed", b"123").unwrap();
        assert!(t.matched);
        assert!(matches!(t.data, TraceData::Text(_)));
    }

    #[test]
    fn load_and_use_binding() {
        let mut e = new_engine();
        let (ok, pkg, msgs) = rosie_load(&mut e, b"w = [:alpha:]+").unwrap();
        assert!(ok);
        assert_eq!(pkg, "");
        assert!(msgs.is_none());

        let (pat, _) = rosie_compile(&mut e, b"w").unwrap();
        assert!(pat > 0);
        let m = rosie_match(&e, pat, 1, "json", b"hello").unwrap();
        let payload = match m.data {
            MatchData::Bytes(b) => b,
            other => panic!("expected match, got {:?}", other),
        };
        let v: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(v["type"], "w");
    }

    #[test]
    fn load_failure_reports_messages() {
        let mut e = new_engine();
        let (ok, pkg, msgs) = rosie_load(&mut e, b"w = [aa]+").unwrap();
        assert!(!ok);
        assert_eq!(pkg, "");
        assert!(msgs.is_some());
    }

    #[test]
    fn libpath_get_set() {
        let mut e = new_engine();
        assert_eq!(rosie_libpath(&mut e, None), ".");
        assert_eq!(rosie_libpath(&mut e, Some("foo")), "foo");
        assert_eq!(rosie_libpath(&mut e, None), "foo");
    }

    #[test]
    fn alloc_limit_validation() {
        let mut e = new_engine();
        assert_eq!(
            rosie_alloc_limit(&mut e, Some(100)).unwrap_err(),
            ERR_ENGINE_CALL_FAILED
        );
        let (limit, usage) = rosie_alloc_limit(&mut e, Some(MIN_ALLOC_LIMIT_KB)).unwrap();
        assert_eq!(limit, MIN_ALLOC_LIMIT_KB);
        assert!(usage > 0);
        let (limit, _) = rosie_alloc_limit(&mut e, Some(0)).unwrap();
        assert_eq!(limit, 0);
        let (limit, _) = rosie_alloc_limit(&mut e, None).unwrap();
        assert_eq!(limit, 0);
    }

    #[test]
    fn config_is_decodable_json() {
        let e = new_engine();
        let payload = rosie_config(&e).unwrap();
        let v: Vec<serde_json::Value> = serde_json::from_slice(&payload).unwrap();
        assert!(v.iter().any(|c| c["name"] == "ROSIE_VERSION"));
        assert!(v.iter().any(|c| c["name"] == "RPL_VERSION"));
        for entry in &v {
            assert!(entry["desc"].as_str().is_some());
        }
    }

    #[test]
    fn engines_are_independent() {
        let mut a = new_engine();
        let b = new_engine();
        let (pa, _) = rosie_compile(&mut a, b"[:digit:]+").unwrap();
        rosie_finalize(b);
        let m = rosie_match(&a, pa, 1, "json", b"42").unwrap();
        assert!(matches!(m.data, MatchData::Bytes(_)));
    }

    #[test]
    fn halt_reports_abend() {
        let mut e = new_engine();
        let (ok, _, _) = rosie_load(&mut e, b"alias h = {\"a\" halt}").unwrap();
        assert!(ok);
        let (pat, _) = rosie_compile(&mut e, b"h").unwrap();
        let m = rosie_match(&e, pat, 1, "json", b"abc").unwrap();
        assert!(m.abend);
        assert_eq!(m.data, MatchData::NoMatch);
    }
}
