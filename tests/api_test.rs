// api_test.rs - Integration tests for the idiomatic API.
//
// Follows the shape of the classic librosie driver programs: engine
// lifecycle, config, compile (valid and invalid), anchored matching,
// string/file loading, package import with and without alias, libpath.

use std::fs;

use rosella::prelude::*;
use tempfile::TempDir;

#[test]
fn two_engines_are_independently_finalizable() {
    let first = Engine::new().unwrap();
    let second = Engine::new().unwrap();

    let (pat, _) = first.compile("[:digit:]+").unwrap();
    let pat = pat.unwrap();

    second.finalize();

    // The surviving engine still matches.
    let m = pat.match_str("42").unwrap();
    assert!(m.data.is_some());
}

#[test]
fn config_reports_name_value_desc_records() {
    let engine = Engine::new().unwrap();
    let cfg = engine.config().unwrap();
    assert!(!cfg.is_empty());
    for entry in &cfg {
        assert!(!entry.name.is_empty());
        assert!(!entry.desc.is_empty());
    }
    assert!(cfg.iter().any(|e| e.name == "ROSIE_LIBPATH"));
}

#[test]
fn compiling_a_bare_identifier_fails_with_diagnostics() {
    let engine = Engine::new().unwrap();
    let (pat, msgs) = engine.compile("foo").unwrap();
    assert!(pat.is_none());
    assert!(!msgs.is_empty());
}

#[test]
fn digits_pattern_compile_and_match_loop() {
    let engine = Engine::new().unwrap();
    for i in 0..4 {
        let (pat, msgs) = engine.compile("[:digit:]+").unwrap();
        let pat = pat.expect("pattern compiles");
        assert!(msgs.is_empty());

        if i % 2 == 0 {
            let m = pat.match_str("12345").unwrap();
            let data = m.data.expect("digits match");
            assert_eq!(data["data"], "12345");
            assert_eq!(m.leftover, 0);
            assert!(!m.abend);
            assert!(m.total_time >= 0 && m.match_time >= 0);
        } else {
            // Matching is anchored, so a non-digit prefix fails without
            // raising an error.
            let m = pat.match_str("kjh12345").unwrap();
            assert!(m.data.is_none());
            assert!(!m.abend);
        }
    }
}

#[test]
fn match_from_reports_one_based_positions() {
    let engine = Engine::new().unwrap();
    let (pat, _) = engine.compile("[:digit:]+").unwrap();
    let pat = pat.unwrap();

    let m = pat.match_str_from("321", 2).unwrap();
    let data = m.data.expect("suffix matches");
    assert_eq!(data["s"], 2);
    assert_eq!(data["e"], 4);
    assert_eq!(data["data"], "21");
    assert_eq!(m.leftover, 0);
}

#[test]
fn leftover_counts_unconsumed_tail() {
    let engine = Engine::new().unwrap();
    let (pat, _) = engine.compile("[:digit:]+").unwrap();
    let pat = pat.unwrap();

    let input = "889900112233445566778899100101102103104105106107108109110xyz";
    let m = pat.match_str(input).unwrap();
    let data = m.data.expect("digit prefix matches");
    assert_eq!(data["data"], input[..input.len() - 3]);
    assert_eq!(m.leftover, 3);

    // No match leaves the whole remainder.
    let m = pat.match_str("xyz").unwrap();
    assert!(m.data.is_none());
    assert_eq!(m.leftover, 3);
}

#[test]
fn load_string_binds_definitions() {
    let engine = Engine::new().unwrap();
    let load = engine.load_string("w = [:alpha:]+").unwrap();
    assert!(load.ok);
    assert_eq!(load.pkgname, "");
    assert!(load.messages.is_empty());

    let (pat, _) = engine.compile("w").unwrap();
    let m = pat.unwrap().match_str("hello world").unwrap();
    let data = m.data.expect("word matches");
    assert_eq!(data["type"], "w");
    assert_eq!(data["data"], "hello");
}

#[test]
fn load_string_with_bad_charset_is_rejected_not_an_error() {
    let engine = Engine::new().unwrap();
    let load = engine.load_string("w = [aa]+").unwrap();
    assert!(!load.ok);
    assert_eq!(load.pkgname, "");
    assert!(!load.messages.is_empty());
}

#[test]
fn load_file_returns_declared_package() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test.rpl");
    fs::write(&path, "package test\nw = [:alpha:]+\n").unwrap();

    let engine = Engine::new().unwrap();
    let load = engine.load_file(&path).unwrap();
    assert!(load.ok, "{:?}", load.messages);
    assert_eq!(load.pkgname, "test");
    assert!(load.messages.is_empty());

    let (pat, _) = engine.compile("test.w").unwrap();
    let m = pat.unwrap().match_str("abc").unwrap();
    assert_eq!(m.data.unwrap()["type"], "test.w");
}

#[test]
fn load_file_missing_is_rejected_not_an_error() {
    let engine = Engine::new().unwrap();
    let load = engine.load_file("test.foobar").unwrap();
    assert!(!load.ok);
    assert_eq!(load.pkgname, "");
    assert!(!load.messages.is_empty());
}

fn pkg_fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("num.rpl"),
        "package num\nint = [:digit:]+\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("net.rpl"),
        "package net\nword = [:alnum:]+\n",
    )
    .unwrap();
    dir
}

#[test]
fn import_binds_package_under_its_name() {
    let dir = pkg_fixture();
    let engine = Engine::new().unwrap();
    engine.set_libpath(&dir.path().to_string_lossy());

    let import = engine.import_pkg("num").unwrap();
    assert!(import.ok, "{:?}", import.messages);
    assert_eq!(import.pkgname, "num");
    assert!(import.messages.is_empty());

    let (pat, _) = engine.compile("num.int").unwrap();
    let m = pat.unwrap().match_str("123").unwrap();
    assert_eq!(m.data.unwrap()["type"], "num.int");
}

#[test]
fn import_unknown_package_is_rejected_not_an_error() {
    let engine = Engine::new().unwrap();
    let import = engine.import_pkg("foobarbaz").unwrap();
    assert!(!import.ok);
    assert_eq!(import.pkgname, "");
    assert!(!import.messages.is_empty());
}

#[test]
fn import_as_binds_under_alias() {
    let dir = pkg_fixture();
    let engine = Engine::new().unwrap();
    engine.set_libpath(&dir.path().to_string_lossy());

    let import = engine.import_pkg_as("net", "NET").unwrap();
    assert!(import.ok, "{:?}", import.messages);
    assert_eq!(import.pkgname, "net");

    let (pat, _) = engine.compile("NET.word").unwrap();
    assert!(pat.is_some());
    // The original name is not bound.
    let (pat, msgs) = engine.compile("net.word").unwrap();
    assert!(pat.is_none());
    assert!(!msgs.is_empty());
}

#[test]
fn import_as_unknown_package_is_rejected() {
    let engine = Engine::new().unwrap();
    let import = engine.import_pkg_as("foobarbaz", "foo").unwrap();
    assert!(!import.ok);
    assert_eq!(import.pkgname, "");
    assert!(!import.messages.is_empty());
}

#[test]
fn libpath_roundtrip() {
    let engine = Engine::new().unwrap();
    let initial = engine.libpath();
    assert!(!initial.is_empty());

    engine.set_libpath("foo");
    assert_eq!(engine.libpath(), "foo");
}
