// loadpkg.rs - RPL source loading and package import.
//
// Loads are transactional: statements are parsed, bound into a scratch
// environment, and every new binding is compile-checked before anything
// is committed, so a rejected load leaves the engine untouched. Load
// and import failures are semantic outcomes (ok=false plus violation
// records), never errors; only the callers' transport layer produces
// hard errors.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::Serialize;
use tracing::debug;

use crate::rplcomp::{compile_expression, Binding, Environment, Package};
use crate::rplparse::{parse_statements, ImportSpec, ParseError, Stmt};

/// One diagnostic record. Serialized to JSON when crossing the engine
/// boundary; an empty sequence means nothing to report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub who: String,
    pub message: String,
}

impl Violation {
    fn parser(err: &ParseError) -> Violation {
        Violation {
            who: "parser".to_string(),
            message: err.to_string(),
        }
    }

    fn compiler(message: String) -> Violation {
        Violation {
            who: "compiler".to_string(),
            message,
        }
    }

    fn loader(message: String) -> Violation {
        Violation {
            who: "loader".to_string(),
            message,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadResult {
    pub ok: bool,
    /// Declared package name; empty when the source defines no package.
    pub pkgname: String,
    pub messages: Vec<Violation>,
}

#[derive(Debug, Clone, Default)]
pub struct ImportResult {
    pub ok: bool,
    /// The name the package declares for itself, which may differ from
    /// the name it was requested under.
    pub pkgname: String,
    pub messages: Vec<Violation>,
}

/// Load RPL statements from a string into the environment.
pub fn load_string(env: &mut Environment, libpath: &str, src: &[u8]) -> LoadResult {
    load_source(env, libpath, src)
}

/// Load RPL statements from a file. A missing or unreadable file is a
/// recoverable failure, not an error.
pub fn load_file(env: &mut Environment, libpath: &str, path: &str) -> LoadResult {
    match fs::read(path) {
        Ok(src) => load_source(env, libpath, &src),
        Err(e) => LoadResult {
            ok: false,
            pkgname: String::new(),
            messages: vec![Violation::loader(format!(
                "cannot open file '{}': {}",
                path, e
            ))],
        },
    }
}

/// Explicit package import: always re-reads the package from the
/// libpath and rebinds it, replacing prior bindings wholesale.
pub fn import_pkg(
    env: &mut Environment,
    libpath: &str,
    path: &str,
    as_name: Option<&str>,
) -> ImportResult {
    match load_package_file(libpath, path) {
        Ok(pkg) => {
            let actual = pkg.name.clone();
            install_package(env, as_name, pkg);
            debug!(package = %actual, "imported package");
            ImportResult {
                ok: true,
                pkgname: actual,
                messages: Vec::new(),
            }
        }
        Err(messages) => ImportResult {
            ok: false,
            pkgname: String::new(),
            messages,
        },
    }
}

fn load_source(env: &mut Environment, libpath: &str, src: &[u8]) -> LoadResult {
    let stmts = match parse_statements(src) {
        Ok(stmts) => stmts,
        Err(e) => {
            return LoadResult {
                ok: false,
                pkgname: String::new(),
                messages: vec![Violation::parser(&e)],
            }
        }
    };

    if matches!(stmts.first(), Some(Stmt::Package { .. })) {
        // The whole unit is a package; its bindings live in the package
        // namespace, not at top level.
        return match load_package_stmts(&stmts, libpath) {
            Ok(pkg) => {
                let name = pkg.name.clone();
                env.bind_package(&name, pkg);
                debug!(package = %name, "loaded package");
                LoadResult {
                    ok: true,
                    pkgname: name,
                    messages: Vec::new(),
                }
            }
            Err(messages) => LoadResult {
                ok: false,
                pkgname: String::new(),
                messages,
            },
        };
    }

    let mut scratch = env.clone();
    let mut messages = Vec::new();
    let mut bound = Vec::new();
    for stmt in &stmts {
        match stmt {
            Stmt::Package { .. } => messages.push(Violation::loader(
                "package declaration must be the first statement".to_string(),
            )),
            Stmt::Import { specs } => {
                process_imports(&mut scratch, libpath, specs, &mut messages)
            }
            Stmt::Bind {
                name,
                exp,
                alias,
                local,
            } => {
                scratch.bind(
                    name,
                    Binding {
                        exp: exp.clone(),
                        alias: *alias,
                        local: *local,
                    },
                );
                if !bound.contains(name) {
                    bound.push(name.clone());
                }
            }
        }
    }
    validate_bindings(&scratch, &bound, &mut messages);

    if messages.is_empty() {
        *env = scratch;
        LoadResult {
            ok: true,
            pkgname: String::new(),
            messages,
        }
    } else {
        LoadResult {
            ok: false,
            pkgname: String::new(),
            messages,
        }
    }
}

/// Process `import` statements encountered inside loaded source.
/// Already-loaded packages are skipped silently; this is what makes
/// implicit import idempotent.
fn process_imports(
    env: &mut Environment,
    libpath: &str,
    specs: &[ImportSpec],
    messages: &mut Vec<Violation>,
) {
    for spec in specs {
        let reqname = spec.default_name().to_string();
        if env.is_loaded(&reqname) {
            if let Some(as_name) = spec.as_name.as_deref() {
                if as_name != "." {
                    if let Some(pkg) = env.find_loaded(&reqname).cloned() {
                        env.bind_package(as_name, pkg);
                    }
                }
            }
            continue;
        }
        match load_package_file(libpath, &spec.path) {
            Ok(pkg) => install_package(env, spec.as_name.as_deref(), pkg),
            Err(mut vs) => messages.append(&mut vs),
        }
    }
}

fn install_package(env: &mut Environment, as_name: Option<&str>, pkg: Package) {
    match as_name {
        // `import x as .` splices the package into the top-level
        // namespace.
        Some(".") => {
            env.mark_loaded(&pkg.name);
            for (name, binding) in pkg.bindings {
                if !binding.local {
                    env.bind(&name, binding);
                }
            }
        }
        Some(alias) => env.bind_package(alias, pkg),
        None => {
            let name = pkg.name.clone();
            env.bind_package(&name, pkg);
        }
    }
}

fn load_package_file(libpath: &str, path: &str) -> Result<Package, Vec<Violation>> {
    let file = resolve(libpath, path).ok_or_else(|| {
        vec![Violation::loader(format!(
            "cannot find package '{}' (libpath: \"{}\")",
            path, libpath
        ))]
    })?;
    let src = fs::read(&file).map_err(|e| {
        vec![Violation::loader(format!(
            "cannot open file '{}': {}",
            file.display(),
            e
        ))]
    })?;
    let stmts = parse_statements(&src).map_err(|e| vec![Violation::parser(&e)])?;
    if !matches!(stmts.first(), Some(Stmt::Package { .. })) {
        return Err(vec![Violation::loader(format!(
            "imported source '{}' does not declare a package",
            path
        ))]);
    }
    load_package_stmts(&stmts, libpath)
}

/// Build a package from statements whose first entry is its declaration.
/// The package body is loaded into a fresh environment so its bindings
/// cannot collide with the importer's.
fn load_package_stmts(stmts: &[Stmt], libpath: &str) -> Result<Package, Vec<Violation>> {
    let name = match stmts.first() {
        Some(Stmt::Package { name }) => name.clone(),
        _ => unreachable!("caller checked for a package declaration"),
    };
    let mut sub = Environment::new();
    let mut messages = Vec::new();
    let mut bound = Vec::new();
    for stmt in &stmts[1..] {
        match stmt {
            Stmt::Package { .. } => messages.push(Violation::loader(
                "duplicate package declaration".to_string(),
            )),
            Stmt::Import { specs } => process_imports(&mut sub, libpath, specs, &mut messages),
            Stmt::Bind {
                name,
                exp,
                alias,
                local,
            } => {
                sub.bind(
                    name,
                    Binding {
                        exp: exp.clone(),
                        alias: *alias,
                        local: *local,
                    },
                );
                if !bound.contains(name) {
                    bound.push(name.clone());
                }
            }
        }
    }
    validate_bindings(&sub, &bound, &mut messages);
    if !messages.is_empty() {
        return Err(messages);
    }
    let mut bindings = HashMap::new();
    for n in bound {
        if let Some(b) = sub.lookup(None, &n) {
            bindings.insert(n, b.clone());
        }
    }
    Ok(Package { name, bindings })
}

/// Compile-check every new binding so unbound references, bad character
/// classes and cycles are caught at load time.
fn validate_bindings(env: &Environment, bound: &[String], messages: &mut Vec<Violation>) {
    for name in bound {
        if let Some(binding) = env.lookup(None, name) {
            if let Err(e) = compile_expression(&binding.exp, env) {
                messages.push(Violation::compiler(format!("in '{}': {}", name, e)));
            }
        }
    }
}

/// Resolve `path` against the colon-separated libpath, looking for
/// `<dir>/<path>.rpl`.
fn resolve(libpath: &str, path: &str) -> Option<PathBuf> {
    for dir in libpath.split(':').filter(|d| !d.is_empty()) {
        let candidate = PathBuf::from(dir).join(format!("{}.rpl", path));
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}
