// rplcomp.rs - AST-to-bytecode compiler and the engine environment.
//
// Turns parsed RPL expressions into rpeg programs. References are
// resolved against the environment and inlined at their use site
// (the dialect has no recursion, so inlining always terminates; cycles
// are rejected). Non-alias references compile to named captures, alias
// references are transparent. Cooked (tokenized) sequences interleave
// the `~` boundary pattern, which is itself an ordinary overridable
// binding.

use std::collections::{HashMap, HashSet};

use crate::rpeg::{CharClass, Inst, Program};
use crate::rplparse::{Charset, CsItem, Exp};

// === Environment ===

#[derive(Debug, Clone)]
pub struct Binding {
    pub exp: Exp,
    pub alias: bool,
    pub local: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Package {
    /// Declared (actual) package name, independent of the name it is
    /// bound under in an importing environment.
    pub name: String,
    pub bindings: HashMap<String, Binding>,
}

/// One engine's pattern namespace: top-level bindings plus imported
/// packages. Also tracks which packages have been loaded, for the
/// idempotence of implicit imports.
#[derive(Debug, Clone)]
pub struct Environment {
    top: HashMap<String, Binding>,
    packages: HashMap<String, Package>,
    loaded: HashSet<String>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        let mut env = Environment {
            top: HashMap::new(),
            packages: HashMap::new(),
            loaded: HashSet::new(),
        };
        // Built-in boundary: whitespace, or end of input, or punctuation
        // ahead. Overridable like any other binding.
        env.bind(
            "~",
            Binding {
                exp: default_boundary(),
                alias: true,
                local: false,
            },
        );
        env.bind(
            "halt",
            Binding {
                exp: Exp::Halt,
                alias: true,
                local: false,
            },
        );
        env
    }

    pub fn bind(&mut self, name: &str, binding: Binding) {
        self.top.insert(name.to_string(), binding);
    }

    pub fn lookup(&self, pkg: Option<&str>, name: &str) -> Option<&Binding> {
        match pkg {
            Some(p) => {
                let b = self.packages.get(p)?.bindings.get(name)?;
                if b.local {
                    None
                } else {
                    Some(b)
                }
            }
            None => self.top.get(name),
        }
    }

    /// Bind a package under `bound_name` (its declared name or an
    /// import alias), replacing any previous binding of that name.
    pub fn bind_package(&mut self, bound_name: &str, pkg: Package) {
        self.loaded.insert(pkg.name.clone());
        self.packages.insert(bound_name.to_string(), pkg);
    }

    pub fn package(&self, bound_name: &str) -> Option<&Package> {
        self.packages.get(bound_name)
    }

    pub fn is_loaded(&self, actual_name: &str) -> bool {
        self.loaded.contains(actual_name)
    }

    pub fn mark_loaded(&mut self, actual_name: &str) {
        self.loaded.insert(actual_name.to_string());
    }

    /// Find an already-loaded package by its declared name, regardless
    /// of the name it is bound under.
    pub fn find_loaded(&self, actual_name: &str) -> Option<&Package> {
        self.packages.values().find(|p| p.name == actual_name)
    }

    /// Approximate heap footprint for allocation accounting.
    pub fn footprint_bytes(&self) -> usize {
        let binding_bytes = |b: &Binding| node_count(&b.exp) * 48;
        self.top
            .iter()
            .map(|(k, b)| k.len() + binding_bytes(b))
            .sum::<usize>()
            + self
                .packages
                .values()
                .flat_map(|p| p.bindings.iter())
                .map(|(k, b)| k.len() + binding_bytes(b))
                .sum::<usize>()
    }
}

fn default_boundary() -> Exp {
    // { [:space:]+ / $ / >[:punct:] }
    Exp::Raw(Box::new(Exp::Choice(
        Box::new(Exp::Repeat {
            exp: Box::new(Exp::Charset(Charset::Named {
                name: "space".to_string(),
                complement: false,
            })),
            min: 1,
            max: None,
        }),
        Box::new(Exp::Choice(
            Box::new(Exp::End),
            Box::new(Exp::Ahead(Box::new(Exp::Charset(Charset::Named {
                name: "punct".to_string(),
                complement: false,
            })))),
        )),
    )))
}

/// Number of AST nodes, used for footprint estimates.
pub fn node_count(exp: &Exp) -> usize {
    1 + match exp {
        Exp::Seq(items) => items.iter().map(node_count).sum(),
        Exp::Choice(a, b) => node_count(a) + node_count(b),
        Exp::Repeat { exp, .. } => node_count(exp),
        Exp::Not(e) | Exp::Ahead(e) | Exp::Cooked(e) | Exp::Raw(e) => node_count(e),
        _ => 0,
    }
}

// === Compilation ===

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub message: String,
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CompileError {}

/// A compiled pattern body plus the name its match nodes carry.
#[derive(Debug, Clone)]
pub struct Compiled {
    pub program: Program,
    pub typename: String,
}

/// Compile an expression against an environment. Failure here is a
/// semantic outcome (reported as diagnostics by callers), not an
/// engine error.
pub fn compile_expression(exp: &Exp, env: &Environment) -> Result<Compiled, CompileError> {
    let mut cg = Codegen {
        env,
        prog: Program::default(),
        in_progress: Vec::new(),
    };
    // A bare reference to a named (non-alias) pattern keeps that name as
    // its match type; everything else matches as the anonymous "*".
    let direct_name = match exp {
        Exp::Ref { pkg, name } => match env.lookup(pkg.as_deref(), name) {
            Some(b) if !b.alias => Some(qualify(pkg.as_deref(), name)),
            _ => None,
        },
        _ => None,
    };
    match direct_name {
        Some(typename) => {
            cg.gen(exp, true)?;
            cg.emit(Inst::End);
            Ok(Compiled {
                program: cg.prog,
                typename,
            })
        }
        None => {
            let star = cg.prog.capname("*");
            cg.emit(Inst::OpenCapture(star));
            cg.gen(exp, true)?;
            cg.emit(Inst::CloseCapture);
            cg.emit(Inst::End);
            Ok(Compiled {
                program: cg.prog,
                typename: "*".to_string(),
            })
        }
    }
}

fn qualify(pkg: Option<&str>, name: &str) -> String {
    match pkg {
        Some(p) => format!("{}.{}", p, name),
        None => name.to_string(),
    }
}

struct Codegen<'e> {
    env: &'e Environment,
    prog: Program,
    in_progress: Vec<String>,
}

impl<'e> Codegen<'e> {
    fn emit(&mut self, inst: Inst) -> usize {
        self.prog.insts.push(inst);
        self.prog.insts.len() - 1
    }

    fn here(&self) -> usize {
        self.prog.insts.len()
    }

    fn patch(&mut self, at: usize, target: usize) {
        let off = (target as i64 - at as i64) as i32;
        match &mut self.prog.insts[at] {
            Inst::Jump(o)
            | Inst::Choice(o)
            | Inst::Commit(o)
            | Inst::PartialCommit(o)
            | Inst::BackCommit(o) => *o = off,
            other => unreachable!("patching non-jump instruction {:?}", other),
        }
    }

    fn err(&self, message: String) -> CompileError {
        CompileError { message }
    }

    fn gen(&mut self, exp: &Exp, cooked: bool) -> Result<(), CompileError> {
        match exp {
            Exp::Literal(bytes) => {
                for &b in bytes {
                    self.emit(Inst::Char(b));
                }
            }
            Exp::Charset(cs) => {
                let cc = self.charclass(cs)?;
                self.emit(Inst::Set(cc));
            }
            Exp::Any => {
                self.emit(Inst::Any);
            }
            Exp::End => {
                self.emit(Inst::EndOfInput);
            }
            Exp::Halt => {
                self.emit(Inst::Halt);
            }
            Exp::Seq(items) => {
                for (i, item) in items.iter().enumerate() {
                    if cooked && i > 0 {
                        self.gen_boundary()?;
                    }
                    self.gen(item, cooked)?;
                }
            }
            Exp::Choice(a, b) => {
                let c = self.emit(Inst::Choice(0));
                self.gen(a, cooked)?;
                let cm = self.emit(Inst::Commit(0));
                let alt = self.here();
                self.patch(c, alt);
                self.gen(b, cooked)?;
                let end = self.here();
                self.patch(cm, end);
            }
            Exp::Not(p) => {
                let c = self.emit(Inst::Choice(0));
                self.gen(p, cooked)?;
                self.emit(Inst::FailTwice);
                let end = self.here();
                self.patch(c, end);
            }
            Exp::Ahead(p) => {
                let c = self.emit(Inst::Choice(0));
                self.gen(p, cooked)?;
                let bc = self.emit(Inst::BackCommit(0));
                let l1 = self.here();
                self.patch(c, l1);
                self.emit(Inst::Fail);
                let l2 = self.here();
                self.patch(bc, l2);
            }
            Exp::Cooked(inner) => self.gen(inner, true)?,
            Exp::Raw(inner) => self.gen(inner, false)?,
            Exp::Repeat { exp, min, max } => self.gen_repeat(exp, *min, *max)?,
            Exp::Ref { pkg, name } => self.gen_ref(pkg.as_deref(), name)?,
        }
        Ok(())
    }

    fn gen_boundary(&mut self) -> Result<(), CompileError> {
        let boundary = Exp::Ref {
            pkg: None,
            name: "~".to_string(),
        };
        self.gen(&boundary, false)
    }

    fn gen_ref(&mut self, pkg: Option<&str>, name: &str) -> Result<(), CompileError> {
        let qualified = qualify(pkg, name);
        let env = self.env;
        let binding = env
            .lookup(pkg, name)
            .ok_or_else(|| self.err(format!("unbound identifier: {}", qualified)))?;
        if self.in_progress.contains(&qualified) {
            return Err(self.err(format!("circular reference: {}", qualified)));
        }
        self.in_progress.push(qualified.clone());
        if binding.alias {
            self.gen(&binding.exp, true)?;
        } else {
            let idx = self.prog.capname(&qualified);
            self.emit(Inst::OpenCapture(idx));
            self.gen(&binding.exp, true)?;
            self.emit(Inst::CloseCapture);
        }
        self.in_progress.pop();
        Ok(())
    }

    fn gen_repeat(&mut self, body: &Exp, min: u32, max: Option<u32>) -> Result<(), CompileError> {
        // `(p)+` tokenizes its steps: p ~ p ~ p. Any other operand
        // repeats rawly.
        let (unit, tokenized): (&Exp, bool) = match body {
            Exp::Cooked(inner) => (inner, true),
            other => (other, false),
        };
        if max.is_none() && self.nullable(unit) {
            return Err(self.err(
                "pattern inside '*' or '+' may match the empty string".to_string(),
            ));
        }
        for i in 0..min {
            if tokenized && i > 0 {
                self.gen_boundary()?;
            }
            self.gen(unit, tokenized)?;
        }
        match max {
            None => {
                if min == 0 && tokenized {
                    // ( u (~ u)* )?
                    let c = self.emit(Inst::Choice(0));
                    self.gen(unit, tokenized)?;
                    self.gen_star(unit, tokenized, true)?;
                    let cm = self.emit(Inst::Commit(0));
                    let end = self.here();
                    self.patch(c, end);
                    self.patch(cm, end);
                } else {
                    self.gen_star(unit, tokenized, tokenized && min > 0)?;
                }
            }
            Some(m) => {
                let lead_boundary = tokenized && min > 0;
                self.gen_upto(unit, tokenized, m - min, lead_boundary)?;
            }
        }
        Ok(())
    }

    /// Zero-or-more of `unit`, optionally preceding each step with the
    /// boundary. Single character classes compile to SPAN.
    fn gen_star(
        &mut self,
        unit: &Exp,
        tokenized: bool,
        with_boundary: bool,
    ) -> Result<(), CompileError> {
        if !with_boundary {
            if let Exp::Charset(cs) = unit {
                let cc = self.charclass(cs)?;
                self.emit(Inst::Span(cc));
                return Ok(());
            }
        }
        let c = self.emit(Inst::Choice(0));
        let body = self.here();
        if with_boundary {
            self.gen_boundary()?;
        }
        self.gen(unit, tokenized)?;
        let pcm = self.emit(Inst::PartialCommit(0));
        self.patch(pcm, body);
        let end = self.here();
        self.patch(c, end);
        Ok(())
    }

    /// At most `k` more copies of `unit`, as nested optionals.
    fn gen_upto(
        &mut self,
        unit: &Exp,
        tokenized: bool,
        k: u32,
        lead_boundary: bool,
    ) -> Result<(), CompileError> {
        if k == 0 {
            return Ok(());
        }
        let c = self.emit(Inst::Choice(0));
        if lead_boundary {
            self.gen_boundary()?;
        }
        self.gen(unit, tokenized)?;
        self.gen_upto(unit, tokenized, k - 1, tokenized)?;
        let cm = self.emit(Inst::Commit(0));
        let end = self.here();
        self.patch(c, end);
        self.patch(cm, end);
        Ok(())
    }

    fn charclass(&self, cs: &Charset) -> Result<CharClass, CompileError> {
        charclass_of(cs)
    }

    /// Conservative nullability: can `exp` match the empty string?
    /// Unbound or cyclic references answer false; those cases produce
    /// their own compile errors.
    fn nullable(&self, exp: &Exp) -> bool {
        fn go(env: &Environment, exp: &Exp, seen: &mut Vec<String>) -> bool {
            match exp {
                Exp::Literal(bytes) => bytes.is_empty(),
                Exp::Charset(_) | Exp::Any => false,
                Exp::End | Exp::Halt | Exp::Not(_) | Exp::Ahead(_) => true,
                Exp::Seq(items) => items.iter().all(|i| go(env, i, seen)),
                Exp::Choice(a, b) => go(env, a, seen) || go(env, b, seen),
                Exp::Repeat { exp, min, .. } => *min == 0 || go(env, exp, seen),
                Exp::Cooked(e) | Exp::Raw(e) => go(env, e, seen),
                Exp::Ref { pkg, name } => {
                    let qualified = qualify(pkg.as_deref(), name);
                    if seen.contains(&qualified) {
                        return false;
                    }
                    match env.lookup(pkg.as_deref(), name) {
                        Some(b) => {
                            seen.push(qualified);
                            let r = go(env, &b.exp, seen);
                            seen.pop();
                            r
                        }
                        None => false,
                    }
                }
            }
        }
        let mut seen = Vec::new();
        go(self.env, exp, &mut seen)
    }
}

/// Build the byte class denoted by a charset AST. Shared by the
/// compiler and the trace evaluator.
pub fn charclass_of(cs: &Charset) -> Result<CharClass, CompileError> {
    match cs {
        Charset::Named { name, complement } => {
            let mut cc = named_class(name).ok_or_else(|| CompileError {
                message: format!("unknown named character class: {}", name),
            })?;
            if *complement {
                cc.invert();
            }
            Ok(cc)
        }
        Charset::Union { complement, items } => {
            let mut cc = CharClass::empty();
            for item in items {
                match item {
                    CsItem::Range(lo, hi) => cc.add_range(*lo, *hi),
                    CsItem::List(bytes) => {
                        for &b in bytes {
                            cc.add(b);
                        }
                    }
                    CsItem::Cs(nested) => {
                        let sub = charclass_of(nested)?;
                        cc.union(&sub);
                    }
                }
            }
            if *complement {
                cc.invert();
            }
            Ok(cc)
        }
    }
}

fn named_class(name: &str) -> Option<CharClass> {
    let mut cc = CharClass::empty();
    match name {
        "alpha" => {
            cc.add_range(b'a', b'z');
            cc.add_range(b'A', b'Z');
        }
        "digit" => cc.add_range(b'0', b'9'),
        "alnum" => {
            cc.add_range(b'a', b'z');
            cc.add_range(b'A', b'Z');
            cc.add_range(b'0', b'9');
        }
        "upper" => cc.add_range(b'A', b'Z'),
        "lower" => cc.add_range(b'a', b'z'),
        "space" => {
            for b in [b' ', b'\t', b'\n', b'\r', 0x0b, 0x0c] {
                cc.add(b);
            }
        }
        "blank" => {
            cc.add(b' ');
            cc.add(b'\t');
        }
        "punct" => {
            cc.add_range(b'!', b'/');
            cc.add_range(b':', b'@');
            cc.add_range(b'[', b'`');
            cc.add_range(b'{', b'~');
        }
        "graph" => cc.add_range(b'!', b'~'),
        "print" => cc.add_range(b' ', b'~'),
        "cntrl" => {
            cc.add_range(0x00, 0x1f);
            cc.add(0x7f);
        }
        "xdigit" => {
            cc.add_range(b'0', b'9');
            cc.add_range(b'a', b'f');
            cc.add_range(b'A', b'F');
        }
        _ => return None,
    }
    Some(cc)
}
