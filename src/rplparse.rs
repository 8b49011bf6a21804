// rplparse.rs - RPL parser.
//
// Recursive-descent parser for the RPL dialect this engine accepts:
// expressions (literals, character sets, sequence, ordered choice,
// repetition, predicates, raw/cooked groups, references) and statements
// (package, import, bindings). Produces the AST consumed by rplcomp and
// walked by trace.

use std::fmt;

/// Reserved words. None of these can be used as a binding name or
/// pattern reference.
pub const RESERVED: &[&str] = &["package", "import", "as", "local", "alias", "grammar", "end"];

// === AST ===

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exp {
    /// Quoted literal, raw bytes after escape processing.
    Literal(Vec<u8>),
    Charset(Charset),
    /// `.` - any single (UTF-8) character.
    Any,
    /// `$` - end of input.
    End,
    /// Identifier reference, optionally package-qualified.
    Ref { pkg: Option<String>, name: String },
    Seq(Vec<Exp>),
    Choice(Box<Exp>, Box<Exp>),
    Repeat {
        exp: Box<Exp>,
        min: u32,
        max: Option<u32>,
    },
    /// `!e` - negative lookahead.
    Not(Box<Exp>),
    /// `>e` - positive lookahead.
    Ahead(Box<Exp>),
    /// `(...)` - tokenized: boundary is inserted between sequence items
    /// and between repetition steps.
    Cooked(Box<Exp>),
    /// `{...}` - untokenized concatenation.
    Raw(Box<Exp>),
    /// Body of the built-in `halt` pattern; not directly parseable.
    Halt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Charset {
    /// `[:name:]` or `[:^name:]`.
    Named { name: String, complement: bool },
    /// `[...]` union, with optional leading `^` complement.
    Union { complement: bool, items: Vec<CsItem> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsItem {
    Range(u8, u8),
    /// `"abc"` - explicit character list.
    List(Vec<u8>),
    /// Nested `[:name:]` or `[...]`.
    Cs(Charset),
}

// === Statements ===

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Package { name: String },
    Import { specs: Vec<ImportSpec> },
    Bind {
        name: String,
        exp: Exp,
        alias: bool,
        local: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    pub path: String,
    pub as_name: Option<String>,
}

impl ImportSpec {
    /// Name the imported package binds to when no alias is given:
    /// the last path component.
    pub fn default_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

// === Errors ===

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub pos: usize,
    pub line: usize,
    pub col: usize,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "syntax error at line {}, column {}: {}",
            self.line, self.col, self.message
        )
    }
}

impl std::error::Error for ParseError {}

// === Entry points ===

/// Parse a complete expression; trailing input is an error.
pub fn parse_expression(src: &[u8]) -> Result<Exp, ParseError> {
    let mut p = Parser::new(src);
    p.skip_ws();
    let exp = p.parse_choice(false)?;
    p.skip_ws();
    if !p.at_end() {
        return Err(p.err("unexpected input after expression"));
    }
    Ok(exp)
}

/// Parse a sequence of RPL statements (a source unit).
pub fn parse_statements(src: &[u8]) -> Result<Vec<Stmt>, ParseError> {
    let mut p = Parser::new(src);
    let mut stmts = Vec::new();
    loop {
        p.skip_ws();
        if p.at_end() {
            break;
        }
        stmts.push(p.parse_statement()?);
    }
    Ok(stmts)
}

// === Parser ===

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a [u8]) -> Self {
        Parser { src, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, off: usize) -> Option<u8> {
        self.src.get(self.pos + off).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek();
        if b.is_some() {
            self.pos += 1;
        }
        b
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, b: u8, what: &str) -> Result<(), ParseError> {
        if self.eat(b) {
            Ok(())
        } else {
            Err(self.err(what))
        }
    }

    fn err(&self, message: &str) -> ParseError {
        let (mut line, mut col) = (1usize, 1usize);
        for &b in &self.src[..self.pos.min(self.src.len())] {
            if b == b'\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        ParseError {
            pos: self.pos,
            line,
            col,
            message: message.to_string(),
        }
    }

    /// Skip whitespace and `-- line comments`.
    fn skip_ws(&mut self) {
        loop {
            while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
                self.pos += 1;
            }
            if self.peek() == Some(b'-') && self.peek_at(1) == Some(b'-') {
                while !self.at_end() && self.peek() != Some(b'\n') {
                    self.pos += 1;
                }
                continue;
            }
            break;
        }
    }

    // --- identifiers and keywords ---

    fn at_ident_start(&self) -> bool {
        matches!(self.peek(), Some(b) if b.is_ascii_alphabetic() || b == b'_')
    }

    fn parse_ident(&mut self) -> Result<String, ParseError> {
        if !self.at_ident_start() {
            return Err(self.err("expected identifier"));
        }
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || b == b'_') {
            self.pos += 1;
        }
        Ok(String::from_utf8_lossy(&self.src[start..self.pos]).into_owned())
    }

    /// Consume `word` if it appears here as a whole word.
    fn eat_keyword(&mut self, word: &str) -> bool {
        let bytes = word.as_bytes();
        if self.src[self.pos..].starts_with(bytes) {
            let after = self.src.get(self.pos + bytes.len()).copied();
            let boundary = !matches!(after, Some(b) if b.is_ascii_alphanumeric() || b == b'_');
            if boundary {
                self.pos += bytes.len();
                return true;
            }
        }
        false
    }

    /// True when the next tokens are `ident =` (the start of a binding).
    fn at_binding(&self) -> bool {
        let mut probe = Parser {
            src: self.src,
            pos: self.pos,
        };
        for kw in ["local", "alias", "package", "import", "grammar"] {
            if probe.eat_keyword(kw) {
                return true;
            }
        }
        if probe.peek() == Some(b'~') {
            probe.pos += 1;
        } else if probe.parse_ident().is_err() {
            return false;
        }
        probe.skip_ws();
        probe.peek() == Some(b'=')
    }

    // --- statements ---

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        if self.eat_keyword("package") {
            self.skip_ws();
            let name = self.parse_ident()?;
            if RESERVED.contains(&name.as_str()) {
                return Err(self.err("reserved word cannot name a package"));
            }
            return Ok(Stmt::Package { name });
        }
        if self.eat_keyword("import") {
            return self.parse_import();
        }
        if self.eat_keyword("grammar") {
            return Err(self.err("grammar blocks are not supported"));
        }
        let mut local = false;
        let mut alias = false;
        if self.eat_keyword("local") {
            local = true;
            self.skip_ws();
        }
        if self.eat_keyword("alias") {
            alias = true;
            self.skip_ws();
        }
        let name = if self.eat(b'~') {
            "~".to_string()
        } else {
            let id = self.parse_ident()?;
            if RESERVED.contains(&id.as_str()) {
                return Err(self.err("reserved word cannot be bound"));
            }
            id
        };
        self.skip_ws();
        self.expect(b'=', "expected '=' in binding")?;
        self.skip_ws();
        let exp = self.parse_choice(true)?;
        Ok(Stmt::Bind {
            name,
            exp,
            alias,
            local,
        })
    }

    fn parse_import(&mut self) -> Result<Stmt, ParseError> {
        let mut specs = Vec::new();
        loop {
            self.skip_ws();
            let path = self.parse_import_path()?;
            self.skip_ws();
            let as_name = if self.eat_keyword("as") {
                self.skip_ws();
                if self.eat(b'.') {
                    Some(".".to_string())
                } else {
                    Some(self.parse_ident()?)
                }
            } else {
                None
            };
            specs.push(ImportSpec { path, as_name });
            self.skip_ws();
            if !self.eat(b',') {
                break;
            }
        }
        Ok(Stmt::Import { specs })
    }

    fn parse_import_path(&mut self) -> Result<String, ParseError> {
        let mut path = self.parse_ident()?;
        while self.eat(b'/') {
            path.push('/');
            path.push_str(&self.parse_ident()?);
        }
        Ok(path)
    }

    // --- expressions ---

    fn parse_choice(&mut self, stop_at_binding: bool) -> Result<Exp, ParseError> {
        let left = self.parse_seq(stop_at_binding)?;
        self.skip_ws();
        if self.eat(b'/') {
            self.skip_ws();
            let right = self.parse_choice(stop_at_binding)?;
            return Ok(Exp::Choice(Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn parse_seq(&mut self, stop_at_binding: bool) -> Result<Exp, ParseError> {
        let mut items = vec![self.parse_prefix(stop_at_binding)?];
        loop {
            self.skip_ws();
            if self.at_end() {
                break;
            }
            match self.peek() {
                Some(b'/' | b')' | b'}' | b',') => break,
                _ => {}
            }
            if stop_at_binding && self.at_binding() {
                break;
            }
            if !self.at_exp_start() {
                break;
            }
            items.push(self.parse_prefix(stop_at_binding)?);
        }
        if items.len() == 1 {
            Ok(items.pop().expect("nonempty"))
        } else {
            Ok(Exp::Seq(items))
        }
    }

    fn at_exp_start(&self) -> bool {
        match self.peek() {
            Some(b'"' | b'[' | b'(' | b'{' | b'.' | b'$' | b'~' | b'!' | b'>') => true,
            Some(b) if b.is_ascii_alphabetic() || b == b'_' => true,
            _ => false,
        }
    }

    fn parse_prefix(&mut self, stop_at_binding: bool) -> Result<Exp, ParseError> {
        if self.eat(b'!') {
            self.skip_ws();
            let inner = self.parse_prefix(stop_at_binding)?;
            return Ok(Exp::Not(Box::new(inner)));
        }
        if self.eat(b'>') {
            self.skip_ws();
            let inner = self.parse_prefix(stop_at_binding)?;
            return Ok(Exp::Ahead(Box::new(inner)));
        }
        self.parse_postfix(stop_at_binding)
    }

    fn parse_postfix(&mut self, stop_at_binding: bool) -> Result<Exp, ParseError> {
        let mut exp = self.parse_primary(stop_at_binding)?;
        loop {
            match self.peek() {
                Some(b'*') => {
                    self.pos += 1;
                    exp = Exp::Repeat {
                        exp: Box::new(exp),
                        min: 0,
                        max: None,
                    };
                }
                Some(b'+') => {
                    self.pos += 1;
                    exp = Exp::Repeat {
                        exp: Box::new(exp),
                        min: 1,
                        max: None,
                    };
                }
                Some(b'?') => {
                    self.pos += 1;
                    exp = Exp::Repeat {
                        exp: Box::new(exp),
                        min: 0,
                        max: Some(1),
                    };
                }
                Some(b'{') if self.at_repeat_braces() => {
                    exp = self.parse_repeat_range(exp)?;
                }
                _ => break,
            }
        }
        Ok(exp)
    }

    /// After a primary, `{` opens a repetition range only when its first
    /// non-space character is a digit or comma; otherwise it starts a new
    /// raw group in the sequence.
    fn at_repeat_braces(&self) -> bool {
        debug_assert_eq!(self.peek(), Some(b'{'));
        let mut off = 1;
        while matches!(self.peek_at(off), Some(b' ' | b'\t')) {
            off += 1;
        }
        matches!(self.peek_at(off), Some(b) if b.is_ascii_digit() || b == b',')
    }

    fn parse_repeat_range(&mut self, exp: Exp) -> Result<Exp, ParseError> {
        self.expect(b'{', "expected '{'")?;
        self.skip_ws();
        let min = self.parse_number_opt();
        self.skip_ws();
        let (min, max) = if self.eat(b',') {
            self.skip_ws();
            let max = self.parse_number_opt();
            (min.unwrap_or(0), max)
        } else {
            match min {
                Some(n) => (n, Some(n)),
                None => return Err(self.err("expected number in repetition range")),
            }
        };
        self.skip_ws();
        self.expect(b'}', "expected '}' after repetition range")?;
        if let Some(m) = max {
            if m < min {
                return Err(self.err("upper bound is smaller than lower bound in repetition"));
            }
        }
        Ok(Exp::Repeat {
            exp: Box::new(exp),
            min,
            max,
        })
    }

    fn parse_number_opt(&mut self) -> Option<u32> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return None;
        }
        std::str::from_utf8(&self.src[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
    }

    fn parse_primary(&mut self, stop_at_binding: bool) -> Result<Exp, ParseError> {
        match self.peek() {
            Some(b'"') => {
                let bytes = self.parse_quoted()?;
                Ok(Exp::Literal(bytes))
            }
            Some(b'[') => Ok(Exp::Charset(self.parse_charset()?)),
            Some(b'(') => {
                self.pos += 1;
                self.skip_ws();
                let inner = self.parse_choice(stop_at_binding)?;
                self.skip_ws();
                self.expect(b')', "expected ')'")?;
                Ok(Exp::Cooked(Box::new(inner)))
            }
            Some(b'{') => {
                self.pos += 1;
                self.skip_ws();
                let inner = self.parse_choice(stop_at_binding)?;
                self.skip_ws();
                self.expect(b'}', "expected '}'")?;
                Ok(Exp::Raw(Box::new(inner)))
            }
            Some(b'.') => {
                self.pos += 1;
                Ok(Exp::Any)
            }
            Some(b'$') => {
                self.pos += 1;
                Ok(Exp::End)
            }
            Some(b'~') => {
                self.pos += 1;
                Ok(Exp::Ref {
                    pkg: None,
                    name: "~".to_string(),
                })
            }
            Some(b) if b.is_ascii_alphabetic() || b == b'_' => {
                let first = self.parse_ident()?;
                if RESERVED.contains(&first.as_str()) {
                    return Err(self.err("reserved word used as pattern reference"));
                }
                if self.eat(b'.') {
                    let name = self.parse_ident()?;
                    Ok(Exp::Ref {
                        pkg: Some(first),
                        name,
                    })
                } else {
                    Ok(Exp::Ref {
                        pkg: None,
                        name: first,
                    })
                }
            }
            _ => Err(self.err("expected expression")),
        }
    }

    /// Parse a quoted string with escape processing; used for literals
    /// and for character lists inside brackets.
    fn parse_quoted(&mut self) -> Result<Vec<u8>, ParseError> {
        self.expect(b'"', "expected '\"'")?;
        let mut out = Vec::new();
        loop {
            match self.bump() {
                None => return Err(self.err("unterminated string literal")),
                Some(b'"') => break,
                Some(b'\\') => match self.bump() {
                    Some(b'\\') => out.push(b'\\'),
                    Some(b'"') => out.push(b'"'),
                    Some(b'n') => out.push(b'\n'),
                    Some(b'r') => out.push(b'\r'),
                    Some(b't') => out.push(b'\t'),
                    _ => return Err(self.err("invalid escape sequence in string")),
                },
                Some(b) => out.push(b),
            }
        }
        Ok(out)
    }

    // --- character sets ---

    fn parse_charset(&mut self) -> Result<Charset, ParseError> {
        self.expect(b'[', "expected '['")?;
        if self.peek() == Some(b':') {
            return self.parse_named_class();
        }
        let complement = self.eat(b'^');
        let mut items = Vec::new();
        loop {
            match self.peek() {
                None => return Err(self.err("premature end of character set")),
                Some(b']') => {
                    self.pos += 1;
                    break;
                }
                Some(b'[') => {
                    let nested = self.parse_charset()?;
                    items.push(CsItem::Cs(nested));
                }
                Some(b'"') => {
                    let list = self.parse_quoted()?;
                    items.push(CsItem::List(list));
                }
                Some(_) => {
                    let lo = self.parse_set_char()?;
                    if self.peek() == Some(b'-') && self.peek_at(1) != Some(b']') {
                        self.pos += 1;
                        let hi = self.parse_set_char()?;
                        if hi < lo {
                            return Err(self.err("empty range in character set"));
                        }
                        items.push(CsItem::Range(lo, hi));
                    } else {
                        // Bare characters are not a list in this dialect;
                        // `[aa]` is the canonical rejected form.
                        return Err(self.err(
                            "invalid character set (expected range, [:class:], quoted list, or nested set)",
                        ));
                    }
                }
            }
        }
        if items.is_empty() {
            return Err(self.err("empty character set"));
        }
        Ok(Charset::Union { complement, items })
    }

    fn parse_named_class(&mut self) -> Result<Charset, ParseError> {
        self.expect(b':', "expected ':'")?;
        let complement = self.eat(b'^');
        let name = self.parse_ident()?;
        self.expect(b':', "expected ':' closing named character class")?;
        self.expect(b']', "expected ']' closing named character class")?;
        Ok(Charset::Named { name, complement })
    }

    fn parse_set_char(&mut self) -> Result<u8, ParseError> {
        match self.bump() {
            None => Err(self.err("premature end of character set")),
            Some(b'\\') => match self.bump() {
                Some(b'\\') => Ok(b'\\'),
                Some(b']') => Ok(b']'),
                Some(b'-') => Ok(b'-'),
                Some(b'^') => Ok(b'^'),
                Some(b'n') => Ok(b'\n'),
                Some(b'r') => Ok(b'\r'),
                Some(b't') => Ok(b'\t'),
                _ => Err(self.err("invalid escape in character set")),
            },
            Some(b) => Ok(b),
        }
    }
}

// === Rendering (used by trace output and diagnostics) ===

impl fmt::Display for Exp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exp::Literal(bytes) => {
                write!(f, "\"")?;
                for &b in bytes {
                    match b {
                        b'"' => write!(f, "\\\"")?,
                        b'\\' => write!(f, "\\\\")?,
                        b'\n' => write!(f, "\\n")?,
                        b'\r' => write!(f, "\\r")?,
                        b'\t' => write!(f, "\\t")?,
                        b if b.is_ascii_graphic() || b == b' ' => write!(f, "{}", b as char)?,
                        b => write!(f, "\\{:03o}", b)?,
                    }
                }
                write!(f, "\"")
            }
            Exp::Charset(cs) => write!(f, "{}", cs),
            Exp::Any => write!(f, "."),
            Exp::End => write!(f, "$"),
            Exp::Ref { pkg: Some(p), name } => write!(f, "{}.{}", p, name),
            Exp::Ref { pkg: None, name } => write!(f, "{}", name),
            Exp::Seq(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            Exp::Choice(a, b) => write!(f, "{} / {}", a, b),
            Exp::Repeat { exp, min, max } => {
                let needs_group = matches!(**exp, Exp::Seq(_) | Exp::Choice(..));
                if needs_group {
                    write!(f, "{{{}}}", exp)?;
                } else {
                    write!(f, "{}", exp)?;
                }
                match (*min, *max) {
                    (0, None) => write!(f, "*"),
                    (1, None) => write!(f, "+"),
                    (0, Some(1)) => write!(f, "?"),
                    (n, None) => write!(f, "{{{},}}", n),
                    (n, Some(m)) if n == m => write!(f, "{{{}}}", n),
                    (n, Some(m)) => write!(f, "{{{},{}}}", n, m),
                }
            }
            Exp::Not(inner) => write!(f, "!{}", inner),
            Exp::Ahead(inner) => write!(f, ">{}", inner),
            Exp::Cooked(inner) => write!(f, "({})", inner),
            Exp::Raw(inner) => write!(f, "{{{}}}", inner),
            Exp::Halt => write!(f, "halt"),
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Charset::Named { name, complement } => {
                write!(f, "[:{}{}:]", if *complement { "^" } else { "" }, name)
            }
            Charset::Union { complement, items } => {
                write!(f, "[{}", if *complement { "^" } else { "" })?;
                for item in items {
                    match item {
                        CsItem::Range(lo, hi) => write!(f, "{}-{}", *lo as char, *hi as char)?,
                        CsItem::List(bytes) => {
                            write!(f, "\"{}\"", String::from_utf8_lossy(bytes))?
                        }
                        CsItem::Cs(cs) => write!(f, "{}", cs)?,
                    }
                }
                write!(f, "]")
            }
        }
    }
}
