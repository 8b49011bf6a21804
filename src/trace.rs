// trace.rs - Trace evaluator and renderers.
//
// Tracing walks the pattern's AST directly, recording one node per
// attempted subexpression. This is deliberately a separate evaluator
// from the rpeg VM (as in the original engine, where trace lived
// outside the matching VM); it must agree with the VM on semantics,
// which the trace tests cross-check.

use serde_json::{json, Value};

use crate::rpeg::utf8_len;
use crate::rplcomp::{charclass_of, Environment};
use crate::rplparse::Exp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceStyle {
    Condensed,
    Full,
    Json,
}

impl TraceStyle {
    pub fn from_name(name: &str) -> Option<TraceStyle> {
        match name {
            "condensed" => Some(TraceStyle::Condensed),
            "full" => Some(TraceStyle::Full),
            "json" => Some(TraceStyle::Json),
            _ => None,
        }
    }
}

/// One attempted subexpression. Positions are 0-based here; renderers
/// shift to the 1-based external convention.
#[derive(Debug, Clone)]
pub struct TraceNode {
    pub exp: String,
    pub pos: usize,
    pub matched: bool,
    pub end: usize,
    pub subs: Vec<TraceNode>,
}

/// Trace a match attempt of `exp` against `input` anchored at `start`
/// (0-based). Returns the overall outcome and the rendered trace.
pub fn trace(
    exp: &Exp,
    env: &Environment,
    input: &[u8],
    start: usize,
    style: TraceStyle,
) -> (bool, Vec<u8>) {
    let mut tracer = Tracer {
        env,
        input,
        halted: false,
        depth: 0,
    };
    let (node, end) = tracer.eval(exp, start, true);
    let matched = end.is_some() && !tracer.halted;
    let rendered = match style {
        TraceStyle::Condensed => {
            let mut out = String::new();
            render_condensed(&node, 0, &mut out);
            out.into_bytes()
        }
        TraceStyle::Full => {
            let mut out = String::new();
            render_full(&node, input, &mut out);
            out.into_bytes()
        }
        TraceStyle::Json => {
            serde_json::to_vec(&node_value(&node)).expect("trace tree serializes")
        }
    };
    (matched, rendered)
}

const MAX_TRACE_DEPTH: usize = 500;

struct Tracer<'e> {
    env: &'e Environment,
    input: &'e [u8],
    halted: bool,
    depth: usize,
}

impl<'e> Tracer<'e> {
    /// Evaluate `exp` at `pos`; returns the trace node and the end
    /// position on success. Must mirror the VM's semantics.
    fn eval(&mut self, exp: &Exp, pos: usize, cooked: bool) -> (TraceNode, Option<usize>) {
        self.depth += 1;
        let (subs, end) = if self.depth > MAX_TRACE_DEPTH {
            (Vec::new(), None)
        } else {
            self.eval_inner(exp, pos, cooked)
        };
        self.depth -= 1;
        let node = TraceNode {
            exp: exp.to_string(),
            pos,
            matched: end.is_some(),
            end: end.unwrap_or(pos),
            subs,
        };
        (node, end)
    }

    fn eval_inner(
        &mut self,
        exp: &Exp,
        pos: usize,
        cooked: bool,
    ) -> (Vec<TraceNode>, Option<usize>) {
        let input = self.input;
        let len = input.len();
        match exp {
            Exp::Literal(bytes) => {
                let end = pos + bytes.len();
                if end <= len && &input[pos..end] == bytes.as_slice() {
                    (Vec::new(), Some(end))
                } else {
                    (Vec::new(), None)
                }
            }
            Exp::Charset(cs) => match charclass_of(cs) {
                Ok(cc) if pos < len && cc.test(input[pos]) => (Vec::new(), Some(pos + 1)),
                _ => (Vec::new(), None),
            },
            Exp::Any => {
                if pos < len {
                    (Vec::new(), Some(pos + utf8_len(input, pos)))
                } else {
                    (Vec::new(), None)
                }
            }
            Exp::End => (Vec::new(), if pos == len { Some(pos) } else { None }),
            Exp::Halt => {
                self.halted = true;
                (Vec::new(), Some(pos))
            }
            Exp::Seq(items) => {
                let mut subs = Vec::new();
                let mut at = pos;
                for (i, item) in items.iter().enumerate() {
                    if cooked && i > 0 {
                        match self.eval_boundary(at, &mut subs) {
                            Some(next) => at = next,
                            None => return (subs, None),
                        }
                    }
                    let (node, end) = self.eval(item, at, cooked);
                    subs.push(node);
                    match end {
                        Some(next) if !self.halted => at = next,
                        _ => return (subs, None),
                    }
                }
                (subs, Some(at))
            }
            Exp::Choice(a, b) => {
                let (node_a, end_a) = self.eval(a, pos, cooked);
                let mut subs = vec![node_a];
                if self.halted {
                    return (subs, None);
                }
                if end_a.is_some() {
                    return (subs, end_a);
                }
                let (node_b, end_b) = self.eval(b, pos, cooked);
                subs.push(node_b);
                if self.halted {
                    return (subs, None);
                }
                (subs, end_b)
            }
            Exp::Not(p) => {
                let (node, end) = self.eval(p, pos, cooked);
                let subs = vec![node];
                if self.halted {
                    return (subs, None);
                }
                (subs, if end.is_some() { None } else { Some(pos) })
            }
            Exp::Ahead(p) => {
                let (node, end) = self.eval(p, pos, cooked);
                let subs = vec![node];
                if self.halted {
                    return (subs, None);
                }
                (subs, end.map(|_| pos))
            }
            Exp::Cooked(inner) => {
                let (node, end) = self.eval(inner, pos, true);
                (vec![node], end)
            }
            Exp::Raw(inner) => {
                let (node, end) = self.eval(inner, pos, false);
                (vec![node], end)
            }
            Exp::Repeat { exp, min, max } => self.eval_repeat(exp, *min, *max, pos),
            Exp::Ref { pkg, name } => {
                let binding = match self.env.lookup(pkg.as_deref(), name) {
                    Some(b) => b,
                    None => return (Vec::new(), None),
                };
                let (node, end) = self.eval(&binding.exp, pos, true);
                let subs = vec![node];
                if self.halted {
                    return (subs, None);
                }
                (subs, end)
            }
        }
    }

    fn eval_boundary(&mut self, pos: usize, subs: &mut Vec<TraceNode>) -> Option<usize> {
        let boundary = Exp::Ref {
            pkg: None,
            name: "~".to_string(),
        };
        let (node, end) = self.eval(&boundary, pos, false);
        subs.push(node);
        if self.halted {
            return None;
        }
        end
    }

    fn eval_repeat(
        &mut self,
        body: &Exp,
        min: u32,
        max: Option<u32>,
        pos: usize,
    ) -> (Vec<TraceNode>, Option<usize>) {
        // Same desugaring as the compiler: a cooked group operand
        // tokenizes the steps.
        let (unit, tokenized): (&Exp, bool) = match body {
            Exp::Cooked(inner) => (inner, true),
            other => (other, false),
        };
        let mut subs = Vec::new();
        let mut at = pos;
        let mut count: u32 = 0;
        loop {
            if let Some(m) = max {
                if count >= m {
                    break;
                }
            }
            // Attempt one more step, backing out to the last good
            // position if it fails.
            let step_start = at;
            let subs_mark = subs.len();
            let mut step_pos = at;
            if tokenized && count > 0 {
                match self.eval_boundary(step_pos, &mut subs) {
                    Some(next) => step_pos = next,
                    None => {
                        if self.halted {
                            return (subs, None);
                        }
                        subs.truncate(subs_mark);
                        at = step_start;
                        break;
                    }
                }
            }
            let (node, end) = self.eval(unit, step_pos, tokenized);
            subs.push(node);
            if self.halted {
                return (subs, None);
            }
            match end {
                Some(next) => {
                    at = next;
                    count += 1;
                    // A zero-width step would loop forever.
                    if next == step_start && max.is_none() {
                        break;
                    }
                }
                None => {
                    subs.truncate(subs_mark);
                    at = step_start;
                    break;
                }
            }
        }
        if count < min {
            (subs, None)
        } else {
            (subs, Some(at))
        }
    }
}

// === Renderers ===

fn render_condensed(node: &TraceNode, indent: usize, out: &mut String) {
    for _ in 0..indent {
        out.push_str("  ");
    }
    if node.matched {
        out.push_str(&format!(
            "{} @{} => [{}..{}]\n",
            node.exp,
            node.pos + 1,
            node.pos + 1,
            node.end + 1
        ));
    } else {
        out.push_str(&format!("{} @{} => FAIL\n", node.exp, node.pos + 1));
    }
    for sub in &node.subs {
        render_condensed(sub, indent + 1, out);
    }
}

fn render_full(node: &TraceNode, input: &[u8], out: &mut String) {
    out.push_str(&format!("Expression: {}\n", node.exp));
    let window = &input[node.pos..input.len().min(node.pos + 24)];
    out.push_str(&format!(
        "Looking at: |{}| (input pos = {})\n",
        String::from_utf8_lossy(window),
        node.pos + 1
    ));
    if node.matched {
        out.push_str(&format!("Matched {} chars\n", node.end - node.pos));
    } else {
        out.push_str("No match\n");
    }
    for sub in &node.subs {
        render_full(sub, input, out);
    }
    out.push('\n');
}

fn node_value(node: &TraceNode) -> Value {
    let mut v = json!({
        "exp": node.exp,
        "pos": node.pos + 1,
        "matched": node.matched,
        "end": node.end + 1,
    });
    if !node.subs.is_empty() {
        let subs: Vec<Value> = node.subs.iter().map(node_value).collect();
        v["subs"] = Value::Array(subs);
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rplparse::parse_expression;

    fn run(src: &str, input: &[u8], style: TraceStyle) -> (bool, String) {
        let env = Environment::new();
        let exp = parse_expression(src.as_bytes()).unwrap();
        let (matched, out) = trace(&exp, &env, input, 0, style);
        (matched, String::from_utf8(out).unwrap())
    }

    #[test]
    fn style_names() {
        assert_eq!(TraceStyle::from_name("condensed"), Some(TraceStyle::Condensed));
        assert_eq!(TraceStyle::from_name("full"), Some(TraceStyle::Full));
        assert_eq!(TraceStyle::from_name("json"), Some(TraceStyle::Json));
        assert_eq!(TraceStyle::from_name("fancy"), None);
    }

    #[test]
    fn condensed_reports_match() {
        let (matched, out) = run("[:digit:]+", b"12345", TraceStyle::Condensed);
        assert!(matched);
        assert!(out.contains("[:digit:]+ @1 => [1..6]"));
    }

    #[test]
    fn condensed_reports_failure() {
        let (matched, out) = run("[:digit:]+", b"abc", TraceStyle::Condensed);
        assert!(!matched);
        assert!(out.contains("FAIL"));
    }

    #[test]
    fn full_style_mentions_input_window() {
        let (matched, out) = run("\"abc\"", b"abcdef", TraceStyle::Full);
        assert!(matched);
        assert!(out.contains("Expression: \"abc\""));
        assert!(out.contains("|abcdef|"));
        assert!(out.contains("Matched 3 chars"));
    }

    #[test]
    fn json_style_is_structured() {
        let (matched, out) = run("\"a\" / \"b\"", b"b", TraceStyle::Json);
        assert!(matched);
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["matched"], true);
        let subs = v["subs"].as_array().unwrap();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0]["matched"], false);
        assert_eq!(subs[1]["matched"], true);
    }

    #[test]
    fn choice_stops_after_first_success() {
        let (matched, out) = run("\"a\" / \"b\"", b"a", TraceStyle::Json);
        assert!(matched);
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["subs"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn agrees_with_vm_on_tokenized_sequence() {
        use crate::rpeg::exec;
        use crate::rplcomp::compile_expression;

        let env = Environment::new();
        for (src, input) in [
            ("(\"a\" \"b\")", b"a b".as_slice()),
            ("(\"a\" \"b\")", b"ab".as_slice()),
            ("{\"a\" \"b\"}", b"ab".as_slice()),
            ("[:alpha:]{2,3}", b"abcd".as_slice()),
            ("{!\"a\" .}", b"z".as_slice()),
        ] {
            let exp = parse_expression(src.as_bytes()).unwrap();
            let compiled = compile_expression(&exp, &env).unwrap();
            let vm = exec(&compiled.program, input, 0).unwrap();
            let (matched, _) = trace(&exp, &env, input, 0, TraceStyle::Condensed);
            assert_eq!(matched, vm.matched, "trace/VM disagree on {} vs {:?}", src, input);
        }
    }

    #[test]
    fn halt_aborts_trace() {
        let (matched, out) = run("{\"a\" halt \"b\"}", b"ab", TraceStyle::Condensed);
        assert!(!matched);
        assert!(!out.is_empty());
    }
}
