// encoders.rs - Match output encoders.
//
// A successful match is rendered into bytes by a named encoder chosen
// per call. Positions in the json encoding are 1-based, matching the
// wire format the original library produced.

use memchr::{memchr, memrchr};
use serde_json::{json, Value};

use crate::rpeg::CapNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoder {
    /// Structured node tree: type / s / e / data / subs.
    Json,
    /// The full line (or lines) containing the matched region.
    Line,
    /// Just the fact of the match.
    Bool,
    /// The raw matched bytes.
    Data,
}

impl Encoder {
    pub fn from_name(name: &str) -> Option<Encoder> {
        match name {
            "json" => Some(Encoder::Json),
            "line" => Some(Encoder::Line),
            "bool" => Some(Encoder::Bool),
            "data" => Some(Encoder::Data),
            _ => None,
        }
    }

    /// Render the capture tree of a successful match.
    pub fn encode(self, input: &[u8], node: &CapNode) -> Vec<u8> {
        match self {
            Encoder::Json => {
                serde_json::to_vec(&node_value(input, node)).expect("capture tree serializes")
            }
            Encoder::Line => {
                let ls = memrchr(b'\n', &input[..node.s]).map_or(0, |i| i + 1);
                let le = memchr(b'\n', &input[node.e..]).map_or(input.len(), |i| node.e + i);
                input[ls..le].to_vec()
            }
            Encoder::Bool => b"true".to_vec(),
            Encoder::Data => input[node.s..node.e].to_vec(),
        }
    }
}

fn node_value(input: &[u8], node: &CapNode) -> Value {
    let data = String::from_utf8_lossy(&input[node.s..node.e]);
    let mut v = json!({
        "type": node.name,
        "s": node.s + 1,
        "e": node.e + 1,
        "data": data,
    });
    if !node.subs.is_empty() {
        let subs: Vec<Value> = node.subs.iter().map(|n| node_value(input, n)).collect();
        v["subs"] = Value::Array(subs);
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, s: usize, e: usize, subs: Vec<CapNode>) -> CapNode {
        CapNode {
            name: name.to_string(),
            s,
            e,
            subs,
        }
    }

    #[test]
    fn from_name_known_and_unknown() {
        assert_eq!(Encoder::from_name("json"), Some(Encoder::Json));
        assert_eq!(Encoder::from_name("line"), Some(Encoder::Line));
        assert_eq!(Encoder::from_name("bool"), Some(Encoder::Bool));
        assert_eq!(Encoder::from_name("data"), Some(Encoder::Data));
        assert_eq!(Encoder::from_name("no_such_encoder"), None);
    }

    #[test]
    fn json_positions_are_one_based() {
        let input = b"x21y";
        let out = Encoder::Json.encode(input, &node("*", 1, 3, vec![]));
        let v: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(v["type"], "*");
        assert_eq!(v["s"], 2);
        assert_eq!(v["e"], 4);
        assert_eq!(v["data"], "21");
        assert!(v.get("subs").is_none());
    }

    #[test]
    fn json_nests_subs() {
        let input = b"v42";
        let out = Encoder::Json.encode(
            input,
            &node("*", 0, 3, vec![node("d", 1, 3, vec![])]),
        );
        let v: Value = serde_json::from_slice(&out).unwrap();
        let subs = v["subs"].as_array().unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0]["type"], "d");
        assert_eq!(subs[0]["data"], "42");
    }

    #[test]
    fn line_extracts_enclosing_line() {
        let input = b"first\nabc 123\nlast";
        let out = Encoder::Line.encode(input, &node("*", 10, 13, vec![]));
        assert_eq!(out, b"abc 123");
    }

    #[test]
    fn line_without_newlines_is_whole_input() {
        let input = b"abc 123";
        let out = Encoder::Line.encode(input, &node("*", 4, 7, vec![]));
        assert_eq!(out, b"abc 123");
    }

    #[test]
    fn data_is_matched_bytes() {
        let out = Encoder::Data.encode(b"v42x", &node("*", 1, 3, vec![]));
        assert_eq!(out, b"42");
    }

    #[test]
    fn bool_is_true() {
        assert_eq!(Encoder::Bool.encode(b"x", &node("*", 0, 1, vec![])), b"true");
    }
}
