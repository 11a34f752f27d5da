//! Micheline expressions: the structured parameter/storage representation
//!
//! One type serves both directions: the JSON form used by node RPCs
//! (`{"prim": "Pair", "args": [...]}`) and the canonical binary form that
//! gets forged into operation bytes. Contract-call parameters are built
//! from this type rather than an untyped JSON blob, so malformed shapes
//! fail before forging.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::{zarith, ForgeError};

/// Michelson primitive names in protocol alphabet order
///
/// The byte emitted for a primitive is its index in this table.
const PRIMITIVES: &[&str] = &[
    "parameter",
    "storage",
    "code",
    "False",
    "Elt",
    "Left",
    "None",
    "Pair",
    "Right",
    "Some",
    "True",
    "Unit",
    "PACK",
    "UNPACK",
    "BLAKE2B",
    "SHA256",
    "SHA512",
    "ABS",
    "ADD",
    "AMOUNT",
    "AND",
    "BALANCE",
    "CAR",
    "CDR",
    "CHECK_SIGNATURE",
    "COMPARE",
    "CONCAT",
    "CONS",
    "CREATE_ACCOUNT",
    "CREATE_CONTRACT",
    "IMPLICIT_ACCOUNT",
    "DIP",
    "DROP",
    "DUP",
    "EDIV",
    "EMPTY_MAP",
    "EMPTY_SET",
    "EQ",
    "EXEC",
    "FAILWITH",
    "GE",
    "GET",
    "GT",
    "HASH_KEY",
    "IF",
    "IF_CONS",
    "IF_LEFT",
    "IF_NONE",
    "INT",
    "LAMBDA",
    "LE",
    "LEFT",
    "LOOP",
    "LSL",
    "LSR",
    "LT",
    "MAP",
    "MEM",
    "MUL",
    "NEG",
    "NEQ",
    "NIL",
    "NONE",
    "NOT",
    "NOW",
    "OR",
    "PAIR",
    "PUSH",
    "RIGHT",
    "SIZE",
    "SOME",
    "SOURCE",
    "SENDER",
    "SELF",
    "STEPS_TO_QUOTA",
    "SUB",
    "SWAP",
    "TRANSFER_TOKENS",
    "SET_DELEGATE",
    "UNIT",
    "UPDATE",
    "XOR",
    "ITER",
    "LOOP_LEFT",
    "ADDRESS",
    "CONTRACT",
    "ISNAT",
    "CAST",
    "RENAME",
    "bool",
    "contract",
    "int",
    "key",
    "key_hash",
    "lambda",
    "list",
    "map",
    "big_map",
    "nat",
    "option",
    "or",
    "pair",
    "set",
    "signature",
    "string",
    "bytes",
    "mutez",
    "timestamp",
    "unit",
    "operation",
    "address",
    "SLICE",
    "DIG",
    "DUG",
    "EMPTY_BIG_MAP",
    "APPLY",
    "chain_id",
    "CHAIN_ID",
];

fn primitive_code(name: &str) -> Option<u8> {
    PRIMITIVES.iter().position(|p| *p == name).map(|i| i as u8)
}

/// A Micheline expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Micheline {
    Int(i64),
    String(String),
    Bytes(Vec<u8>),
    Prim {
        prim: String,
        args: Vec<Micheline>,
        annots: Vec<String>,
    },
    Seq(Vec<Micheline>),
}

impl Micheline {
    /// The `Unit` value, the default parameter of entry points
    pub fn unit() -> Self {
        Micheline::prim("Unit")
    }

    /// A primitive with no arguments or annotations
    pub fn prim(name: impl Into<String>) -> Self {
        Micheline::Prim {
            prim: name.into(),
            args: Vec::new(),
            annots: Vec::new(),
        }
    }

    /// A primitive application
    pub fn app(name: impl Into<String>, args: Vec<Micheline>) -> Self {
        Micheline::Prim {
            prim: name.into(),
            args,
            annots: Vec::new(),
        }
    }

    /// Convert to the JSON form used by node RPCs
    pub fn to_json(&self) -> Value {
        match self {
            Micheline::Int(i) => serde_json::json!({ "int": i.to_string() }),
            Micheline::String(s) => serde_json::json!({ "string": s }),
            Micheline::Bytes(b) => serde_json::json!({ "bytes": hex::encode(b) }),
            Micheline::Prim { prim, args, annots } => {
                let mut obj = serde_json::Map::new();
                obj.insert("prim".to_string(), Value::String(prim.clone()));
                if !args.is_empty() {
                    obj.insert(
                        "args".to_string(),
                        Value::Array(args.iter().map(Micheline::to_json).collect()),
                    );
                }
                if !annots.is_empty() {
                    obj.insert(
                        "annots".to_string(),
                        Value::Array(annots.iter().cloned().map(Value::String).collect()),
                    );
                }
                Value::Object(obj)
            }
            Micheline::Seq(items) => Value::Array(items.iter().map(Micheline::to_json).collect()),
        }
    }

    /// Parse the JSON form used by node RPCs
    pub fn from_json(value: &Value) -> Result<Self, ForgeError> {
        match value {
            Value::Array(items) => Ok(Micheline::Seq(
                items
                    .iter()
                    .map(Micheline::from_json)
                    .collect::<Result<_, _>>()?,
            )),
            Value::Object(obj) => {
                if let Some(int) = obj.get("int") {
                    let raw = int
                        .as_str()
                        .ok_or_else(|| ForgeError::Micheline("int must be a string".to_string()))?;
                    let parsed = raw
                        .parse::<i64>()
                        .map_err(|e| ForgeError::Micheline(format!("bad int literal: {e}")))?;
                    return Ok(Micheline::Int(parsed));
                }
                if let Some(s) = obj.get("string") {
                    let raw = s.as_str().ok_or_else(|| {
                        ForgeError::Micheline("string must be a string".to_string())
                    })?;
                    return Ok(Micheline::String(raw.to_string()));
                }
                if let Some(b) = obj.get("bytes") {
                    let raw = b.as_str().ok_or_else(|| {
                        ForgeError::Micheline("bytes must be a hex string".to_string())
                    })?;
                    let decoded = hex::decode(raw)
                        .map_err(|e| ForgeError::Micheline(format!("bad bytes literal: {e}")))?;
                    return Ok(Micheline::Bytes(decoded));
                }
                if let Some(prim) = obj.get("prim") {
                    let name = prim.as_str().ok_or_else(|| {
                        ForgeError::Micheline("prim must be a string".to_string())
                    })?;
                    let args = match obj.get("args") {
                        Some(Value::Array(items)) => items
                            .iter()
                            .map(Micheline::from_json)
                            .collect::<Result<_, _>>()?,
                        Some(_) => {
                            return Err(ForgeError::Micheline("args must be an array".to_string()))
                        }
                        None => Vec::new(),
                    };
                    let annots = match obj.get("annots") {
                        Some(Value::Array(items)) => items
                            .iter()
                            .map(|a| {
                                a.as_str().map(str::to_string).ok_or_else(|| {
                                    ForgeError::Micheline("annots must be strings".to_string())
                                })
                            })
                            .collect::<Result<_, _>>()?,
                        Some(_) => {
                            return Err(ForgeError::Micheline(
                                "annots must be an array".to_string(),
                            ))
                        }
                        None => Vec::new(),
                    };
                    return Ok(Micheline::Prim {
                        prim: name.to_string(),
                        args,
                        annots,
                    });
                }
                Err(ForgeError::Micheline(
                    "object is not a micheline node".to_string(),
                ))
            }
            _ => Err(ForgeError::Micheline(format!(
                "unexpected JSON node: {value}"
            ))),
        }
    }

    /// Append the canonical binary encoding
    pub fn forge_into(&self, out: &mut Vec<u8>) -> Result<(), ForgeError> {
        match self {
            Micheline::Int(i) => {
                out.push(0x00);
                zarith::put_int(*i, out);
            }
            Micheline::String(s) => {
                out.push(0x01);
                put_dynamic(s.as_bytes(), out);
            }
            Micheline::Seq(items) => {
                out.push(0x02);
                let mut body = Vec::new();
                for item in items {
                    item.forge_into(&mut body)?;
                }
                put_dynamic(&body, out);
            }
            Micheline::Prim { prim, args, annots } => {
                let code = primitive_code(prim)
                    .ok_or_else(|| ForgeError::UnknownPrimitive(prim.clone()))?;
                let has_annots = !annots.is_empty();
                match args.len() {
                    0 => {
                        out.push(if has_annots { 0x04 } else { 0x03 });
                        out.push(code);
                        if has_annots {
                            put_annots(annots, out);
                        }
                    }
                    1 => {
                        out.push(if has_annots { 0x06 } else { 0x05 });
                        out.push(code);
                        args[0].forge_into(out)?;
                        if has_annots {
                            put_annots(annots, out);
                        }
                    }
                    2 => {
                        out.push(if has_annots { 0x08 } else { 0x07 });
                        out.push(code);
                        args[0].forge_into(out)?;
                        args[1].forge_into(out)?;
                        if has_annots {
                            put_annots(annots, out);
                        }
                    }
                    _ => {
                        // General form: dynamic argument sequence, annots always present
                        out.push(0x09);
                        out.push(code);
                        let mut body = Vec::new();
                        for arg in args {
                            arg.forge_into(&mut body)?;
                        }
                        put_dynamic(&body, out);
                        put_annots(annots, out);
                    }
                }
            }
            Micheline::Bytes(b) => {
                out.push(0x0a);
                put_dynamic(b, out);
            }
        }
        Ok(())
    }

    /// Canonical binary encoding as a fresh buffer
    pub fn forge(&self) -> Result<Vec<u8>, ForgeError> {
        let mut out = Vec::new();
        self.forge_into(&mut out)?;
        Ok(out)
    }
}

/// 4-byte big-endian length followed by the bytes
fn put_dynamic(bytes: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

fn put_annots(annots: &[String], out: &mut Vec<u8>) {
    put_dynamic(annots.join(" ").as_bytes(), out);
}

impl Serialize for Micheline {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Micheline {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Micheline::from_json(&value).map_err(D::Error::custom)
    }
}
