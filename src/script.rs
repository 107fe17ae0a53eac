//! Script decoding, encoding and the opcode table
//!
//! A script is decoded into [`ScriptElement`]s: single-byte opcodes and push-data
//! operands. Decoding only fails when a push declares more bytes than remain;
//! unassigned opcode bytes decode as unnamed [`Opcode`]s so that historical
//! output scripts holding arbitrary bytes still round-trip exactly.

use crate::error::{InquisitorError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Opcode(pub u8);

/// Named opcode constants.
pub mod opcodes {
    use super::Opcode;

    pub const OP_0: Opcode = Opcode(0x00);
    pub const OP_PUSHDATA1: Opcode = Opcode(0x4c);
    pub const OP_PUSHDATA2: Opcode = Opcode(0x4d);
    pub const OP_PUSHDATA4: Opcode = Opcode(0x4e);
    pub const OP_1NEGATE: Opcode = Opcode(0x4f);
    pub const OP_RESERVED: Opcode = Opcode(0x50);
    pub const OP_1: Opcode = Opcode(0x51);
    pub const OP_16: Opcode = Opcode(0x60);

    // Flow control
    pub const OP_NOP: Opcode = Opcode(0x61);
    pub const OP_VER: Opcode = Opcode(0x62);
    pub const OP_IF: Opcode = Opcode(0x63);
    pub const OP_NOTIF: Opcode = Opcode(0x64);
    pub const OP_VERIF: Opcode = Opcode(0x65);
    pub const OP_VERNOTIF: Opcode = Opcode(0x66);
    pub const OP_ELSE: Opcode = Opcode(0x67);
    pub const OP_ENDIF: Opcode = Opcode(0x68);
    pub const OP_VERIFY: Opcode = Opcode(0x69);
    pub const OP_RETURN: Opcode = Opcode(0x6a);

    // Stack
    pub const OP_TOALTSTACK: Opcode = Opcode(0x6b);
    pub const OP_FROMALTSTACK: Opcode = Opcode(0x6c);
    pub const OP_2DROP: Opcode = Opcode(0x6d);
    pub const OP_2DUP: Opcode = Opcode(0x6e);
    pub const OP_3DUP: Opcode = Opcode(0x6f);
    pub const OP_2OVER: Opcode = Opcode(0x70);
    pub const OP_2ROT: Opcode = Opcode(0x71);
    pub const OP_2SWAP: Opcode = Opcode(0x72);
    pub const OP_IFDUP: Opcode = Opcode(0x73);
    pub const OP_DEPTH: Opcode = Opcode(0x74);
    pub const OP_DROP: Opcode = Opcode(0x75);
    pub const OP_DUP: Opcode = Opcode(0x76);
    pub const OP_NIP: Opcode = Opcode(0x77);
    pub const OP_OVER: Opcode = Opcode(0x78);
    pub const OP_PICK: Opcode = Opcode(0x79);
    pub const OP_ROLL: Opcode = Opcode(0x7a);
    pub const OP_ROT: Opcode = Opcode(0x7b);
    pub const OP_SWAP: Opcode = Opcode(0x7c);
    pub const OP_TUCK: Opcode = Opcode(0x7d);

    // Splice
    pub const OP_CAT: Opcode = Opcode(0x7e);
    pub const OP_SUBSTR: Opcode = Opcode(0x7f);
    pub const OP_LEFT: Opcode = Opcode(0x80);
    pub const OP_RIGHT: Opcode = Opcode(0x81);
    pub const OP_SIZE: Opcode = Opcode(0x82);

    // Bitwise logic
    pub const OP_INVERT: Opcode = Opcode(0x83);
    pub const OP_AND: Opcode = Opcode(0x84);
    pub const OP_OR: Opcode = Opcode(0x85);
    pub const OP_XOR: Opcode = Opcode(0x86);
    pub const OP_EQUAL: Opcode = Opcode(0x87);
    pub const OP_EQUALVERIFY: Opcode = Opcode(0x88);
    pub const OP_RESERVED1: Opcode = Opcode(0x89);
    pub const OP_RESERVED2: Opcode = Opcode(0x8a);

    // Arithmetic
    pub const OP_1ADD: Opcode = Opcode(0x8b);
    pub const OP_1SUB: Opcode = Opcode(0x8c);
    pub const OP_2MUL: Opcode = Opcode(0x8d);
    pub const OP_2DIV: Opcode = Opcode(0x8e);
    pub const OP_NEGATE: Opcode = Opcode(0x8f);
    pub const OP_ABS: Opcode = Opcode(0x90);
    pub const OP_NOT: Opcode = Opcode(0x91);
    pub const OP_0NOTEQUAL: Opcode = Opcode(0x92);
    pub const OP_ADD: Opcode = Opcode(0x93);
    pub const OP_SUB: Opcode = Opcode(0x94);
    pub const OP_MUL: Opcode = Opcode(0x95);
    pub const OP_DIV: Opcode = Opcode(0x96);
    pub const OP_MOD: Opcode = Opcode(0x97);
    pub const OP_LSHIFT: Opcode = Opcode(0x98);
    pub const OP_RSHIFT: Opcode = Opcode(0x99);
    pub const OP_BOOLAND: Opcode = Opcode(0x9a);
    pub const OP_BOOLOR: Opcode = Opcode(0x9b);
    pub const OP_NUMEQUAL: Opcode = Opcode(0x9c);
    pub const OP_NUMEQUALVERIFY: Opcode = Opcode(0x9d);
    pub const OP_NUMNOTEQUAL: Opcode = Opcode(0x9e);
    pub const OP_LESSTHAN: Opcode = Opcode(0x9f);
    pub const OP_GREATERTHAN: Opcode = Opcode(0xa0);
    pub const OP_LESSTHANOREQUAL: Opcode = Opcode(0xa1);
    pub const OP_GREATERTHANOREQUAL: Opcode = Opcode(0xa2);
    pub const OP_MIN: Opcode = Opcode(0xa3);
    pub const OP_MAX: Opcode = Opcode(0xa4);
    pub const OP_WITHIN: Opcode = Opcode(0xa5);

    // Crypto
    pub const OP_RIPEMD160: Opcode = Opcode(0xa6);
    pub const OP_SHA1: Opcode = Opcode(0xa7);
    pub const OP_SHA256: Opcode = Opcode(0xa8);
    pub const OP_HASH160: Opcode = Opcode(0xa9);
    pub const OP_HASH256: Opcode = Opcode(0xaa);
    pub const OP_CODESEPARATOR: Opcode = Opcode(0xab);
    pub const OP_CHECKSIG: Opcode = Opcode(0xac);
    pub const OP_CHECKSIGVERIFY: Opcode = Opcode(0xad);
    pub const OP_CHECKMULTISIG: Opcode = Opcode(0xae);
    pub const OP_CHECKMULTISIGVERIFY: Opcode = Opcode(0xaf);

    // Expansion
    pub const OP_NOP1: Opcode = Opcode(0xb0);
    pub const OP_NOP2: Opcode = Opcode(0xb1);
    pub const OP_NOP3: Opcode = Opcode(0xb2);
    pub const OP_NOP10: Opcode = Opcode(0xb9);

    // Pseudo-words
    pub const OP_PUBKEYHASH: Opcode = Opcode(0xfd);
    pub const OP_PUBKEY: Opcode = Opcode(0xfe);
    pub const OP_INVALIDOPCODE: Opcode = Opcode(0xff);
}

use opcodes::*;

/// Alternate spellings accepted by [`Opcode::from_name`].
const OPCODE_ALIASES: &[(&str, Opcode)] = &[
    ("OP_FALSE", OP_0),
    ("OP_TRUE", OP_1),
    ("OP_CHECKLOCKTIMEVERIFY", OP_NOP2),
    ("OP_CHECKSEQUENCEVERIFY", OP_NOP3),
];

impl Opcode {
    /// Canonical mnemonic, `None` for direct-push lengths (1..=75) and unassigned bytes.
    pub fn name(self) -> Option<&'static str> {
        let name = match self.0 {
            0x00 => "OP_0",
            0x01..=0x4b => return None,
            0x4c => "OP_PUSHDATA1",
            0x4d => "OP_PUSHDATA2",
            0x4e => "OP_PUSHDATA4",
            0x4f => "OP_1NEGATE",
            0x50 => "OP_RESERVED",
            0x51 => "OP_1",
            0x52 => "OP_2",
            0x53 => "OP_3",
            0x54 => "OP_4",
            0x55 => "OP_5",
            0x56 => "OP_6",
            0x57 => "OP_7",
            0x58 => "OP_8",
            0x59 => "OP_9",
            0x5a => "OP_10",
            0x5b => "OP_11",
            0x5c => "OP_12",
            0x5d => "OP_13",
            0x5e => "OP_14",
            0x5f => "OP_15",
            0x60 => "OP_16",
            0x61 => "OP_NOP",
            0x62 => "OP_VER",
            0x63 => "OP_IF",
            0x64 => "OP_NOTIF",
            0x65 => "OP_VERIF",
            0x66 => "OP_VERNOTIF",
            0x67 => "OP_ELSE",
            0x68 => "OP_ENDIF",
            0x69 => "OP_VERIFY",
            0x6a => "OP_RETURN",
            0x6b => "OP_TOALTSTACK",
            0x6c => "OP_FROMALTSTACK",
            0x6d => "OP_2DROP",
            0x6e => "OP_2DUP",
            0x6f => "OP_3DUP",
            0x70 => "OP_2OVER",
            0x71 => "OP_2ROT",
            0x72 => "OP_2SWAP",
            0x73 => "OP_IFDUP",
            0x74 => "OP_DEPTH",
            0x75 => "OP_DROP",
            0x76 => "OP_DUP",
            0x77 => "OP_NIP",
            0x78 => "OP_OVER",
            0x79 => "OP_PICK",
            0x7a => "OP_ROLL",
            0x7b => "OP_ROT",
            0x7c => "OP_SWAP",
            0x7d => "OP_TUCK",
            0x7e => "OP_CAT",
            0x7f => "OP_SUBSTR",
            0x80 => "OP_LEFT",
            0x81 => "OP_RIGHT",
            0x82 => "OP_SIZE",
            0x83 => "OP_INVERT",
            0x84 => "OP_AND",
            0x85 => "OP_OR",
            0x86 => "OP_XOR",
            0x87 => "OP_EQUAL",
            0x88 => "OP_EQUALVERIFY",
            0x89 => "OP_RESERVED1",
            0x8a => "OP_RESERVED2",
            0x8b => "OP_1ADD",
            0x8c => "OP_1SUB",
            0x8d => "OP_2MUL",
            0x8e => "OP_2DIV",
            0x8f => "OP_NEGATE",
            0x90 => "OP_ABS",
            0x91 => "OP_NOT",
            0x92 => "OP_0NOTEQUAL",
            0x93 => "OP_ADD",
            0x94 => "OP_SUB",
            0x95 => "OP_MUL",
            0x96 => "OP_DIV",
            0x97 => "OP_MOD",
            0x98 => "OP_LSHIFT",
            0x99 => "OP_RSHIFT",
            0x9a => "OP_BOOLAND",
            0x9b => "OP_BOOLOR",
            0x9c => "OP_NUMEQUAL",
            0x9d => "OP_NUMEQUALVERIFY",
            0x9e => "OP_NUMNOTEQUAL",
            0x9f => "OP_LESSTHAN",
            0xa0 => "OP_GREATERTHAN",
            0xa1 => "OP_LESSTHANOREQUAL",
            0xa2 => "OP_GREATERTHANOREQUAL",
            0xa3 => "OP_MIN",
            0xa4 => "OP_MAX",
            0xa5 => "OP_WITHIN",
            0xa6 => "OP_RIPEMD160",
            0xa7 => "OP_SHA1",
            0xa8 => "OP_SHA256",
            0xa9 => "OP_HASH160",
            0xaa => "OP_HASH256",
            0xab => "OP_CODESEPARATOR",
            0xac => "OP_CHECKSIG",
            0xad => "OP_CHECKSIGVERIFY",
            0xae => "OP_CHECKMULTISIG",
            0xaf => "OP_CHECKMULTISIGVERIFY",
            0xb0 => "OP_NOP1",
            0xb1 => "OP_NOP2",
            0xb2 => "OP_NOP3",
            0xb3 => "OP_NOP4",
            0xb4 => "OP_NOP5",
            0xb5 => "OP_NOP6",
            0xb6 => "OP_NOP7",
            0xb7 => "OP_NOP8",
            0xb8 => "OP_NOP9",
            0xb9 => "OP_NOP10",
            0xfd => "OP_PUBKEYHASH",
            0xfe => "OP_PUBKEY",
            0xff => "OP_INVALIDOPCODE",
            _ => return None,
        };
        Some(name)
    }

    /// Look an opcode up by canonical mnemonic or alias.
    pub fn from_name(name: &str) -> Option<Opcode> {
        if let Some((_, op)) = OPCODE_ALIASES.iter().find(|(alias, _)| *alias == name) {
            return Some(*op);
        }
        (0..=u8::MAX).map(Opcode).find(|op| op.name() == Some(name))
    }

    /// Opcodes that fail the script whenever executed.
    pub fn is_disabled(self) -> bool {
        matches!(
            self,
            OP_CAT | OP_SUBSTR | OP_LEFT | OP_RIGHT | OP_INVERT | OP_AND | OP_OR | OP_XOR
                | OP_2MUL | OP_2DIV | OP_MUL | OP_DIV | OP_MOD | OP_LSHIFT | OP_RSHIFT
        )
    }

    /// OP_NOP and OP_NOP1..OP_NOP10.
    pub fn is_nop(self) -> bool {
        self == OP_NOP || (OP_NOP1.0..=OP_NOP10.0).contains(&self.0)
    }

    /// The number pushed by OP_1NEGATE and OP_1..OP_16.
    pub fn small_int(self) -> Option<i64> {
        match self {
            OP_1NEGATE => Some(-1),
            Opcode(b) if (OP_1.0..=OP_16.0).contains(&b) => Some((b - OP_1.0 + 1) as i64),
            _ => None,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "OP_UNKNOWN({})", self.0),
        }
    }
}

/// How a push declares its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PushEncoding {
    /// Opcode byte 1..=75 is the length
    Direct,
    /// OP_PUSHDATA1 + 1-byte length
    PushData1,
    /// OP_PUSHDATA2 + 2-byte LE length
    PushData2,
    /// OP_PUSHDATA4 + 4-byte LE length
    PushData4,
}

impl PushEncoding {
    /// The shortest encoding able to carry `len` bytes.
    pub fn minimal_for(len: usize) -> Self {
        match len {
            0..=0x4b => PushEncoding::Direct,
            0x4c..=0xff => PushEncoding::PushData1,
            0x100..=0xffff => PushEncoding::PushData2,
            _ => PushEncoding::PushData4,
        }
    }

    /// The `x` in the human-readable `OP_PUSHDATAx(n)`.
    fn human_index(self) -> u8 {
        match self {
            PushEncoding::Direct => 0,
            PushEncoding::PushData1 => 1,
            PushEncoding::PushData2 => 2,
            PushEncoding::PushData4 => 4,
        }
    }

    fn from_human_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(PushEncoding::Direct),
            1 => Some(PushEncoding::PushData1),
            2 => Some(PushEncoding::PushData2),
            4 => Some(PushEncoding::PushData4),
            _ => None,
        }
    }
}

/// One decoded script element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptElement {
    Op(Opcode),
    Push { encoding: PushEncoding, data: Vec<u8> },
}

impl ScriptElement {
    /// A push using the shortest length encoding; the empty push is OP_0.
    pub fn push(data: &[u8]) -> Self {
        if data.is_empty() {
            return ScriptElement::Op(OP_0);
        }
        ScriptElement::Push {
            encoding: PushEncoding::minimal_for(data.len()),
            data: data.to_vec(),
        }
    }

    pub fn push_data(&self) -> Option<&[u8]> {
        match self {
            ScriptElement::Push { data, .. } => Some(data),
            ScriptElement::Op(_) => None,
        }
    }

    pub fn opcode(&self) -> Option<Opcode> {
        match self {
            ScriptElement::Op(op) => Some(*op),
            ScriptElement::Push { .. } => None,
        }
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            ScriptElement::Op(op) => out.push(op.0),
            ScriptElement::Push { encoding, data } => {
                // A direct push cannot carry 0 or more than 75 bytes
                let encoding = match encoding {
                    PushEncoding::Direct if data.is_empty() || data.len() > 0x4b => {
                        PushEncoding::minimal_for(data.len().max(0x4c))
                    }
                    other => *other,
                };
                match encoding {
                    PushEncoding::Direct => out.push(data.len() as u8),
                    PushEncoding::PushData1 => {
                        out.push(OP_PUSHDATA1.0);
                        out.push(data.len() as u8);
                    }
                    PushEncoding::PushData2 => {
                        out.push(OP_PUSHDATA2.0);
                        out.extend_from_slice(&(data.len() as u16).to_le_bytes());
                    }
                    PushEncoding::PushData4 => {
                        out.push(OP_PUSHDATA4.0);
                        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
                    }
                }
                out.extend_from_slice(data);
            }
        }
    }
}

/// A decoded script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    elements: Vec<ScriptElement>,
}

impl Script {
    pub fn new(elements: Vec<ScriptElement>) -> Self {
        Script { elements }
    }

    pub fn elements(&self) -> &[ScriptElement] {
        &self.elements
    }

    pub fn into_elements(self) -> Vec<ScriptElement> {
        self.elements
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Decode a script byte string.
    ///
    /// 1. 0x00: OP_0 (pushes the empty string when executed)
    /// 2. 0x01..=0x4b: push that many following bytes
    /// 3. 0x4c/0x4d/0x4e: push with a 1/2/4-byte LE length prefix
    /// 4. anything else: a single opcode byte
    pub fn decode(bytes: &[u8]) -> Result<Script> {
        let mut elements = Vec::new();
        let mut pos = 0usize;

        while pos < bytes.len() {
            let byte = bytes[pos];
            pos += 1;

            let (encoding, prefix_len) = match byte {
                0x01..=0x4b => (PushEncoding::Direct, 0),
                0x4c => (PushEncoding::PushData1, 1),
                0x4d => (PushEncoding::PushData2, 2),
                0x4e => (PushEncoding::PushData4, 4),
                _ => {
                    elements.push(ScriptElement::Op(Opcode(byte)));
                    continue;
                }
            };

            let remaining = bytes.len() - pos;
            if prefix_len > remaining {
                return Err(InquisitorError::ScriptTruncated {
                    declared: prefix_len,
                    remaining,
                });
            }
            let declared = match prefix_len {
                0 => byte as usize,
                1 => bytes[pos] as usize,
                2 => u16::from_le_bytes([bytes[pos], bytes[pos + 1]]) as usize,
                _ => u32::from_le_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]])
                    as usize,
            };
            pos += prefix_len;

            let remaining = bytes.len() - pos;
            if declared > remaining {
                return Err(InquisitorError::ScriptTruncated { declared, remaining });
            }
            elements.push(ScriptElement::Push {
                encoding,
                data: bytes[pos..pos + declared].to_vec(),
            });
            pos += declared;
        }

        Ok(Script { elements })
    }

    /// Exact inverse of [`Script::decode`].
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for element in &self.elements {
            element.encode_into(&mut out);
        }
        out
    }

    /// True if every element is a push or a constant-pushing opcode (OP_0, OP_1NEGATE, OP_1..OP_16).
    pub fn is_push_only(&self) -> bool {
        self.elements.iter().all(|element| match element {
            ScriptElement::Push { .. } => true,
            ScriptElement::Op(op) => op.0 <= OP_16.0,
        })
    }

    /// Data of every push element, in order.
    pub fn pushes(&self) -> impl Iterator<Item = &[u8]> {
        self.elements.iter().filter_map(ScriptElement::push_data)
    }

    /// Copy of the script with every minimally-encoded push of `data` removed.
    pub fn without_push(&self, data: &[u8]) -> Script {
        let needle = ScriptElement::push(data);
        let mut needle_bytes = Vec::new();
        needle.encode_into(&mut needle_bytes);

        let elements = self
            .elements
            .iter()
            .filter(|element| {
                let mut bytes = Vec::new();
                element.encode_into(&mut bytes);
                bytes != needle_bytes
            })
            .cloned()
            .collect();
        Script { elements }
    }

    /// Copy of the script with every OP_CODESEPARATOR removed.
    pub fn without_codeseparators(&self) -> Script {
        let elements = self
            .elements
            .iter()
            .filter(|element| element.opcode() != Some(OP_CODESEPARATOR))
            .cloned()
            .collect();
        Script { elements }
    }

    /// Human-readable form, e.g. `OP_DUP OP_HASH160 OP_PUSHDATA0(20) 62e9... OP_EQUALVERIFY OP_CHECKSIG`.
    pub fn to_human(&self) -> String {
        let mut parts = Vec::with_capacity(self.elements.len());
        for element in &self.elements {
            match element {
                ScriptElement::Op(op) => parts.push(op.to_string()),
                ScriptElement::Push { encoding, data } => {
                    parts.push(format!("OP_PUSHDATA{}({})", encoding.human_index(), data.len()));
                    if !data.is_empty() {
                        parts.push(hex::encode(data));
                    }
                }
            }
        }
        parts.join(" ")
    }

    /// Parse the output of [`Script::to_human`].
    pub fn from_human(human: &str) -> Result<Script> {
        let mut elements = Vec::new();
        let mut tokens = human.split_whitespace();

        while let Some(token) = tokens.next() {
            if let Some(rest) = token.strip_prefix("OP_PUSHDATA") {
                let (encoding, len) = parse_pushdata_token(rest)
                    .ok_or_else(|| InquisitorError::InvalidHumanScript(token.to_string()))?;
                let data = if len == 0 {
                    Vec::new()
                } else {
                    let data_token = tokens.next().ok_or_else(|| {
                        InquisitorError::InvalidHumanScript(format!("{} is missing its data", token))
                    })?;
                    hex::decode(data_token)?
                };
                if data.len() != len {
                    return Err(InquisitorError::InvalidHumanScript(format!(
                        "{} declares {} bytes but {} were given",
                        token,
                        len,
                        data.len()
                    )));
                }
                elements.push(ScriptElement::Push { encoding, data });
            } else if let Some(byte) = token
                .strip_prefix("OP_UNKNOWN(")
                .and_then(|rest| rest.strip_suffix(')'))
                .and_then(|n| n.parse::<u8>().ok())
            {
                elements.push(ScriptElement::Op(Opcode(byte)));
            } else {
                let op = Opcode::from_name(token)
                    .ok_or_else(|| InquisitorError::InvalidOpcodeName(token.to_string()))?;
                elements.push(ScriptElement::Op(op));
            }
        }

        Ok(Script { elements })
    }
}

/// Parse the `x(n)` tail of an `OP_PUSHDATAx(n)` token.
fn parse_pushdata_token(rest: &str) -> Option<(PushEncoding, usize)> {
    let (index, len) = rest.split_once('(')?;
    let len = len.strip_suffix(')')?.parse::<usize>().ok()?;
    let encoding = PushEncoding::from_human_index(index.parse::<u8>().ok()?)?;
    Some((encoding, len))
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_human())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P2PKH_HEX: &str = "76a91462e907b15cbf27d5425399ebf6f0fb50ebb88f1888ac";

    #[test]
    fn test_decode_pay_to_pubkey_hash() {
        let bytes = hex::decode(P2PKH_HEX).unwrap();
        let script = Script::decode(&bytes).unwrap();
        assert_eq!(script.elements().len(), 5);
        assert_eq!(script.elements()[0], ScriptElement::Op(OP_DUP));
        assert_eq!(script.elements()[2].push_data().map(|d| d.len()), Some(20));
        assert_eq!(script.encode(), bytes);
    }

    #[test]
    fn test_decode_truncated_push() {
        // Declares 20 bytes, carries 2
        assert_eq!(
            Script::decode(&[0x14, 0xaa, 0xbb]),
            Err(InquisitorError::ScriptTruncated { declared: 20, remaining: 2 })
        );
        // PUSHDATA2 missing one byte of its length prefix
        assert_eq!(
            Script::decode(&[0x4d, 0x01]),
            Err(InquisitorError::ScriptTruncated { declared: 2, remaining: 1 })
        );
    }

    #[test]
    fn test_non_minimal_push_round_trips() {
        let bytes = vec![0x4c, 0x02, 0xab, 0xcd, 0x4d, 0x00, 0x00, 0x51];
        let script = Script::decode(&bytes).unwrap();
        assert_eq!(
            script.elements()[0],
            ScriptElement::Push { encoding: PushEncoding::PushData1, data: vec![0xab, 0xcd] }
        );
        assert_eq!(script.encode(), bytes);
    }

    #[test]
    fn test_unassigned_bytes_decode() {
        let bytes = vec![0xba, 0xfc, 0xff];
        let script = Script::decode(&bytes).unwrap();
        assert_eq!(script.elements()[0].opcode().and_then(Opcode::name), None);
        assert_eq!(script.to_human(), "OP_UNKNOWN(186) OP_UNKNOWN(252) OP_INVALIDOPCODE");
        assert_eq!(Script::from_human(&script.to_human()).unwrap().encode(), bytes);
    }

    #[test]
    fn test_human_format() {
        let script = Script::decode(&hex::decode(P2PKH_HEX).unwrap()).unwrap();
        let human = script.to_human();
        assert_eq!(
            human,
            "OP_DUP OP_HASH160 OP_PUSHDATA0(20) 62e907b15cbf27d5425399ebf6f0fb50ebb88f18 OP_EQUALVERIFY OP_CHECKSIG"
        );
        assert_eq!(Script::from_human(&human).unwrap(), script);
    }

    #[test]
    fn test_from_human_errors() {
        assert!(matches!(
            Script::from_human("OP_DUP OP_BOGUS"),
            Err(InquisitorError::InvalidOpcodeName(_))
        ));
        assert!(matches!(
            Script::from_human("OP_PUSHDATA0(3) abcd"),
            Err(InquisitorError::InvalidHumanScript(_))
        ));
        assert!(matches!(
            Script::from_human("OP_PUSHDATA3(1) ab"),
            Err(InquisitorError::InvalidHumanScript(_))
        ));
        assert!(matches!(
            Script::from_human("OP_PUSHDATA0(1) zz"),
            Err(InquisitorError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_opcode_names_round_trip() {
        for byte in (0x00..=0xb9u8).chain(0xfd..=0xff) {
            let op = Opcode(byte);
            match op.name() {
                Some(name) => assert_eq!(Opcode::from_name(name), Some(op), "{}", name),
                None => assert!((0x01..=0x4b).contains(&byte)),
            }
        }
        assert_eq!(Opcode::from_name("OP_FALSE"), Some(OP_0));
        assert_eq!(Opcode::from_name("OP_TRUE"), Some(OP_1));
        assert_eq!(Opcode::from_name("OP_CHECKLOCKTIMEVERIFY"), Some(OP_NOP2));
    }

    #[test]
    fn test_opcode_classes() {
        assert!(OP_CAT.is_disabled());
        assert!(!OP_ADD.is_disabled());
        assert!(OP_NOP.is_nop());
        assert!(Opcode(0xb5).is_nop());
        assert!(!OP_CHECKSIG.is_nop());
        assert_eq!(OP_1NEGATE.small_int(), Some(-1));
        assert_eq!(OP_16.small_int(), Some(16));
        assert_eq!(OP_0.small_int(), None);
    }

    #[test]
    fn test_push_only() {
        assert!(Script::from_human("OP_0 OP_PUSHDATA0(1) 01 OP_16").unwrap().is_push_only());
        assert!(!Script::from_human("OP_PUSHDATA0(1) 01 OP_DUP").unwrap().is_push_only());
    }

    #[test]
    fn test_without_push_and_codeseparators() {
        let script =
            Script::from_human("OP_PUSHDATA0(2) abcd OP_CODESEPARATOR OP_PUSHDATA1(2) abcd OP_CHECKSIG").unwrap();
        let stripped = script.without_push(&[0xab, 0xcd]).without_codeseparators();
        // Only the minimally-encoded copy matches
        assert_eq!(stripped.to_human(), "OP_PUSHDATA1(2) abcd OP_CHECKSIG");
    }

    #[test]
    fn test_minimal_push_encoding() {
        let mut out = Vec::new();
        ScriptElement::push(&[0u8; 80]).encode_into(&mut out);
        assert_eq!(&out[..2], &[0x4c, 80]);
        let mut out = Vec::new();
        ScriptElement::push(&[]).encode_into(&mut out);
        assert_eq!(out, vec![0x00]);
    }
}
