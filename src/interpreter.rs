//! Script execution engine
//!
//! A stack machine over byte strings implementing the legacy (pre-segwit)
//! consensus rules. Signature checks are delegated to a [`SignatureChecker`] so
//! the machine itself needs no transaction context.

use crate::classify::p2sh_hash;
use crate::codec::{double_sha256, hash160, ripemd160, sha256};
use crate::constants::*;
use crate::script::opcodes::*;
use crate::script::{Opcode, Script, ScriptElement};
use crate::types::ByteString;
use bitcoin_hashes::{sha1, Hash as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Stack = Vec<ByteString>;

/// Why a script failed. A failed script is a verification outcome, not a
/// decode error.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptError {
    #[error("Script of {0} bytes exceeds the size limit")]
    ScriptSize(usize),

    #[error("Push of {0} bytes exceeds the element size limit")]
    PushSize(usize),

    #[error("Operation limit exceeded")]
    OpCount,

    #[error("Stack overflow")]
    StackOverflow,

    #[error("{0} needs more stack items")]
    StackUnderflow(Opcode),

    #[error("{0} is disabled")]
    DisabledOpcode(Opcode),

    #[error("{0} cannot be executed")]
    BadOpcode(Opcode),

    #[error("Unbalanced conditional")]
    UnbalancedConditional,

    #[error("{0} failed")]
    VerifyFailed(Opcode),

    #[error("OP_RETURN executed")]
    OpReturn,

    #[error("Numeric operand longer than {0} bytes")]
    NumberOverflow(usize),

    #[error("{0} index out of range")]
    InvalidStackIndex(Opcode),

    #[error("Multisig key count out of range")]
    PubkeyCount,

    #[error("Multisig signature count out of range")]
    SigCount,

    #[error("Script finished with a false or empty stack")]
    EvalFalse,

    #[error("Pay-to-script-hash spend must be push-only")]
    SigPushOnly,

    #[error("Script could not be decoded: {0}")]
    Decode(String),
}

pub type ScriptResult<T> = std::result::Result<T, ScriptError>;

/// Verifies one signature against one public key.
///
/// `signature` still carries its trailing hashtype byte. `script_code` is the
/// executing script from just after its last executed OP_CODESEPARATOR, with
/// every signature of the current check already removed.
pub trait SignatureChecker {
    fn check_signature(&mut self, signature: &[u8], pubkey: &[u8], script_code: &Script) -> bool;
}

/// Truthiness of a stack element: any non-zero byte, except negative zero.
pub fn cast_to_bool(bytes: &[u8]) -> bool {
    match bytes.split_last() {
        None => false,
        Some((&last, rest)) => rest.iter().any(|&b| b != 0) || (last != 0 && last != 0x80),
    }
}

/// Decode a little-endian sign-magnitude number of at most `max_size` bytes.
pub fn decode_num(bytes: &[u8], max_size: usize) -> ScriptResult<i64> {
    if bytes.len() > max_size {
        return Err(ScriptError::NumberOverflow(max_size));
    }
    let Some(&last) = bytes.last() else {
        return Ok(0);
    };
    let mut value: i64 = 0;
    for (i, &byte) in bytes.iter().enumerate() {
        value |= (byte as i64) << (8 * i);
    }
    if last & 0x80 != 0 {
        let sign_bit = 0x80i64 << (8 * (bytes.len() - 1));
        return Ok(-(value & !sign_bit));
    }
    Ok(value)
}

/// Minimal little-endian sign-magnitude encoding; zero is the empty string.
pub fn encode_num(value: i64) -> ByteString {
    let mut out = Vec::new();
    let negative = value < 0;
    let mut magnitude = value.unsigned_abs();
    while magnitude > 0 {
        out.push((magnitude & 0xff) as u8);
        magnitude >>= 8;
    }
    if let Some(last) = out.last_mut() {
        if *last & 0x80 != 0 {
            out.push(if negative { 0x80 } else { 0x00 });
        } else if negative {
            *last |= 0x80;
        }
    }
    out
}

fn encode_bool(value: bool) -> ByteString {
    if value {
        vec![1]
    } else {
        Vec::new()
    }
}

struct Machine<'a, C> {
    stack: &'a mut Stack,
    altstack: Stack,
    exec: Vec<bool>,
    op_count: usize,
    code_start: usize,
    elements: &'a [ScriptElement],
    checker: &'a mut C,
}

/// EvalScript: 𝒮𝒞 × 𝒮𝒯 → 𝒮𝒯
///
/// 1. Reject scripts over the size limit
/// 2. For each element: count non-push opcodes against the operation limit,
///    fail on disabled opcodes even in unexecuted branches, execute pushes and
///    opcodes in executed branches (conditionals always)
/// 3. After each element: main plus alt stack must stay within the depth limit
/// 4. Every IF must be closed by an ENDIF
///
/// `stack` is left as the script finished with it.
pub fn eval_script<C: SignatureChecker>(script: &Script, stack: &mut Stack, checker: &mut C) -> ScriptResult<()> {
    let size = script.encode().len();
    if size > MAX_SCRIPT_SIZE {
        return Err(ScriptError::ScriptSize(size));
    }

    let mut machine = Machine {
        stack,
        altstack: Vec::new(),
        exec: Vec::new(),
        op_count: 0,
        code_start: 0,
        elements: script.elements(),
        checker,
    };
    for (pos, element) in script.elements().iter().enumerate() {
        machine.step(pos, element)?;
        if machine.stack.len() + machine.altstack.len() > MAX_STACK_SIZE {
            return Err(ScriptError::StackOverflow);
        }
    }
    if !machine.exec.is_empty() {
        return Err(ScriptError::UnbalancedConditional);
    }
    Ok(())
}

/// VerifyScript: 𝒮𝒞 × 𝒮𝒞 × {true, false} → {ok, failure}
///
/// 1. Run the input script on an empty stack
/// 2. Run the output script on the resulting stack; its top must be true
/// 3. With `p2sh` enabled and an `OP_HASH160 <20> OP_EQUAL` output: the input
///    script must be push-only, and its last push is decoded as the redeem
///    script and run on the remaining pushes; that top must be true too
pub fn verify_script<C: SignatureChecker>(
    script_sig: &Script,
    script_pubkey: &Script,
    p2sh: bool,
    checker: &mut C,
) -> ScriptResult<()> {
    let p2sh_spend = p2sh && p2sh_hash(script_pubkey).is_some();
    if p2sh_spend && !script_sig.is_push_only() {
        return Err(ScriptError::SigPushOnly);
    }

    let mut stack = Stack::new();
    eval_script(script_sig, &mut stack, checker)?;
    let redeem_stack = p2sh_spend.then(|| stack.clone());

    eval_script(script_pubkey, &mut stack, checker)?;
    if !stack.last().is_some_and(|top| cast_to_bool(top)) {
        return Err(ScriptError::EvalFalse);
    }

    if let Some(mut stack) = redeem_stack {
        let serialized = stack.pop().ok_or(ScriptError::EvalFalse)?;
        let redeem = Script::decode(&serialized).map_err(|e| ScriptError::Decode(e.to_string()))?;
        eval_script(&redeem, &mut stack, checker)?;
        if !stack.last().is_some_and(|top| cast_to_bool(top)) {
            return Err(ScriptError::EvalFalse);
        }
    }
    Ok(())
}

impl<'a, C: SignatureChecker> Machine<'a, C> {
    fn step(&mut self, pos: usize, element: &ScriptElement) -> ScriptResult<()> {
        let executing = self.exec.iter().all(|&branch| branch);
        match element {
            ScriptElement::Push { data, .. } => {
                if data.len() > MAX_SCRIPT_ELEMENT_SIZE {
                    return Err(ScriptError::PushSize(data.len()));
                }
                if executing {
                    self.stack.push(data.clone());
                }
                Ok(())
            }
            ScriptElement::Op(op) => {
                let op = *op;
                if op.0 > OP_16.0 {
                    self.count_ops(1)?;
                }
                if op.is_disabled() {
                    return Err(ScriptError::DisabledOpcode(op));
                }
                if executing || (OP_IF.0..=OP_ENDIF.0).contains(&op.0) {
                    self.execute(op, pos, executing)
                } else {
                    Ok(())
                }
            }
        }
    }

    fn count_ops(&mut self, n: usize) -> ScriptResult<()> {
        self.op_count += n;
        if self.op_count > MAX_SCRIPT_OPS {
            return Err(ScriptError::OpCount);
        }
        Ok(())
    }

    fn pop(&mut self, op: Opcode) -> ScriptResult<ByteString> {
        self.stack.pop().ok_or(ScriptError::StackUnderflow(op))
    }

    fn pop_num(&mut self, op: Opcode) -> ScriptResult<i64> {
        let bytes = self.pop(op)?;
        decode_num(&bytes, MAX_SCRIPT_NUM_SIZE)
    }

    fn require(&self, depth: usize, op: Opcode) -> ScriptResult<()> {
        if self.stack.len() < depth {
            return Err(ScriptError::StackUnderflow(op));
        }
        Ok(())
    }

    /// Element `depth` places from the top (1 is the top). Callers check depth first.
    fn peek(&self, depth: usize) -> &ByteString {
        &self.stack[self.stack.len() - depth]
    }

    fn script_code(&self, signatures: &[ByteString]) -> Script {
        let mut code = Script::new(self.elements[self.code_start..].to_vec());
        for signature in signatures {
            code = code.without_push(signature);
        }
        code
    }

    fn execute(&mut self, op: Opcode, pos: usize, executing: bool) -> ScriptResult<()> {
        if let Some(n) = op.small_int() {
            self.stack.push(encode_num(n));
            return Ok(());
        }

        match op {
            OP_0 => self.stack.push(Vec::new()),
            _ if op.is_nop() => {}

            // Flow control
            OP_IF | OP_NOTIF => {
                let mut value = false;
                if executing {
                    value = cast_to_bool(&self.pop(op)?);
                    if op == OP_NOTIF {
                        value = !value;
                    }
                }
                self.exec.push(value);
            }
            OP_ELSE => match self.exec.last_mut() {
                Some(branch) => *branch = !*branch,
                None => return Err(ScriptError::UnbalancedConditional),
            },
            OP_ENDIF => {
                self.exec.pop().ok_or(ScriptError::UnbalancedConditional)?;
            }
            OP_VERIFY => {
                if !cast_to_bool(&self.pop(op)?) {
                    return Err(ScriptError::VerifyFailed(op));
                }
            }
            OP_RETURN => return Err(ScriptError::OpReturn),

            // Stack
            OP_TOALTSTACK => {
                let item = self.pop(op)?;
                self.altstack.push(item);
            }
            OP_FROMALTSTACK => {
                let item = self.altstack.pop().ok_or(ScriptError::StackUnderflow(op))?;
                self.stack.push(item);
            }
            OP_2DROP => {
                self.require(2, op)?;
                let len = self.stack.len();
                self.stack.truncate(len - 2);
            }
            OP_2DUP => {
                self.require(2, op)?;
                let pair = [self.peek(2).clone(), self.peek(1).clone()];
                self.stack.extend(pair);
            }
            OP_3DUP => {
                self.require(3, op)?;
                let triple = [self.peek(3).clone(), self.peek(2).clone(), self.peek(1).clone()];
                self.stack.extend(triple);
            }
            OP_2OVER => {
                self.require(4, op)?;
                let pair = [self.peek(4).clone(), self.peek(3).clone()];
                self.stack.extend(pair);
            }
            OP_2ROT => {
                self.require(6, op)?;
                let len = self.stack.len();
                self.stack[len - 6..].rotate_left(2);
            }
            OP_2SWAP => {
                self.require(4, op)?;
                let len = self.stack.len();
                self.stack[len - 4..].rotate_left(2);
            }
            OP_IFDUP => {
                self.require(1, op)?;
                if cast_to_bool(self.peek(1)) {
                    let top = self.peek(1).clone();
                    self.stack.push(top);
                }
            }
            OP_DEPTH => {
                let depth = self.stack.len() as i64;
                self.stack.push(encode_num(depth));
            }
            OP_DROP => {
                self.pop(op)?;
            }
            OP_DUP => {
                self.require(1, op)?;
                let top = self.peek(1).clone();
                self.stack.push(top);
            }
            OP_NIP => {
                self.require(2, op)?;
                let len = self.stack.len();
                self.stack.remove(len - 2);
            }
            OP_OVER => {
                self.require(2, op)?;
                let second = self.peek(2).clone();
                self.stack.push(second);
            }
            OP_PICK | OP_ROLL => {
                self.require(2, op)?;
                let n = self.pop_num(op)?;
                if n < 0 || n as usize >= self.stack.len() {
                    return Err(ScriptError::InvalidStackIndex(op));
                }
                let index = self.stack.len() - 1 - n as usize;
                let item = if op == OP_ROLL {
                    self.stack.remove(index)
                } else {
                    self.stack[index].clone()
                };
                self.stack.push(item);
            }
            OP_ROT => {
                self.require(3, op)?;
                let len = self.stack.len();
                self.stack[len - 3..].rotate_left(1);
            }
            OP_SWAP => {
                self.require(2, op)?;
                let len = self.stack.len();
                self.stack.swap(len - 2, len - 1);
            }
            OP_TUCK => {
                self.require(2, op)?;
                let top = self.peek(1).clone();
                let len = self.stack.len();
                self.stack.insert(len - 2, top);
            }

            // Splice
            OP_SIZE => {
                self.require(1, op)?;
                let size = self.peek(1).len() as i64;
                self.stack.push(encode_num(size));
            }

            // Bitwise logic
            OP_EQUAL | OP_EQUALVERIFY => {
                self.require(2, op)?;
                let b = self.pop(op)?;
                let a = self.pop(op)?;
                if op == OP_EQUALVERIFY {
                    if a != b {
                        return Err(ScriptError::VerifyFailed(op));
                    }
                } else {
                    self.stack.push(encode_bool(a == b));
                }
            }

            // Arithmetic
            OP_1ADD | OP_1SUB | OP_NEGATE | OP_ABS | OP_NOT | OP_0NOTEQUAL => {
                let n = self.pop_num(op)?;
                let result = match op {
                    OP_1ADD => n + 1,
                    OP_1SUB => n - 1,
                    OP_NEGATE => -n,
                    OP_ABS => n.abs(),
                    OP_NOT => (n == 0) as i64,
                    _ => (n != 0) as i64,
                };
                self.stack.push(encode_num(result));
            }
            OP_ADD | OP_SUB | OP_BOOLAND | OP_BOOLOR | OP_NUMEQUAL | OP_NUMEQUALVERIFY | OP_NUMNOTEQUAL
            | OP_LESSTHAN | OP_GREATERTHAN | OP_LESSTHANOREQUAL | OP_GREATERTHANOREQUAL | OP_MIN | OP_MAX => {
                self.require(2, op)?;
                let b = self.pop_num(op)?;
                let a = self.pop_num(op)?;
                let result = match op {
                    OP_ADD => a + b,
                    OP_SUB => a - b,
                    OP_BOOLAND => (a != 0 && b != 0) as i64,
                    OP_BOOLOR => (a != 0 || b != 0) as i64,
                    OP_NUMEQUAL | OP_NUMEQUALVERIFY => (a == b) as i64,
                    OP_NUMNOTEQUAL => (a != b) as i64,
                    OP_LESSTHAN => (a < b) as i64,
                    OP_GREATERTHAN => (a > b) as i64,
                    OP_LESSTHANOREQUAL => (a <= b) as i64,
                    OP_GREATERTHANOREQUAL => (a >= b) as i64,
                    OP_MIN => a.min(b),
                    _ => a.max(b),
                };
                if op == OP_NUMEQUALVERIFY {
                    if result == 0 {
                        return Err(ScriptError::VerifyFailed(op));
                    }
                } else {
                    self.stack.push(encode_num(result));
                }
            }
            OP_WITHIN => {
                self.require(3, op)?;
                let max = self.pop_num(op)?;
                let min = self.pop_num(op)?;
                let x = self.pop_num(op)?;
                self.stack.push(encode_bool(min <= x && x < max));
            }

            // Crypto
            OP_RIPEMD160 | OP_SHA1 | OP_SHA256 | OP_HASH160 | OP_HASH256 => {
                let item = self.pop(op)?;
                let digest = match op {
                    OP_RIPEMD160 => ripemd160(&item).to_vec(),
                    OP_SHA1 => sha1::Hash::hash(&item).into_inner().to_vec(),
                    OP_SHA256 => sha256(&item).to_vec(),
                    OP_HASH160 => hash160(&item).to_vec(),
                    _ => double_sha256(&item).to_vec(),
                };
                self.stack.push(digest);
            }
            OP_CODESEPARATOR => self.code_start = pos + 1,
            OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                self.require(2, op)?;
                let pubkey = self.pop(op)?;
                let signature = self.pop(op)?;
                let script_code = self.script_code(std::slice::from_ref(&signature));
                let valid = self.checker.check_signature(&signature, &pubkey, &script_code);
                if op == OP_CHECKSIGVERIFY {
                    if !valid {
                        return Err(ScriptError::VerifyFailed(op));
                    }
                } else {
                    self.stack.push(encode_bool(valid));
                }
            }
            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => self.check_multisig(op)?,

            // Reserved, VERIF/VERNOTIF and unassigned bytes
            _ => return Err(ScriptError::BadOpcode(op)),
        }
        Ok(())
    }

    /// `<dummy> <sig>... <m> <pubkey>... <n> CHECKMULTISIG`
    ///
    /// Signatures are matched against keys in order; each key is tried once.
    /// The extra dummy element is consumed but never inspected.
    fn check_multisig(&mut self, op: Opcode) -> ScriptResult<()> {
        let mut i = 1;
        self.require(i, op)?;
        let key_count = decode_num(self.peek(i), MAX_SCRIPT_NUM_SIZE)?;
        if key_count < 0 || key_count > MAX_PUBKEYS_PER_MULTISIG as i64 {
            return Err(ScriptError::PubkeyCount);
        }
        let key_count = key_count as usize;
        self.count_ops(key_count)?;
        i += 1;
        let first_key = i;
        i += key_count;

        self.require(i, op)?;
        let sig_count = decode_num(self.peek(i), MAX_SCRIPT_NUM_SIZE)?;
        if sig_count < 0 || sig_count as usize > key_count {
            return Err(ScriptError::SigCount);
        }
        let sig_count = sig_count as usize;
        i += 1;
        let first_sig = i;
        i += sig_count;
        // Depth i is the dummy element
        self.require(i, op)?;

        let pubkeys: Vec<ByteString> = (first_key..first_key + key_count).map(|d| self.peek(d).clone()).collect();
        let signatures: Vec<ByteString> = (first_sig..first_sig + sig_count).map(|d| self.peek(d).clone()).collect();
        let script_code = self.script_code(&signatures);

        let mut success = true;
        let (mut sig_index, mut key_index) = (0, 0);
        while success && sig_index < sig_count {
            if self
                .checker
                .check_signature(&signatures[sig_index], &pubkeys[key_index], &script_code)
            {
                sig_index += 1;
            }
            key_index += 1;
            if sig_count - sig_index > key_count - key_index {
                success = false;
            }
        }

        let len = self.stack.len();
        self.stack.truncate(len - i);

        if op == OP_CHECKMULTISIGVERIFY {
            if !success {
                return Err(ScriptError::VerifyFailed(op));
            }
        } else {
            self.stack.push(encode_bool(success));
        }
        Ok(())
    }
}
