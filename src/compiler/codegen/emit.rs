//! Instruction stream for the JVM target.
//!
//! Instructions are typed values rendered to Jasmin syntax only at the end,
//! so the stream can be inspected (stack simulation, label linkage) before
//! it becomes text.

use crate::compiler::types::SemType;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════
//  Labels
// ═══════════════════════════════════════════════════════════════

/// Symbolic jump target, resolved to an offset by the assembler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label(String);

impl Label {
    pub fn numbered(prefix: &str, id: u32) -> Self {
        Label(format!("{}{}", prefix, id))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hands out label group numbers. Every label minted from one group shares
/// the number and differs by prefix (`THEN3`, `ELSE3`, `END3`).
#[derive(Debug, Default, Clone)]
pub struct LabelAllocator {
    next: u32,
}

impl LabelAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        tracing::trace!(id, "allocated label group");
        id
    }

    pub fn allocated(&self) -> u32 {
        self.next
    }
}

// ═══════════════════════════════════════════════════════════════
//  Instructions
// ═══════════════════════════════════════════════════════════════

/// Condition suffix shared by `if<cond>` and `if_icmp<cond>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl Comparison {
    pub fn negate(self) -> Comparison {
        match self {
            Comparison::Eq => Comparison::Ne,
            Comparison::Ne => Comparison::Eq,
            Comparison::Lt => Comparison::Ge,
            Comparison::Ge => Comparison::Lt,
            Comparison::Gt => Comparison::Le,
            Comparison::Le => Comparison::Gt,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Comparison::Eq => "eq",
            Comparison::Ne => "ne",
            Comparison::Lt => "lt",
            Comparison::Ge => "ge",
            Comparison::Gt => "gt",
            Comparison::Le => "le",
        }
    }
}

/// `class/name descriptor` of a method call.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodRef {
    pub class: &'static str,
    pub name: &'static str,
    pub descriptor: String,
}

impl MethodRef {
    pub fn new(class: &'static str, name: &'static str, descriptor: impl Into<String>) -> Self {
        Self {
            class,
            name,
            descriptor: descriptor.into(),
        }
    }

    /// Operand-stack words taken by the arguments (receiver excluded).
    pub fn arg_words(&self) -> i32 {
        let params = self
            .descriptor
            .strip_prefix('(')
            .and_then(|rest| rest.split(')').next())
            .unwrap_or("");
        let mut words = 0;
        let mut chars = params.chars();
        while let Some(c) = chars.next() {
            match c {
                'J' | 'D' => words += 2,
                'L' => {
                    for c in chars.by_ref() {
                        if c == ';' {
                            break;
                        }
                    }
                    words += 1;
                }
                '[' => {
                    // array of anything is one reference
                    let mut elem = chars.next();
                    while elem == Some('[') {
                        elem = chars.next();
                    }
                    if elem == Some('L') {
                        for c in chars.by_ref() {
                            if c == ';' {
                                break;
                            }
                        }
                    }
                    words += 1;
                }
                _ => words += 1,
            }
        }
        words
    }

    /// Operand-stack words pushed by the return value.
    pub fn return_words(&self) -> i32 {
        match self.descriptor.rsplit(')').next() {
            Some("V") | None => 0,
            Some("J") | Some("D") => 2,
            Some(_) => 1,
        }
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}{}", self.class, self.name, self.descriptor)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    LdcFloat(f64),
    LdcString(String),
    /// `iconst_<n>`, only ever 0 or 1 here.
    IConst(u8),
    Load(SemType, u16),
    Store(SemType, u16),
    /// `aload`/`astore` of a runtime object that is not a dam value.
    LoadRef(u16),
    StoreRef(u16),
    FAdd,
    FSub,
    FMul,
    FDiv,
    FNeg,
    IXor,
    FCmpl,
    FCmpg,
    If(Comparison, Label),
    IfICmp(Comparison, Label),
    Goto(Label),
    Dup,
    Pop,
    New(&'static str),
    GetStatic {
        field: &'static str,
        descriptor: &'static str,
    },
    InvokeVirtual(MethodRef),
    InvokeSpecial(MethodRef),
}

impl Instruction {
    /// Net change in operand-stack depth, in words.
    pub fn stack_effect(&self) -> i32 {
        match self {
            Instruction::LdcFloat(_)
            | Instruction::LdcString(_)
            | Instruction::IConst(_)
            | Instruction::Load(..)
            | Instruction::LoadRef(_)
            | Instruction::Dup
            | Instruction::New(_)
            | Instruction::GetStatic { .. } => 1,
            Instruction::Store(..)
            | Instruction::StoreRef(_)
            | Instruction::Pop
            | Instruction::FAdd
            | Instruction::FSub
            | Instruction::FMul
            | Instruction::FDiv
            | Instruction::IXor
            | Instruction::FCmpl
            | Instruction::FCmpg
            | Instruction::If(..) => -1,
            Instruction::IfICmp(..) => -2,
            Instruction::FNeg | Instruction::Goto(_) => 0,
            Instruction::InvokeVirtual(m) | Instruction::InvokeSpecial(m) => {
                m.return_words() - m.arg_words() - 1
            }
        }
    }

    pub fn branch_target(&self) -> Option<&Label> {
        match self {
            Instruction::If(_, label) | Instruction::IfICmp(_, label) | Instruction::Goto(label) => {
                Some(label)
            }
            _ => None,
        }
    }

    /// Control never falls through to the next item.
    pub fn ends_flow(&self) -> bool {
        matches!(self, Instruction::Goto(_))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::LdcFloat(v) => write!(f, "ldc {}", float_operand(*v)),
            Instruction::LdcString(s) => write!(f, "ldc \"{}\"", escape_string(s)),
            Instruction::IConst(n) => write!(f, "iconst_{}", n),
            Instruction::Load(ty, slot) => write!(f, "{}load {}", ty.opcode_prefix(), slot),
            Instruction::Store(ty, slot) => write!(f, "{}store {}", ty.opcode_prefix(), slot),
            Instruction::LoadRef(slot) => write!(f, "aload {}", slot),
            Instruction::StoreRef(slot) => write!(f, "astore {}", slot),
            Instruction::FAdd => write!(f, "fadd"),
            Instruction::FSub => write!(f, "fsub"),
            Instruction::FMul => write!(f, "fmul"),
            Instruction::FDiv => write!(f, "fdiv"),
            Instruction::FNeg => write!(f, "fneg"),
            Instruction::IXor => write!(f, "ixor"),
            Instruction::FCmpl => write!(f, "fcmpl"),
            Instruction::FCmpg => write!(f, "fcmpg"),
            Instruction::If(cmp, label) => write!(f, "if{} {}", cmp.suffix(), label),
            Instruction::IfICmp(cmp, label) => write!(f, "if_icmp{} {}", cmp.suffix(), label),
            Instruction::Goto(label) => write!(f, "goto {}", label),
            Instruction::Dup => write!(f, "dup"),
            Instruction::Pop => write!(f, "pop"),
            Instruction::New(class) => write!(f, "new {}", class),
            Instruction::GetStatic { field, descriptor } => {
                write!(f, "getstatic {} {}", field, descriptor)
            }
            Instruction::InvokeVirtual(m) => write!(f, "invokevirtual {}", m),
            Instruction::InvokeSpecial(m) => write!(f, "invokespecial {}", m),
        }
    }
}

/// Float constant text the assembler reads as a `float`, never as an int.
fn float_operand(v: f64) -> String {
    let text = v.to_string();
    if text.contains('.') {
        text
    } else {
        format!("{}.0", text)
    }
}

/// Quote-safe string constant: printable ASCII verbatim, everything else
/// as an escape the assembler understands.
fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            ' '..='~' => out.push(c),
            _ => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{:04x}", unit));
                }
            }
        }
    }
    out
}

// ═══════════════════════════════════════════════════════════════
//  Stream
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Label(Label),
    Op(Instruction),
}

impl Item {
    pub fn as_op(&self) -> Option<&Instruction> {
        match self {
            Item::Op(ins) => Some(ins),
            Item::Label(_) => None,
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Label(label) => write!(f, "{}:", label),
            Item::Op(ins) => write!(f, "{}", ins),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("label '{0}' is referenced but never defined")]
    Undefined(String),
    #[error("label '{0}' is defined more than once")]
    Duplicate(String),
    #[error("operand stack underflow at instruction {index} ({instruction})")]
    Underflow { index: usize, instruction: String },
    #[error("label '{label}' is reached with stack depths {first} and {second}")]
    InconsistentDepth {
        label: String,
        first: i32,
        second: i32,
    },
    #[error("operand stack depth {0} exceeds the JVM limit")]
    StackTooDeep(i32),
}

/// Finished stream plus the frame limits the assembler needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Assembly {
    pub items: Vec<Item>,
    pub max_stack: u16,
    pub max_locals: u16,
}

impl Assembly {
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> + '_ {
        self.items.iter().filter_map(Item::as_op)
    }
}

/// Append-only instruction and label stream.
#[derive(Debug, Default, Clone)]
pub struct Emitter {
    items: Vec<Item>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, ins: Instruction) {
        self.items.push(Item::Op(ins));
    }

    pub fn place(&mut self, label: Label) {
        self.items.push(Item::Label(label));
    }

    /// Put `prologue` ahead of everything emitted so far.
    pub fn prepend(&mut self, prologue: impl IntoIterator<Item = Instruction>) {
        let mut items: Vec<Item> = prologue.into_iter().map(Item::Op).collect();
        items.append(&mut self.items);
        self.items = items;
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    /// Every referenced label must be defined exactly once.
    pub fn check_labels(&self) -> Result<(), LinkError> {
        let mut defined: HashMap<&str, usize> = HashMap::new();
        for item in &self.items {
            if let Item::Label(label) = item {
                let count = defined.entry(label.name()).or_insert(0);
                *count += 1;
                if *count > 1 {
                    return Err(LinkError::Duplicate(label.name().to_string()));
                }
            }
        }
        for ins in self.items.iter().filter_map(Item::as_op) {
            if let Some(target) = ins.branch_target() {
                if !defined.contains_key(target.name()) {
                    return Err(LinkError::Undefined(target.name().to_string()));
                }
            }
        }
        Ok(())
    }

    /// Exact maximum operand-stack depth, by walking the stream once.
    ///
    /// The depth on entry to a label is the fall-through depth, or the
    /// depth recorded by branches that target it when nothing falls
    /// through (the item before it was a `goto`). All paths into a label
    /// must agree.
    pub fn max_stack_depth(&self) -> Result<u16, LinkError> {
        let mut at_label: HashMap<&str, i32> = HashMap::new();
        let mut depth: Option<i32> = Some(0);
        let mut max = 0;

        for (index, item) in self.items.iter().enumerate() {
            match item {
                Item::Label(label) => {
                    let incoming = at_label.get(label.name()).copied();
                    depth = match (depth, incoming) {
                        (Some(fall), Some(jump)) if fall != jump => {
                            return Err(LinkError::InconsistentDepth {
                                label: label.name().to_string(),
                                first: jump,
                                second: fall,
                            });
                        }
                        (fall, jump) => fall.or(jump),
                    };
                    if let Some(d) = depth {
                        at_label.insert(label.name(), d);
                    }
                }
                Item::Op(ins) => {
                    // Unreachable code starts from an empty stack.
                    let after = depth.unwrap_or(0) + ins.stack_effect();
                    if after < 0 {
                        return Err(LinkError::Underflow {
                            index,
                            instruction: ins.to_string(),
                        });
                    }
                    max = max.max(after);

                    if let Some(target) = ins.branch_target() {
                        match at_label.get(target.name()) {
                            Some(&recorded) if recorded != after => {
                                return Err(LinkError::InconsistentDepth {
                                    label: target.name().to_string(),
                                    first: recorded,
                                    second: after,
                                });
                            }
                            _ => {
                                at_label.insert(target.name(), after);
                            }
                        }
                    }

                    depth = if ins.ends_flow() { None } else { Some(after) };
                }
            }
        }

        u16::try_from(max).map_err(|_| LinkError::StackTooDeep(max))
    }

    /// Verify linkage, size the frame, and hand the stream over.
    pub fn finish(self, max_locals: u16) -> Result<Assembly, LinkError> {
        self.check_labels()?;
        let max_stack = self.max_stack_depth()?;
        tracing::debug!(
            items = self.items.len(),
            max_stack,
            max_locals,
            "sized main frame"
        );
        Ok(Assembly {
            items: self.items,
            max_stack,
            max_locals,
        })
    }
}
