//! Program model: an entry function plus a flat constant pool.
//!
//! Functions never nest.  A function refers to another one only through a
//! [`Constant::Function`] entry in the pool, so every patchable function is
//! either [`Program::main`] or a pool entry.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CallError;

/// Sparse mapping from instruction position to source-location id.
pub type SourceMap = BTreeMap<usize, usize>;

/// A compiled function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub instructions: Vec<u8>,
    #[serde(default)]
    pub source_map: SourceMap,
    #[serde(default)]
    pub num_params: usize,
    #[serde(default)]
    pub num_locals: usize,
    #[serde(default)]
    pub variadic: bool,
}

impl Function {
    pub fn new(instructions: Vec<u8>) -> Self {
        Self {
            instructions,
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_source_map(mut self, source_map: SourceMap) -> Self {
        self.source_map = source_map;
        self
    }

    pub fn with_locals(mut self, num_params: usize, num_locals: usize) -> Self {
        self.num_params = num_params;
        self.num_locals = num_locals;
        self
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "<anonymous>"
        } else {
            &self.name
        }
    }
}

/// A host-provided callable value living in the constant pool.
pub trait Callable: fmt::Debug + Send + Sync {
    /// Name reported to the executing program (also its type name).
    fn name(&self) -> &str;

    /// Invoke the callable.
    fn call(&self, args: &[Constant]) -> Result<Constant, CallError>;
}

/// A constant-pool entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Constant {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Function(Function),
    /// Host callables are runtime-only and cannot be serialized.
    #[serde(skip)]
    Callable(Arc<dyn Callable>),
}

impl Constant {
    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Self::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_callable(&self) -> Option<&Arc<dyn Callable>> {
        match self {
            Self::Callable(c) => Some(c),
            _ => None,
        }
    }

    /// Truthiness as seen by conditional jumps.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::Function(_) | Self::Callable(_) => true,
        }
    }
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Function(a), Self::Function(b)) => a == b,
            (Self::Callable(a), Self::Callable(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<Function> for Constant {
    fn from(f: Function) -> Self {
        Self::Function(f)
    }
}

/// The top-level patchable unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub main: Function,
    #[serde(default)]
    pub constants: Vec<Constant>,
}

impl Program {
    pub fn new(main: Function) -> Self {
        Self {
            main,
            constants: Vec::new(),
        }
    }

    /// Append a constant and return its pool index.
    pub fn push_constant(&mut self, constant: impl Into<Constant>) -> usize {
        self.constants.push(constant.into());
        self.constants.len() - 1
    }

    /// Entry function followed by pool functions, in pool order.
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        std::iter::once(&self.main).chain(self.constants.iter().filter_map(Constant::as_function))
    }

    /// Mutable variant of [`functions`](Self::functions).
    pub fn functions_mut(&mut self) -> impl Iterator<Item = &mut Function> {
        std::iter::once(&mut self.main).chain(self.constants.iter_mut().filter_map(|c| match c {
            Constant::Function(f) => Some(f),
            _ => None,
        }))
    }

    /// Hex SHA-256 over every function's instructions, source map and
    /// arity metadata, in [`functions`](Self::functions) order.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for function in self.functions() {
            hasher.update((function.instructions.len() as u64).to_be_bytes());
            hasher.update(&function.instructions);
            hasher.update((function.source_map.len() as u64).to_be_bytes());
            for (pos, id) in &function.source_map {
                hasher.update((*pos as u64).to_be_bytes());
                hasher.update((*id as u64).to_be_bytes());
            }
            hasher.update((function.num_params as u64).to_be_bytes());
            hasher.update((function.num_locals as u64).to_be_bytes());
            hasher.update([function.variadic as u8]);
        }
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    /// Serialize to JSON.  Fails when the pool holds host callables.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(data: &str) -> serde_json::Result<Self> {
        serde_json::from_str(data)
    }
}
