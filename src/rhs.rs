//! Right-hand side functions.
//!
//! Functions are looked up by name when a production is validated and called
//! with already-evaluated arguments when an action runs. A function returns a
//! symbol when used as a value and may return `None` when called for its
//! side effect.

use std::collections::BTreeMap;

use crate::error::{HekaResult, RhsError};
use crate::symbol::{SymbolId, SymbolTable, SymbolValue};

/// What a running RHS function can see and touch.
pub struct RhsContext<'a> {
    pub symbols: &'a mut SymbolTable,
    /// Lines produced by `write`.
    pub output: &'a mut Vec<String>,
    /// Set by `halt`.
    pub halted: &'a mut bool,
}

pub trait RhsFunction: Send + Sync {
    fn name(&self) -> &str;

    fn call(&self, ctx: &mut RhsContext<'_>, args: &[SymbolId]) -> HekaResult<Option<SymbolId>>;
}

/// Registry of RHS functions by name.
pub struct FunctionRegistry {
    functions: BTreeMap<String, Box<dyn RhsFunction>>,
}

impl FunctionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            functions: BTreeMap::new(),
        }
    }

    /// A registry holding the built-in functions.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for op in [Arith::Add, Arith::Sub, Arith::Mul, Arith::Div, Arith::IntDiv, Arith::Mod] {
            registry.register(op);
        }
        registry.register(Abs);
        registry.register(Concat);
        registry.register(Write);
        registry.register(Halt);
        registry.register(MakeConstantSymbol::default());
        registry
    }

    /// Register a function, replacing any function with the same name.
    pub fn register(&mut self, function: impl RhsFunction + 'static) {
        self.functions
            .insert(function.name().to_string(), Box::new(function));
    }

    pub fn get(&self, name: &str) -> Option<&dyn RhsFunction> {
        self.functions.get(name).map(|f| f.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.functions.keys()).finish()
    }
}

// ---------------------------------------------------------------------------
// Built-ins
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

fn number(function: &str, symbols: &SymbolTable, arg: SymbolId) -> HekaResult<Number> {
    match symbols.value(arg)? {
        SymbolValue::Integer(i) => Ok(Number::Int(*i)),
        SymbolValue::Float(f) => Ok(Number::Float(*f)),
        other => Err(RhsError::NotNumeric {
            function: function.to_string(),
            value: other.to_string(),
        }
        .into()),
    }
}

fn intern_number(symbols: &mut SymbolTable, n: Number) -> HekaResult<SymbolId> {
    match n {
        Number::Int(i) => symbols.intern_int(i),
        Number::Float(f) => symbols.intern_float(f),
    }
}

#[derive(Debug, Clone, Copy)]
enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    IntDiv,
    Mod,
}

impl Arith {
    fn apply(self, name: &str, a: Number, b: Number) -> HekaResult<Number> {
        let overflow = || RhsError::Failed {
            function: name.to_string(),
            message: "integer overflow".into(),
        };
        let zero = || RhsError::DivideByZero {
            function: name.to_string(),
        };
        Ok(match (self, a, b) {
            (Arith::Add, Number::Int(x), Number::Int(y)) => Number::Int(x.checked_add(y).ok_or_else(overflow)?),
            (Arith::Sub, Number::Int(x), Number::Int(y)) => Number::Int(x.checked_sub(y).ok_or_else(overflow)?),
            (Arith::Mul, Number::Int(x), Number::Int(y)) => Number::Int(x.checked_mul(y).ok_or_else(overflow)?),
            (Arith::IntDiv | Arith::Mod, Number::Int(_), Number::Int(0)) => return Err(zero().into()),
            (Arith::IntDiv, Number::Int(x), Number::Int(y)) => Number::Int(x.wrapping_div(y)),
            (Arith::Mod, Number::Int(x), Number::Int(y)) => Number::Int(x.wrapping_rem(y)),
            (Arith::IntDiv | Arith::Mod, _, _) => {
                return Err(RhsError::Failed {
                    function: name.to_string(),
                    message: "integer division needs integer arguments".into(),
                }
                .into());
            }
            (op, x, y) => {
                let (x, y) = (as_float(x), as_float(y));
                match op {
                    Arith::Add => Number::Float(x + y),
                    Arith::Sub => Number::Float(x - y),
                    Arith::Mul => Number::Float(x * y),
                    _ => {
                        if y == 0.0 {
                            return Err(zero().into());
                        }
                        Number::Float(x / y)
                    }
                }
            }
        })
    }
}

fn as_float(n: Number) -> f64 {
    match n {
        Number::Int(i) => i as f64,
        Number::Float(f) => f,
    }
}

impl RhsFunction for Arith {
    fn name(&self) -> &str {
        match self {
            Arith::Add => "+",
            Arith::Sub => "-",
            Arith::Mul => "*",
            Arith::Div => "/",
            Arith::IntDiv => "div",
            Arith::Mod => "mod",
        }
    }

    fn call(&self, ctx: &mut RhsContext<'_>, args: &[SymbolId]) -> HekaResult<Option<SymbolId>> {
        let name = self.name();
        let binary = matches!(self, Arith::IntDiv | Arith::Mod);
        if args.is_empty() || (binary && args.len() != 2) {
            return Err(RhsError::Arity {
                function: name.to_string(),
                expected: if binary { "2".into() } else { "at least 1".into() },
                actual: args.len(),
            }
            .into());
        }
        let mut numbers = args
            .iter()
            .map(|a| number(name, ctx.symbols, *a))
            .collect::<HekaResult<Vec<_>>>()?
            .into_iter();
        let first = numbers.next().unwrap_or(Number::Int(0));
        let result = match (self, args.len()) {
            (Arith::Sub, 1) => self.apply(name, Number::Int(0), first)?,
            (Arith::Div, 1) => self.apply(name, Number::Float(1.0), first)?,
            _ => numbers.try_fold(first, |acc, n| self.apply(name, acc, n))?,
        };
        intern_number(ctx.symbols, result).map(Some)
    }
}

struct Abs;

impl RhsFunction for Abs {
    fn name(&self) -> &str {
        "abs"
    }

    fn call(&self, ctx: &mut RhsContext<'_>, args: &[SymbolId]) -> HekaResult<Option<SymbolId>> {
        let [arg] = args else {
            return Err(RhsError::Arity {
                function: "abs".into(),
                expected: "1".into(),
                actual: args.len(),
            }
            .into());
        };
        let result = match number("abs", ctx.symbols, *arg)? {
            Number::Int(i) => Number::Int(i.checked_abs().ok_or_else(|| RhsError::Failed {
                function: "abs".into(),
                message: "integer overflow".into(),
            })?),
            Number::Float(f) => Number::Float(f.abs()),
        };
        intern_number(ctx.symbols, result).map(Some)
    }
}

/// Concatenate the printed forms of all arguments into a string constant.
struct Concat;

impl RhsFunction for Concat {
    fn name(&self) -> &str {
        "concat"
    }

    fn call(&self, ctx: &mut RhsContext<'_>, args: &[SymbolId]) -> HekaResult<Option<SymbolId>> {
        let text: String = args.iter().map(|a| ctx.symbols.display(*a)).collect();
        ctx.symbols.intern_str(&text).map(Some)
    }
}

struct Write;

impl RhsFunction for Write {
    fn name(&self) -> &str {
        "write"
    }

    fn call(&self, ctx: &mut RhsContext<'_>, args: &[SymbolId]) -> HekaResult<Option<SymbolId>> {
        let line: String = args.iter().map(|a| ctx.symbols.display(*a)).collect();
        tracing::info!(output = %line, "write");
        ctx.output.push(line);
        Ok(None)
    }
}

struct Halt;

impl RhsFunction for Halt {
    fn name(&self) -> &str {
        "halt"
    }

    fn call(&self, ctx: &mut RhsContext<'_>, _args: &[SymbolId]) -> HekaResult<Option<SymbolId>> {
        *ctx.halted = true;
        Ok(None)
    }
}

/// Generate a string constant that does not exist yet, optionally prefixed.
#[derive(Default)]
struct MakeConstantSymbol {
    counter: std::sync::atomic::AtomicU64,
}

impl RhsFunction for MakeConstantSymbol {
    fn name(&self) -> &str {
        "make-constant-symbol"
    }

    fn call(&self, ctx: &mut RhsContext<'_>, args: &[SymbolId]) -> HekaResult<Option<SymbolId>> {
        let prefix: String = match args {
            [] => "constant".into(),
            _ => args.iter().map(|a| ctx.symbols.display(*a)).collect(),
        };
        loop {
            let n = self
                .counter
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
                + 1;
            let candidate = format!("{prefix}{n}");
            if ctx.symbols.find_str(&candidate).is_none() {
                return ctx.symbols.intern_str(&candidate).map(Some);
            }
        }
    }
}
