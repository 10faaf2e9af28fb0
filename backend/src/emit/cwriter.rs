//! A small IR for emitted C
//!
//! Emission never splices index arithmetic into strings by hand; it builds
//! [CExpr] values and renders them. Rendering is a pure function of the
//! expression tree, so emitting the same design twice produces identical
//! bytes.
use std::fmt;

/// A C expression
#[derive(Debug, Clone, PartialEq)]
pub enum CExpr {
    /// A literal or an already-rendered fragment
    Lit(String),
    Var(String),
    Index(Box<CExpr>, Box<CExpr>),
    Field(Box<CExpr>, String),
    Arrow(Box<CExpr>, String),
    AddrOf(Box<CExpr>),
    Deref(Box<CExpr>),
    Cast(String, Box<CExpr>),
    Call(String, Vec<CExpr>),
    Binary(String, Box<CExpr>, Box<CExpr>),
    Ternary(Box<CExpr>, Box<CExpr>, Box<CExpr>),
}

pub fn lit(v: impl fmt::Display) -> CExpr {
    CExpr::Lit(v.to_string())
}

pub fn var(name: impl Into<String>) -> CExpr {
    CExpr::Var(name.into())
}

pub fn call(name: impl Into<String>, args: Vec<CExpr>) -> CExpr {
    CExpr::Call(name.into(), args)
}

pub fn cast(ty: impl Into<String>, e: CExpr) -> CExpr {
    CExpr::Cast(ty.into(), Box::new(e))
}

pub fn binop(op: &str, lhs: CExpr, rhs: CExpr) -> CExpr {
    CExpr::Binary(op.to_string(), Box::new(lhs), Box::new(rhs))
}

impl CExpr {
    pub fn index(self, idx: CExpr) -> CExpr {
        CExpr::Index(Box::new(self), Box::new(idx))
    }

    pub fn field(self, name: impl Into<String>) -> CExpr {
        CExpr::Field(Box::new(self), name.into())
    }

    pub fn arrow(self, name: impl Into<String>) -> CExpr {
        CExpr::Arrow(Box::new(self), name.into())
    }

    pub fn addr_of(self) -> CExpr {
        CExpr::AddrOf(Box::new(self))
    }

    pub fn deref(self) -> CExpr {
        CExpr::Deref(Box::new(self))
    }

    /// Applies one index per dimension, innermost last
    pub fn index_all(self, indices: Vec<CExpr>) -> CExpr {
        indices.into_iter().fold(self, |e, i| e.index(i))
    }
}

impl fmt::Display for CExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CExpr::Lit(v) => write!(f, "{v}"),
            CExpr::Var(name) => write!(f, "{name}"),
            CExpr::Index(base, idx) => write!(f, "{base}[{idx}]"),
            CExpr::Field(base, name) => write!(f, "{base}.{name}"),
            CExpr::Arrow(base, name) => write!(f, "{base}->{name}"),
            CExpr::AddrOf(e) => write!(f, "(&{e})"),
            CExpr::Deref(e) => write!(f, "(*{e})"),
            CExpr::Cast(ty, e) => write!(f, "(({ty}) {e})"),
            CExpr::Call(name, args) => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            CExpr::Binary(op, lhs, rhs) => write!(f, "({lhs} {op} {rhs})"),
            CExpr::Ternary(cond, t, e) => write!(f, "({cond} ? {t} : {e})"),
        }
    }
}

/// Statement writer with indentation tracking
#[derive(Debug, Default)]
pub struct CWriter {
    out: String,
    indent: usize,
}

impl CWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, line: impl AsRef<str>) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(line.as_ref());
        self.out.push('\n');
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    pub fn comment(&mut self, text: impl AsRef<str>) {
        self.line(format!("//{}", text.as_ref()));
    }

    /// Writes `header {` and indents
    pub fn open(&mut self, header: impl AsRef<str>) {
        self.line(format!("{} {{", header.as_ref()));
        self.indent += 1;
    }

    /// Opens a bare scope block
    pub fn open_scope(&mut self) {
        self.line("{");
        self.indent += 1;
    }

    pub fn close(&mut self) {
        self.close_with("}");
    }

    /// Closes the current block and opens its `else` branch
    pub fn open_else(&mut self) {
        self.close_with("} else {");
        self.indent += 1;
    }

    /// Dedents and writes a custom closer, e.g. `} while (...);`
    pub fn close_with(&mut self, closer: impl AsRef<str>) {
        self.indent = self.indent.saturating_sub(1);
        self.line(closer);
    }

    /// Appends pre-rendered text without re-indenting
    pub fn raw(&mut self, text: impl AsRef<str>) {
        self.out.push_str(text.as_ref());
        if !text.as_ref().ends_with('\n') {
            self.out.push('\n');
        }
    }

    pub fn finish(self) -> String {
        self.out
    }
}

/// The include-guard macro for a generated header file
pub fn header_guard(file_name: &str) -> String {
    format!("{}_H", file_name.to_uppercase())
}

/// A rendered artifact, written to disk only after the whole set succeeded
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedFile {
    pub name: String,
    pub contents: String,
}

impl GeneratedFile {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expression_rendering() {
        let e = var("buf")
            .index(binop("%", var("i"), lit(8)))
            .field("port0")
            .index(var("k"));
        assert_eq!(e.to_string(), "buf[(i % 8)].port0[k]");

        let c = cast("int32_t*", call("vitis_aligned_alloc", vec![lit(64), lit(256)]));
        assert_eq!(
            c.to_string(),
            "((int32_t*) vitis_aligned_alloc(64, 256))"
        );
    }

    #[test]
    fn writer_indents_blocks() {
        let mut w = CWriter::new();
        w.open("while (!ready)");
        w.line("ready = true;");
        w.close();
        assert_eq!(w.finish(), "while (!ready) {\n    ready = true;\n}\n");
    }

    #[test]
    fn guards() {
        assert_eq!(header_guard("toy_fifoTypes"), "TOY_FIFOTYPES_H");
    }
}
