//! Expression tree -> formula text (without a leading `=`).

use std::fmt::Write as _;

use biff_model::{col_to_name, ErrorValue};

use crate::expr::{ArrayItem, Callee, Expr, RefAddr};
use crate::ptg::UnaryOp;

/// Workbook lookups needed to render names and cross-sheet references.
pub trait FormulaContext {
    /// Sheet prefix for an EXTERNSHEET index, including the trailing `!`
    /// (e.g. `Sheet2!`, `'My Sheet'!`, `[Book.xls]Data!`).
    fn sheet_prefix(&self, ixti: u16) -> Option<String>;

    /// Name of a defined name by its 1-based index.
    fn defined_name(&self, index: u32) -> Option<String>;

    /// Name of an external (SUPBOOK-scoped) name, `index` 1-based.
    fn external_name(&self, ixti: u16, index: u32) -> Option<String>;
}

/// Context for formulas decoded without any workbook tables.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyContext;

impl FormulaContext for EmptyContext {
    fn sheet_prefix(&self, _ixti: u16) -> Option<String> {
        None
    }

    fn defined_name(&self, _index: u32) -> Option<String> {
        None
    }

    fn external_name(&self, _ixti: u16, _index: u32) -> Option<String> {
        None
    }
}

/// Build a sheet prefix like `Sheet1!`, `Sheet1:Sheet3!` or `'[Book 1.xls]Data'!`, quoting
/// when any component needs it.
pub fn format_sheet_prefix(workbook: Option<&str>, first: &str, last: Option<&str>) -> String {
    let mut body = String::new();
    if let Some(book) = workbook {
        body.push('[');
        body.push_str(book);
        body.push(']');
    }
    body.push_str(first);
    if let Some(last) = last.filter(|last| *last != first) {
        body.push(':');
        body.push_str(last);
    }

    let needs_quotes = workbook.is_some_and(needs_quoting)
        || needs_quoting(first)
        || last.is_some_and(needs_quoting);
    if needs_quotes {
        format!("'{}'!", body.replace('\'', "''"))
    } else {
        format!("{body}!")
    }
}

fn needs_quoting(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        None => true,
        Some(c) if c.is_ascii_digit() => true,
        Some(_) => !name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.'),
    }
}

pub fn render(expr: &Expr, ctx: &dyn FormulaContext) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr, ctx);
    out
}

fn write_expr(out: &mut String, expr: &Expr, ctx: &dyn FormulaContext) {
    match expr {
        Expr::Number(n) => out.push_str(&format_number(*n)),
        Expr::Text(s) => write_quoted(out, s),
        Expr::Bool(b) => out.push_str(if *b { "TRUE" } else { "FALSE" }),
        Expr::Error(e) => out.push_str(&e.to_string()),
        Expr::Missing => {}
        Expr::Array(rows) => {
            out.push('{');
            for (r, row) in rows.iter().enumerate() {
                if r > 0 {
                    out.push(';');
                }
                for (c, item) in row.iter().enumerate() {
                    if c > 0 {
                        out.push(',');
                    }
                    write_array_item(out, item);
                }
            }
            out.push('}');
        }
        Expr::Cell { sheet, addr } => {
            let target = match addr {
                Some(addr) if addr.in_bounds() => Some(addr_text(*addr)),
                _ => None,
            };
            write_reference(out, *sheet, target, ctx);
        }
        Expr::Area { sheet, corners } => {
            let target = match corners {
                Some((a, b)) if a.in_bounds() && b.in_bounds() => {
                    Some(format!("{}:{}", addr_text(*a), addr_text(*b)))
                }
                _ => None,
            };
            write_reference(out, *sheet, target, ctx);
        }
        Expr::Name(index) => match ctx.defined_name(*index) {
            Some(name) => out.push_str(&name),
            None => {
                let _ = write!(out, "Name_{index}");
            }
        },
        Expr::ExternName { ixti, index } => match ctx.external_name(*ixti, *index) {
            Some(name) => out.push_str(&name),
            None => {
                let _ = write!(out, "ExternName_IXTI{ixti}_N{index}");
            }
        },
        Expr::Unary(op, operand) => match op {
            UnaryOp::Plus => {
                out.push('+');
                write_expr(out, operand, ctx);
            }
            UnaryOp::Minus => {
                out.push('-');
                write_expr(out, operand, ctx);
            }
            UnaryOp::Percent => {
                write_expr(out, operand, ctx);
                out.push('%');
            }
        },
        Expr::Binary(op, lhs, rhs) => {
            write_expr(out, lhs, ctx);
            out.push_str(op.symbol());
            write_expr(out, rhs, ctx);
        }
        Expr::Paren(inner) => {
            out.push('(');
            write_expr(out, inner, ctx);
            out.push(')');
        }
        Expr::Function { callee, args } => {
            match callee {
                Callee::Builtin(name) => out.push_str(name),
                Callee::UserDefined(name) => write_expr(out, name, ctx),
            }
            out.push('(');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_expr(out, arg, ctx);
            }
            out.push(')');
        }
    }
}

/// A 3-D reference whose sheet can't be resolved collapses to `#REF!` as a whole.
fn write_reference(
    out: &mut String,
    sheet: Option<u16>,
    target: Option<String>,
    ctx: &dyn FormulaContext,
) {
    let prefix = match sheet {
        None => Some(String::new()),
        Some(ixti) => ctx.sheet_prefix(ixti),
    };
    match (prefix, target) {
        (Some(prefix), Some(target)) => {
            out.push_str(&prefix);
            out.push_str(&target);
        }
        (Some(prefix), None) => {
            out.push_str(&prefix);
            out.push_str(&ErrorValue::Ref.to_string());
        }
        (None, _) => out.push_str(&ErrorValue::Ref.to_string()),
    }
}

fn addr_text(addr: RefAddr) -> String {
    let mut s = String::new();
    if addr.col_abs {
        s.push('$');
    }
    // `in_bounds` guarantees both coordinates fit in u32.
    s.push_str(&col_to_name(addr.col as u32));
    if addr.row_abs {
        s.push('$');
    }
    let _ = write!(s, "{}", addr.row + 1);
    s
}

fn write_array_item(out: &mut String, item: &ArrayItem) {
    match item {
        ArrayItem::Empty => {}
        ArrayItem::Number(n) => out.push_str(&format_number(*n)),
        ArrayItem::Text(s) => write_quoted(out, s),
        ArrayItem::Bool(b) => out.push_str(if *b { "TRUE" } else { "FALSE" }),
        ArrayItem::Error(e) => out.push_str(&e.to_string()),
    }
}

fn write_quoted(out: &mut String, s: &str) {
    out.push('"');
    out.push_str(&s.replace('"', "\"\""));
    out.push('"');
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
