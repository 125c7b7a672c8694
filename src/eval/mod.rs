//! The expression language used for sizes, conditions, choice selection and
//! derived fields (spec §4.2).

mod ast;
mod lexer;
mod parser;

use std::collections::BTreeMap;

use chrono::Local;

use crate::error::{Error, ExprError, Result};
use crate::value::Value;

use ast::{BinOp, Expr, UnaryOp};

/// The pair of mappings an expression is evaluated against: `root` (the
/// user-supplied, process-wide context) and `self` (the partial record,
/// already projected to a name → value map by the caller).
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    pub root: &'a BTreeMap<String, Value>,
    pub self_map: &'a BTreeMap<String, Value>,
}

impl<'a> Context<'a> {
    pub fn new(root: &'a BTreeMap<String, Value>, self_map: &'a BTreeMap<String, Value>) -> Self {
        Self { root, self_map }
    }
}

/// Parses and evaluates `expr` against `ctx`, returning a [`Value`].
pub fn evaluate(expr: &str, ctx: Context<'_>) -> Result<Value> {
    let ast = parser::parse(expr)?;
    eval_expr(&ast, ctx).map_err(Error::from)
}

/// Convenience wrapper for expressions that must evaluate to a non-negative
/// integer (array/field sizes).
pub fn evaluate_size(expr: &str, ctx: Context<'_>) -> Result<u64> {
    let value = evaluate(expr, ctx)?;
    let n = value
        .as_i128()
        .ok_or_else(|| ExprError::Type(format!("expected an integer size, got {value}")))?;
    if n < 0 {
        return Err(ExprError::Type(format!("size expression evaluated to a negative value: {n}")).into());
    }
    Ok(n as u64)
}

/// Collects every `#self.<ident>`/bare `<ident>` name an expression
/// references, used by the template compiler to check that `Object`
/// alternatives gated by a numeric prefix don't sneak in a dependency on
/// another field (spec §4.3 step 2c).
pub(crate) fn referenced_self_fields(expr: &str) -> std::result::Result<Vec<String>, ExprError> {
    let ast = parser::parse(expr)?;
    let mut names = Vec::new();
    collect_self_fields(&ast, &mut names);
    Ok(names)
}

fn collect_self_fields(expr: &Expr, out: &mut Vec<String>) {
    match expr {
        Expr::SelfField(name) | Expr::BareIdent(name) => out.push(name.clone()),
        Expr::Unary(_, inner) => collect_self_fields(inner, out),
        Expr::Binary(_, lhs, rhs) => {
            collect_self_fields(lhs, out);
            collect_self_fields(rhs, out);
        }
        Expr::Ternary(a, b, c) => {
            collect_self_fields(a, out);
            collect_self_fields(b, out);
            collect_self_fields(c, out);
        }
        Expr::HostStatic { args, .. } => {
            for arg in args {
                collect_self_fields(arg, out);
            }
        }
        _ => {}
    }
}

/// Convenience wrapper for boolean conditions. An empty/blank expression is
/// "no condition" and always passes (spec §4.2).
pub fn evaluate_boolean(expr: &str, ctx: Context<'_>) -> Result<bool> {
    if expr.trim().is_empty() {
        return Ok(true);
    }
    let value = evaluate(expr, ctx)?;
    value
        .as_bool()
        .ok_or_else(|| ExprError::Type(format!("expected a boolean, got {value}")).into())
}

fn eval_expr(expr: &Expr, ctx: Context<'_>) -> std::result::Result<Value, ExprError> {
    match expr {
        Expr::IntLit(v) => Ok((*v).into()),
        Expr::FloatLit(v) => Ok(Value::Float(*v)),
        Expr::StrLit(s) => Ok(Value::Text(s.clone())),
        Expr::CharLit(c) => Ok(Value::Integer(*c as i64)),
        Expr::BoolLit(b) => Ok(Value::Bool(*b)),
        Expr::Null => Ok(Value::Null),
        Expr::SelfField(name) => ctx
            .self_map
            .get(name)
            .cloned()
            .ok_or_else(|| ExprError::UnresolvedIdentifier(format!("#self.{name}"))),
        Expr::RootRef(key) => ctx
            .root
            .get(key)
            .cloned()
            .ok_or_else(|| ExprError::UnresolvedIdentifier(format!("#{key}"))),
        Expr::BareIdent(name) => ctx
            .self_map
            .get(name)
            .or_else(|| ctx.root.get(name))
            .cloned()
            .ok_or_else(|| ExprError::UnresolvedIdentifier(name.clone())),
        Expr::HostStatic { type_name, member, args } => eval_host_static(type_name, member, args, ctx),
        Expr::Unary(op, inner) => eval_unary(*op, eval_expr(inner, ctx)?),
        Expr::Binary(op, lhs, rhs) => eval_binary(*op, eval_expr(lhs, ctx)?, eval_expr(rhs, ctx)?),
        Expr::Ternary(cond, then_branch, else_branch) => {
            let cond = eval_expr(cond, ctx)?;
            let cond = cond
                .as_bool()
                .ok_or_else(|| ExprError::Type(format!("ternary condition is not boolean: {cond}")))?;
            if cond {
                eval_expr(then_branch, ctx)
            } else {
                eval_expr(else_branch, ctx)
            }
        }
    }
}

/// The single permitted host call (spec §4.2): `T(ZonedDateTime).now()`.
/// Every other type-qualified static reference is rejected.
fn eval_host_static(
    type_name: &str,
    member: &str,
    args: &[Expr],
    _ctx: Context<'_>,
) -> std::result::Result<Value, ExprError> {
    if type_name == "ZonedDateTime" && member == "now" && args.is_empty() {
        let now = Local::now();
        return Ok(Value::Text(now.to_rfc3339()));
    }
    Err(ExprError::UnsupportedHostCall(format!("{type_name}.{member}")))
}

fn eval_unary(op: UnaryOp, v: Value) -> std::result::Result<Value, ExprError> {
    match op {
        UnaryOp::Neg => match v {
            Value::Integer(i) => Ok(Value::Integer(-i)),
            Value::Integer128(i) => Ok(Value::Integer128(-i)),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(ExprError::Type(format!("cannot negate {other}"))),
        },
        UnaryOp::Not => {
            let b = v.as_bool().ok_or_else(|| ExprError::Type(format!("cannot negate non-boolean {v}")))?;
            Ok(Value::Bool(!b))
        }
    }
}

fn eval_binary(op: BinOp, lhs: Value, rhs: Value) -> std::result::Result<Value, ExprError> {
    use BinOp::*;
    match op {
        And => {
            let l = lhs.as_bool().ok_or_else(|| ExprError::Type(format!("not boolean: {lhs}")))?;
            let r = rhs.as_bool().ok_or_else(|| ExprError::Type(format!("not boolean: {rhs}")))?;
            Ok(Value::Bool(l && r))
        }
        Or => {
            let l = lhs.as_bool().ok_or_else(|| ExprError::Type(format!("not boolean: {lhs}")))?;
            let r = rhs.as_bool().ok_or_else(|| ExprError::Type(format!("not boolean: {rhs}")))?;
            Ok(Value::Bool(l || r))
        }
        Eq => Ok(Value::Bool(values_equal(&lhs, &rhs))),
        Ne => Ok(Value::Bool(!values_equal(&lhs, &rhs))),
        Lt | Le | Gt | Ge => eval_comparison(op, &lhs, &rhs),
        Add | Sub | Mul | Div | Rem => eval_arithmetic(op, lhs, rhs),
    }
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Text(a), Value::Text(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Null, Value::Null) => true,
        _ => match (lhs.as_i128(), rhs.as_i128()) {
            (Some(a), Some(b)) => a == b,
            _ => lhs.as_f64().zip(rhs.as_f64()).is_some_and(|(a, b)| a == b),
        },
    }
}

fn eval_comparison(op: BinOp, lhs: &Value, rhs: &Value) -> std::result::Result<Value, ExprError> {
    if let (Value::Text(a), Value::Text(b)) = (lhs, rhs) {
        let ord = a.cmp(b);
        return Ok(Value::Bool(match op {
            BinOp::Lt => ord.is_lt(),
            BinOp::Le => ord.is_le(),
            BinOp::Gt => ord.is_gt(),
            BinOp::Ge => ord.is_ge(),
            _ => unreachable!(),
        }));
    }
    let a = lhs
        .as_f64()
        .ok_or_else(|| ExprError::Type(format!("cannot compare non-numeric value {lhs}")))?;
    let b = rhs
        .as_f64()
        .ok_or_else(|| ExprError::Type(format!("cannot compare non-numeric value {rhs}")))?;
    Ok(Value::Bool(match op {
        BinOp::Lt => a < b,
        BinOp::Le => a <= b,
        BinOp::Gt => a > b,
        BinOp::Ge => a >= b,
        _ => unreachable!(),
    }))
}

fn eval_arithmetic(op: BinOp, lhs: Value, rhs: Value) -> std::result::Result<Value, ExprError> {
    if let (Some(a), Some(b)) = (lhs.as_i128(), rhs.as_i128()) {
        if matches!(op, BinOp::Div | BinOp::Rem) && b == 0 {
            return Err(ExprError::Type("division by zero".to_string()));
        }
        let result = match op {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => a / b,
            BinOp::Rem => a % b,
            _ => unreachable!(),
        };
        return Ok(result.into());
    }
    let a = lhs
        .as_f64()
        .ok_or_else(|| ExprError::Type(format!("cannot apply arithmetic to {lhs}")))?;
    let b = rhs
        .as_f64()
        .ok_or_else(|| ExprError::Type(format!("cannot apply arithmetic to {rhs}")))?;
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::Rem => a % b,
        _ => unreachable!(),
    };
    Ok(Value::Float(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(root: &'a BTreeMap<String, Value>, self_map: &'a BTreeMap<String, Value>) -> Context<'a> {
        Context::new(root, self_map)
    }

    #[test]
    fn empty_condition_is_always_true() {
        let root = BTreeMap::new();
        let self_map = BTreeMap::new();
        assert!(evaluate_boolean("", ctx(&root, &self_map)).unwrap());
        assert!(evaluate_boolean("   ", ctx(&root, &self_map)).unwrap());
    }

    #[test]
    fn resolves_self_then_root_for_bare_identifier() {
        let mut root = BTreeMap::new();
        root.insert("deviceId".to_string(), Value::Integer(7));
        let mut self_map = BTreeMap::new();
        self_map.insert("count".to_string(), Value::Integer(3));

        let v = evaluate("count", ctx(&root, &self_map)).unwrap();
        assert_eq!(v, Value::Integer(3));
        let v = evaluate("deviceId", ctx(&root, &self_map)).unwrap();
        assert_eq!(v, Value::Integer(7));
    }

    #[test]
    fn ternary_and_comparison() {
        let root = BTreeMap::new();
        let mut self_map = BTreeMap::new();
        self_map.insert("satellitesCount".to_string(), Value::Integer(0));
        let v = evaluate("#self.satellitesCount > 0 ? 1 : 0", ctx(&root, &self_map)).unwrap();
        assert_eq!(v, Value::Integer(0));
    }

    #[test]
    fn size_expression_rejects_negative() {
        let root = BTreeMap::new();
        let self_map = BTreeMap::new();
        assert!(evaluate_size("0 - 1", ctx(&root, &self_map)).is_err());
    }

    #[test]
    fn unresolved_identifier_bubbles_up() {
        let root = BTreeMap::new();
        let self_map = BTreeMap::new();
        let err = evaluate("#self.missing", ctx(&root, &self_map)).unwrap_err();
        assert!(matches!(err, Error::ExprError(ExprError::UnresolvedIdentifier(_))));
    }
}
