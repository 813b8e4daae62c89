//! CalcExecutor — a small reference interpreter for the executor seam.
//!
//! Not a real language: just enough surface to exercise the engine and to
//! give embedders a working executor to start from. Supported statements
//! (separated by `;` or newlines):
//!
//! - `name = expr` — bind a variable (no return value)
//! - `expr` — evaluate; the last expression's value is the fragment result
//! - `import name` — reference a module, checked against the manifest
//! - `sleep ms` — cancellable delay
//! - `loop` — run until cancelled
//!
//! Expressions are int/float/string literals, variable references, and
//! left-associative `+ - * /` with no precedence.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use hako_types::{Binding, ExecError, ExecResult, Value};

use super::{CodeExecutor, Evaluation};
use crate::context::ExecContext;
use crate::manifest::CapabilityManifest;

/// The built-in reference executor.
#[derive(Debug, Default)]
pub struct CalcExecutor;

impl CalcExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CodeExecutor for CalcExecutor {
    async fn execute(
        &self,
        fragment: &str,
        prior: Option<Arc<ExecContext>>,
        manifest: &CapabilityManifest,
        cancel: CancellationToken,
    ) -> Evaluation {
        let mut ctx = prior
            .as_deref()
            .cloned()
            .unwrap_or_else(ExecContext::empty);
        let mut last = None;

        for stmt in fragment
            .split(|c| c == ';' || c == '\n')
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            if cancel.is_cancelled() {
                return Evaluation::failed(prior, ExecResult::failure(ExecError::Cancelled));
            }
            match run_stmt(stmt, &mut ctx, manifest, &cancel).await {
                Ok(value) => last = value,
                Err(e) => return Evaluation::failed(prior, ExecResult::failure(e)),
            }
        }

        let result = match last {
            Some(value) => ExecResult::success(value),
            None => ExecResult::unit(),
        };
        Evaluation {
            context: Arc::new(ctx),
            result,
        }
    }
}

async fn run_stmt(
    stmt: &str,
    ctx: &mut ExecContext,
    manifest: &CapabilityManifest,
    cancel: &CancellationToken,
) -> Result<Option<Value>, ExecError> {
    if stmt == "loop" {
        cancel.cancelled().await;
        return Err(ExecError::Cancelled);
    }

    if let Some(rest) = stmt.strip_prefix("sleep ") {
        let ms: u64 = rest
            .trim()
            .parse()
            .map_err(|_| ExecError::Compile(format!("invalid sleep duration `{}`", rest.trim())))?;
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(ms)) => return Ok(None),
            _ = cancel.cancelled() => return Err(ExecError::Cancelled),
        }
    }

    if let Some(rest) = stmt.strip_prefix("import ") {
        let module = rest.trim();
        if manifest.allows(module) {
            return Ok(None);
        }
        return Err(ExecError::Compile(format!(
            "module `{}` is not available in the sandbox",
            module
        )));
    }

    // Assignment: `name = expr` with a bare identifier on the left.
    if let Some((lhs, rhs)) = stmt.split_once('=') {
        let name = lhs.trim();
        if is_identifier(name) {
            let value = eval_expr(rhs, ctx)?;
            *ctx = ctx.with_binding(Binding::new(name, value));
            return Ok(None);
        }
    }

    eval_expr(stmt, ctx).map(Some)
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Clone)]
enum Token {
    Operand(Value),
    Ident(String),
    Op(char),
}

fn lex(expr: &str) -> Result<Vec<Token>, ExecError> {
    let mut tokens = Vec::new();
    let mut chars = expr.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() {
            let mut num = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() || d == '.' {
                    num.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            let value = if num.contains('.') {
                num.parse::<f64>().ok().map(Value::Float)
            } else {
                num.parse::<i64>().ok().map(Value::Int)
            }
            .ok_or_else(|| ExecError::Compile(format!("invalid number `{}`", num)))?;
            tokens.push(Token::Operand(value));
        } else if c == '"' {
            chars.next();
            let mut s = String::new();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some(ch) => s.push(ch),
                    None => {
                        return Err(ExecError::Compile("unterminated string literal".into()))
                    }
                }
            }
            tokens.push(Token::Operand(Value::String(s)));
        } else if c.is_ascii_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Ident(ident));
        } else if matches!(c, '+' | '-' | '*' | '/') {
            tokens.push(Token::Op(c));
            chars.next();
        } else {
            return Err(ExecError::Compile(format!("unexpected character `{}`", c)));
        }
    }

    Ok(tokens)
}

fn resolve(token: Token, ctx: &ExecContext) -> Result<Value, ExecError> {
    match token {
        Token::Operand(v) => Ok(v),
        Token::Ident(name) => ctx
            .get(&name)
            .cloned()
            .ok_or_else(|| ExecError::Compile(format!("unknown identifier `{}`", name))),
        Token::Op(op) => Err(ExecError::Compile(format!("misplaced operator `{}`", op))),
    }
}

fn eval_expr(expr: &str, ctx: &ExecContext) -> Result<Value, ExecError> {
    let mut tokens = lex(expr)?.into_iter();

    let first = tokens
        .next()
        .ok_or_else(|| ExecError::Compile("empty expression".into()))?;
    let mut acc = resolve(first, ctx)?;

    while let Some(token) = tokens.next() {
        let op = match token {
            Token::Op(op) => op,
            other => {
                return Err(ExecError::Compile(format!(
                    "expected operator, found `{:?}`",
                    other
                )))
            }
        };
        let rhs = tokens
            .next()
            .ok_or_else(|| ExecError::Compile(format!("missing operand after `{}`", op)))?;
        let rhs = resolve(rhs, ctx)?;
        acc = apply(acc, op, rhs)?;
    }

    Ok(acc)
}

fn apply(lhs: Value, op: char, rhs: Value) -> Result<Value, ExecError> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => {
            if op == '/' && b == 0 {
                return Err(ExecError::Runtime("division by zero".into()));
            }
            let result = match op {
                '+' => a.checked_add(b),
                '-' => a.checked_sub(b),
                '*' => a.checked_mul(b),
                '/' => a.checked_div(b),
                _ => unreachable!("lexer only emits + - * /"),
            };
            result
                .map(Value::Int)
                .ok_or_else(|| ExecError::Runtime("arithmetic overflow".into()))
        }
        (a @ (Value::Int(_) | Value::Float(_)), b @ (Value::Int(_) | Value::Float(_))) => {
            let (a, b) = (as_f64(&a), as_f64(&b));
            match op {
                '+' => Ok(Value::Float(a + b)),
                '-' => Ok(Value::Float(a - b)),
                '*' => Ok(Value::Float(a * b)),
                '/' => {
                    if b == 0.0 {
                        Err(ExecError::Runtime("division by zero".into()))
                    } else {
                        Ok(Value::Float(a / b))
                    }
                }
                _ => unreachable!("lexer only emits + - * /"),
            }
        }
        (Value::String(a), Value::String(b)) if op == '+' => Ok(Value::String(a + &b)),
        (a, b) => Err(ExecError::Runtime(format!(
            "unsupported operands for `{}`: {} and {}",
            op,
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn as_f64(v: &Value) -> f64 {
    match v {
        Value::Int(i) => *i as f64,
        Value::Float(f) => *f,
        _ => unreachable!("callers match numeric values only"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ManifestBuilder, StaticModules};

    fn manifest() -> CapabilityManifest {
        ManifestBuilder::new().build(&StaticModules::host_defaults())
    }

    async fn run(fragment: &str, prior: Option<Arc<ExecContext>>) -> Evaluation {
        CalcExecutor::new()
            .execute(fragment, prior, &manifest(), CancellationToken::new())
            .await
    }

    #[tokio::test]
    async fn assignment_then_expression() {
        let eval = run("x = 5", None).await;
        assert!(eval.result.ok());
        assert!(eval.result.value().is_none());

        let eval = run("x + 1", Some(eval.context)).await;
        assert_eq!(eval.result.value(), Some(&Value::Int(6)));
    }

    #[tokio::test]
    async fn division_by_zero_is_runtime_fault() {
        let eval = run("1/0", None).await;
        assert_eq!(
            eval.result.error(),
            Some(&ExecError::Runtime("division by zero".into()))
        );
    }

    #[tokio::test]
    async fn integer_overflow_is_runtime_fault() {
        let eval = run("9223372036854775807 + 1", None).await;
        assert_eq!(
            eval.result.error(),
            Some(&ExecError::Runtime("arithmetic overflow".into()))
        );

        let eval = run("x = 0 - 9223372036854775807; x - 2", None).await;
        assert_eq!(
            eval.result.error(),
            Some(&ExecError::Runtime("arithmetic overflow".into()))
        );

        let eval = run("4611686018427387904 * 2", None).await;
        assert_eq!(
            eval.result.error(),
            Some(&ExecError::Runtime("arithmetic overflow".into()))
        );
    }

    #[tokio::test]
    async fn malformed_number_is_compile_failure() {
        let eval = run("1.2.3 + 1", None).await;
        assert!(matches!(eval.result.error(), Some(ExecError::Compile(_))));
    }

    #[tokio::test]
    async fn unknown_identifier_is_compile_failure() {
        let eval = run("y + 1", None).await;
        assert!(matches!(eval.result.error(), Some(ExecError::Compile(_))));
    }

    #[tokio::test]
    async fn failure_keeps_prior_context() {
        let first = run("x = 5", None).await;
        let prior = first.context.clone();
        let eval = run("1/0", Some(prior.clone())).await;
        assert!(Arc::ptr_eq(&eval.context, &prior));
    }

    #[tokio::test]
    async fn multi_statement_fragments_accumulate() {
        let eval = run("a = 2; b = 3; a * b", None).await;
        assert_eq!(eval.result.value(), Some(&Value::Int(6)));
        assert_eq!(eval.context.len(), 2);
    }

    #[tokio::test]
    async fn string_concatenation() {
        let eval = run(r#"greeting = "hello, "; greeting + "world""#, None).await;
        assert_eq!(
            eval.result.value(),
            Some(&Value::String("hello, world".into()))
        );
    }

    #[tokio::test]
    async fn import_checked_against_manifest() {
        let eval = run("import collections", None).await;
        assert!(eval.result.ok());

        let eval = run("import fs", None).await;
        assert!(matches!(eval.result.error(), Some(ExecError::Compile(_))));
    }

    #[tokio::test]
    async fn loop_observes_cancellation() {
        let cancel = CancellationToken::new();
        let exec = CalcExecutor::new();
        let m = manifest();
        let fut = exec.execute("loop", None, &m, cancel.clone());
        cancel.cancel();
        let eval = fut.await;
        assert_eq!(eval.result.error(), Some(&ExecError::Cancelled));
    }

    #[tokio::test]
    async fn mixed_arithmetic_promotes_to_float() {
        let eval = run("1 + 2.5", None).await;
        assert_eq!(eval.result.value(), Some(&Value::Float(3.5)));
    }
}
