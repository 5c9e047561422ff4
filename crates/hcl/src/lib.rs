//! HCL - the core language engine
//!
//! Parses native-syntax configuration into a syntax tree, evaluates
//! expressions against a caller-supplied context, and decodes bodies into
//! typed values with a declarative [`Spec`].
//!
//! ## Quick Start
//!
//! ```ignore
//! use hcl::{EvalContext, Spec, Type, Value};
//!
//! let src = r#"
//! name = "web-${env}"
//! port = 8080
//! "#;
//!
//! let ctx = EvalContext::new().with_variable("env", Value::from("prod"));
//! let spec = Spec::object([
//!     ("name", Spec::attr("name", Type::String).required()),
//!     ("port", Spec::attr("port", Type::Number)),
//! ]);
//!
//! let config = hcl::decode_str(src, "app.hcl", &spec, Some(&ctx))?;
//! ```
//!
//! ## Lower-level API
//!
//! Every phase reports through [`Diagnostics`] rather than failing: the
//! parser returns a complete tree with null placeholders where input was
//! broken, the evaluator returns an unknown of the best-known type. The
//! `*_str` helpers below turn error diagnostics into an [`HclError`].
//!
//! ```ignore
//! let (file, diags) = hcl::parse_config(src.as_bytes(), "app.hcl", hcl::Pos::START);
//! let (value, more) = hcl::decode(&file.body, &spec, Some(&ctx));
//! ```

pub mod ast;
pub mod body;
pub mod dec;
pub mod diagnostic;
pub mod eval;
pub mod function;
pub mod lexer;
pub mod parser;
pub mod pos;
mod pretty;
pub mod static_expr;
pub mod stdlib;
pub mod traversal;
pub mod value;

use thiserror::Error;

// ============ Primary Public API ============

pub use body::{Body, BodyContent, BodySchema, merge_bodies};
pub use dec::{DecodeOptions, Spec, SpecError, decode, decode_with_options, partial_decode};
pub use diagnostic::{Diagnostic, Diagnostics, Severity};
pub use eval::{EvalContext, eval};
pub use function::{Function, FunctionError, FunctionSpec, Parameter};
pub use parser::{parse_config, parse_expression, parse_template, parse_traversal_abs};
pub use pos::{Pos, Range};
pub use traversal::{Traversal, Traverser};
pub use value::{ConvertError, Number, Type, Value, convert};

/// Parse a configuration file, failing on any error diagnostic.
pub fn parse_str(src: &str, filename: &str) -> Result<ast::File, HclError> {
    let (file, diags) = parse_config(src.as_bytes(), filename, Pos::START);
    check(diags)?;
    Ok(file)
}

/// Parse and evaluate a single expression.
pub fn eval_str(src: &str, ctx: Option<&EvalContext>) -> Result<Value, HclError> {
    let (expr, diags) = parse_expression(src.as_bytes(), "<expr>", Pos::START);
    check(diags)?;
    let (val, diags) = expr.value(ctx);
    check(diags)?;
    Ok(val)
}

/// Parse and evaluate a single expression, converting the result to `ty`.
pub fn eval_str_as(src: &str, ty: &Type, ctx: Option<&EvalContext>) -> Result<Value, HclError> {
    let val = eval_str(src, ctx)?;
    Ok(convert(&val, ty)?)
}

/// Parse a configuration file and decode its body with `spec`.
pub fn decode_str(
    src: &str,
    filename: &str,
    spec: &Spec,
    ctx: Option<&EvalContext>,
) -> Result<Value, HclError> {
    spec.validate()?;
    let file = parse_str(src, filename)?;
    let (val, diags) = decode(&file.body, spec, ctx);
    check(diags)?;
    Ok(val)
}

fn check(diags: Diagnostics) -> Result<(), HclError> {
    if diags.has_errors() {
        return Err(HclError::Diagnostics(diags));
    }
    for warning in diags.iter() {
        log::warn!("{warning}");
    }
    Ok(())
}

// ============ Errors ============

#[derive(Error, Debug)]
pub enum HclError {
    #[error("{0}")]
    Diagnostics(Diagnostics),
    #[error("Invalid decoder specification: {0}")]
    Spec(#[from] SpecError),
    #[error("Conversion error: {0}")]
    Conversion(#[from] ConvertError),
}

impl HclError {
    /// The diagnostics behind this error, if it came from source.
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            HclError::Diagnostics(diags) => Some(diags),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_str_reports_diagnostics_as_error() {
        let spec = Spec::attr("port", Type::Number).required();
        let err = decode_str("", "app.hcl", &spec, None).unwrap_err();
        let diags = err.diagnostics().unwrap();
        assert_eq!(diags[0].summary, "Missing required argument");
        assert!(err.to_string().contains("app.hcl:1,1"));
    }

    #[test]
    fn spec_errors_come_first() {
        let spec = Spec::block_map("x", Vec::<String>::new(), Spec::literal(1));
        assert!(matches!(
            decode_str("{{{", "bad.hcl", &spec, None),
            Err(HclError::Spec(SpecError::NoLabels { .. }))
        ));
    }

    #[test]
    fn eval_helpers() {
        let ctx = EvalContext::new().with_stdlib();
        assert_eq!(eval_str("upper(\"a\") == \"A\"", Some(&ctx)).unwrap(), Value::from(true));
        assert!(matches!(
            eval_str_as("\"x\"", &Type::Number, None),
            Err(HclError::Conversion(_))
        ));
        assert!(matches!(eval_str("1 +", None), Err(HclError::Diagnostics(_))));
    }
}
