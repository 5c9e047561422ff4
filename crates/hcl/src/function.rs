//! Callable functions exposed to expressions through an `EvalContext`
//!
//! A function declares typed parameters, a type function that computes the
//! result type from the arguments, and an implementation. Argument
//! conversion, null and unknown handling happen in [`Function::call`] so
//! implementations only see values they declared they can handle.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::value::{Type, Value, convert};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FunctionError {
    /// A specific argument is invalid. `index` counts from zero across
    /// fixed and variadic arguments.
    #[error("argument {index}: {message}")]
    Arg { index: usize, message: String },

    #[error("{0}")]
    Other(String),
}

impl FunctionError {
    pub fn arg(index: usize, message: impl Into<String>) -> Self {
        FunctionError::Arg {
            index,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        FunctionError::Other(message.into())
    }
}

/// A declared function parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub ty: Type,
    pub allow_null: bool,
    pub allow_unknown: bool,
    pub allow_dynamic_type: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            allow_null: false,
            allow_unknown: false,
            allow_dynamic_type: false,
        }
    }

    pub fn allow_null(mut self) -> Self {
        self.allow_null = true;
        self
    }

    pub fn allow_unknown(mut self) -> Self {
        self.allow_unknown = true;
        self
    }

    pub fn allow_dynamic_type(mut self) -> Self {
        self.allow_dynamic_type = true;
        self
    }
}

pub type TypeFn = Arc<dyn Fn(&[Value]) -> Result<Type, FunctionError> + Send + Sync>;
pub type ImplFn = Arc<dyn Fn(&[Value], &Type) -> Result<Value, FunctionError> + Send + Sync>;

/// Builder for a [`Function`].
pub struct FunctionSpec {
    params: Vec<Parameter>,
    var_param: Option<Parameter>,
    type_fn: TypeFn,
    impl_fn: ImplFn,
}

impl FunctionSpec {
    /// A function with no parameters returning dynamic type until
    /// configured otherwise.
    pub fn new<F>(impl_fn: F) -> Self
    where
        F: Fn(&[Value], &Type) -> Result<Value, FunctionError> + Send + Sync + 'static,
    {
        Self {
            params: Vec::new(),
            var_param: None,
            type_fn: Arc::new(|_| Ok(Type::Dynamic)),
            impl_fn: Arc::new(impl_fn),
        }
    }

    pub fn param(mut self, param: Parameter) -> Self {
        self.params.push(param);
        self
    }

    pub fn var_param(mut self, param: Parameter) -> Self {
        self.var_param = Some(param);
        self
    }

    /// Fixed result type.
    pub fn returns(mut self, ty: Type) -> Self {
        self.type_fn = Arc::new(move |_| Ok(ty.clone()));
        self
    }

    pub fn type_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Type, FunctionError> + Send + Sync + 'static,
    {
        self.type_fn = Arc::new(f);
        self
    }

    pub fn build(self) -> Function {
        Function(Arc::new(self))
    }
}

#[derive(Clone)]
pub struct Function(Arc<FunctionSpec>);

impl Function {
    pub fn params(&self) -> &[Parameter] {
        &self.0.params
    }

    pub fn var_param(&self) -> Option<&Parameter> {
        self.0.var_param.as_ref()
    }

    /// Parameter that argument `index` is passed to.
    pub fn param_for(&self, index: usize) -> Option<&Parameter> {
        self.0.params.get(index).or(self.0.var_param.as_ref())
    }

    /// Result type for the given (already converted) arguments.
    pub fn return_type(&self, args: &[Value]) -> Result<Type, FunctionError> {
        (self.0.type_fn)(args)
    }

    /// Check arity, convert each argument to its parameter type, then
    /// compute the result. Unknown arguments that a parameter does not
    /// accept short-circuit to an unknown of the result type.
    pub fn call(&self, args: &[Value]) -> Result<Value, FunctionError> {
        let spec = &self.0;
        if args.len() < spec.params.len() {
            return Err(FunctionError::other(format!(
                "missing value for {:?}",
                spec.params[args.len()].name
            )));
        }
        if spec.var_param.is_none() && args.len() > spec.params.len() {
            return Err(FunctionError::other(format!(
                "expects only {} argument(s)",
                spec.params.len()
            )));
        }

        let mut converted = Vec::with_capacity(args.len());
        let mut short_circuit = false;
        let mut dynamic_result = false;
        for (i, arg) in args.iter().enumerate() {
            let Some(param) = self.param_for(i) else {
                return Err(FunctionError::other("too many arguments"));
            };
            if arg.is_null() && !param.allow_null {
                return Err(FunctionError::arg(i, "argument must not be null"));
            }
            if matches!(arg, Value::Unknown(Type::Dynamic)) && !param.allow_dynamic_type {
                dynamic_result = true;
            }
            if !arg.is_wholly_known() && !param.allow_unknown {
                short_circuit = true;
            }
            let value = convert(arg, &param.ty).map_err(|e| FunctionError::arg(i, e.to_string()))?;
            converted.push(value);
        }

        if dynamic_result {
            return Ok(Value::dynamic());
        }
        let ty = self.return_type(&converted)?;
        if short_circuit {
            log::trace!("function result unknown: unknown argument");
            return Ok(Value::unknown(ty));
        }
        let result = (spec.impl_fn)(&converted, &ty)?;
        if ty.is_dynamic() {
            Ok(result)
        } else {
            convert(&result, &ty).map_err(|e| FunctionError::other(e.to_string()))
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("params", &self.0.params)
            .field("var_param", &self.0.var_param)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repeat() -> Function {
        FunctionSpec::new(|args, _| {
            let s = args[0].as_str().unwrap_or_default();
            let n = args[1].as_number().and_then(|n| n.to_usize()).unwrap_or(0);
            Ok(Value::from(s.repeat(n)))
        })
        .param(Parameter::new("str", Type::String))
        .param(Parameter::new("count", Type::Number))
        .returns(Type::String)
        .build()
    }

    #[test]
    fn converts_arguments() {
        let out = repeat().call(&[Value::from("ab"), Value::from("2")]).unwrap();
        assert_eq!(out, Value::from("abab"));
    }

    #[test]
    fn rejects_null_and_bad_types() {
        let err = repeat()
            .call(&[Value::null(Type::String), Value::from(1)])
            .unwrap_err();
        assert_eq!(err, FunctionError::arg(0, "argument must not be null"));
        let err = repeat().call(&[Value::from("a"), Value::from(true)]).unwrap_err();
        assert!(matches!(err, FunctionError::Arg { index: 1, .. }));
    }

    #[test]
    fn unknown_argument_short_circuits() {
        let out = repeat()
            .call(&[Value::unknown(Type::String), Value::from(1)])
            .unwrap();
        assert_eq!(out, Value::unknown(Type::String));
        let out = repeat().call(&[Value::dynamic(), Value::from(1)]).unwrap();
        assert_eq!(out, Value::dynamic());
    }

    #[test]
    fn arity_is_checked() {
        assert!(repeat().call(&[Value::from("a")]).is_err());
        assert!(
            repeat()
                .call(&[Value::from("a"), Value::from(1), Value::from(2)])
                .is_err()
        );
    }
}
