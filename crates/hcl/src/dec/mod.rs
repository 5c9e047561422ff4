//! Schema-directed decoding of bodies
//!
//! A [`Spec`] describes the value a body should produce. Decoding derives
//! the body schema the spec implies, extracts matching content and
//! evaluates it into one aggregate value.

mod decode;
mod spec;
mod variables;

pub use decode::{
    DecodeOptions, decode, decode_with_options, partial_decode, source_range,
};
pub use spec::{Spec, SpecError, implied_schema, implied_type};
pub use variables::{functions, variables};
