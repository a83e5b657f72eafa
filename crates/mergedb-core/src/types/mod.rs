//! Core data types for `mergedb`.

mod value;


pub use value::Value;
