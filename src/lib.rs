//! traitsmith: compose object schemas from reusable traits
//!
//! Traits are loaded from disk ([`traits`]), their parameters validated
//! ([`validation`]), and folded into objects ([`compose`]). The [`registry`]
//! keeps object files indexed and resolves them on demand; [`codegen`]
//! renders composed objects as type artifacts.

pub mod codegen;
pub mod compose;
pub mod config;
pub mod object;
pub mod registry;
pub mod source;
pub mod traits;
pub mod validation;
