//! Trait resolution and object composition

pub mod composer;
pub mod merge;
pub mod resolver;

pub use composer::{
    ComposedObject, ComposerOptions, Conflict, ConflictKind, Layer, ObjectComposer, ParameterContribution, Provenance,
};
pub use resolver::{ResolutionContext, ResolutionError, ResolutionErrorKind, ResolvedTrait, TraitResolver};
