#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Shared primitives used across the ScriptLang compiler crates.
//!
//! - [`interner`]: string interning (`Symbol`, `Interner`).
//! - [`span`]: source positions and half-open source ranges.
//! - [`arena`]: a generic append-only arena for object graphs with cycles.

pub mod arena;
pub mod interner;
pub mod span;

pub use arena::{Arena, Id};
pub use interner::{Interner, Symbol};
pub use span::{FileId, Position, Span};
