//! Domain model for entity lists.
//!
//! # Responsibility
//! - Define the records stored in entity lists and the filters applied to them.
//! - Keep validation rules next to the types they protect.
//!
//! # Invariants
//! - Entity identity is `(list, id)`; ids are not globally unique.
//! - A saved entity's `index` always refers to the unfiltered list ordering.

pub mod entity;
pub mod query;
