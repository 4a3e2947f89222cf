//! Property tests for search invariants.

mod filtering;
mod search_equivalence;
