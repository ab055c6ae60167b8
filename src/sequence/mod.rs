//! Ordered assembly of out-of-order worker output.

/// Reorder window and gap policy.
pub mod reorder;
