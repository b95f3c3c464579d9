//! Private utility types used internally within `relopatch`.
//!
//! These are all bits of functionality that _could_ exist as their own crates /
//! libraries, and do not rely on any `relopatch` specific infrastructure.

pub mod managed_vec;
