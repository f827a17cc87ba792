//! # pantry-core
//!
//! Core library for the pantry tracker: resolves free-text ingredient names
//! (image recognition, AI-generated recipes) to canonical catalog records,
//! estimates quantities and expiry, reconciles observations into a user's
//! inventory, and computes shopping-list shortages across recipes.
//!
//! Recognition and recipe generation happen outside this crate; their results
//! enter as plain data. The SQLite store is the only shared mutable resource.

pub mod db;
pub mod matcher;
pub mod models;
pub mod normalize;
pub mod reconcile;
pub mod resolve;
pub mod service;
pub mod shopping;
pub mod units;
