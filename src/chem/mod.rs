//! Chemistry helpers for atom types

pub mod elements;

pub use elements::atomic_number;
