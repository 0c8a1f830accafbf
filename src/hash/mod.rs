// src/hash/mod.rs

//! Hashing: file contents, named inputs and task fingerprints.

pub mod files;
pub mod hasher;
pub mod inputs;

pub use files::{FileHashCache, compute_file_hash, hash_parts, hash_str};
pub use hasher::{HashDetails, TaskHash, TaskHasher, apply_hashes};
pub use inputs::{DEFAULT_TARGET_INPUTS, ExpandedInput, ResolvedInputs, classify};
