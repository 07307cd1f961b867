/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Generators of well-formed inputs for fuzzing.

pub use libfuzzer_sys::{arbitrary, fuzz_target};

pub mod method;
