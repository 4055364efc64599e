//! Infrastructure adapters: concrete executors behind the core contracts.

#[cfg(not(target_arch = "wasm32"))]
pub mod executor;
