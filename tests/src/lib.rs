//! # Component Runtime Test Suite
//!
//! Cross-crate scenarios that drive real component managers through the
//! in-memory service registry, configuration store and module registry.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs       # Harness, recording instances, activation latch
//! └── integration/
//!     ├── scenarios.rs      # Binding scenarios and state invariants
//!     ├── registry_flows.rs # Module cascade, commands, management view
//!     └── dynamics.rs       # Factories, configuration, delayed services
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p lifecycle-tests
//! cargo test -p lifecycle-tests integration::scenarios::
//! ```

#![allow(unused_variables)]
#![allow(unused_imports)]
#![allow(dead_code)]

pub mod fixtures;
pub mod integration;
