//! Integration tests across shared-types, shared-bus and component-runtime.

pub mod dynamics;
pub mod scenarios;
