//! Crate-level tests and the in-memory pool shared by the unit tests


mod adapter_tests;
