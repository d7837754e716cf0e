//! Backend implementations for host control

pub mod local;

pub use local::LocalProcessControl;
