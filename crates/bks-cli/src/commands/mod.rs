//! Command handler modules for the `bks` binary.

pub mod sync;
