#![forbid(unsafe_code)]

//! Change-notifying cells shared by the registry, bindings, and the shell gate.

pub mod observable;

pub use observable::{Observable, Subscription};
