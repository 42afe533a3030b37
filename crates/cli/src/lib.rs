//! frida-host CLI - inspect devices and processes, spawn and inject
//!
//! The binary is a thin layer over the `frida` crate. Every command opens
//! the engine (the native library, or the simulated engine with
//! `--backend sim`), resolves the target device, performs its calls and
//! prints one result envelope.

pub mod backend;
pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
