//! CHTL compiler CLI: argument handling, compilation driving and diagnostic
//! printing around the `chtl-compiler` core.

pub mod main_entry;
pub mod perform_compile;
