//! End-to-end tests for quotegen-xlsx.
//!
//! Each test builds the package it needs in a temp directory, runs the reader
//! or the template patcher over it, and inspects the resulting parts.

mod common;
mod patching;
mod reading;

pub use common::*;
