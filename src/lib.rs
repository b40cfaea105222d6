//! Masque library crate
//!
//! Exposes the pipeline stages so integration tooling can exercise
//! individual agents without going through CLI startup.

pub mod config;
pub mod decision;
pub mod detect;
pub mod fixer;
pub mod ledger;
pub mod llm;
pub mod pipeline;
pub mod publish;
pub mod report;
pub mod review;
pub mod testeval;
pub mod util;
