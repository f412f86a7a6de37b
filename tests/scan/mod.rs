//! End-to-end scan tests.

mod directory;
mod golden;
mod remote;
mod reports;
