//! End-to-end tests: the ledger engine, the file store and the HTTP API
//! exercised together.

mod scenarios;
mod simulation;
mod store;
