// Gateway file to expose integration tests from the integration/ subdirectory
// This file allows Rust's test runner to discover tests in subdirectories

mod common;

// Each test file in integration/ needs to be included here
#[path = "integration/search_scenarios.rs"]
mod search_scenarios;

#[path = "integration/backfill.rs"]
mod backfill;

#[path = "integration/persistence.rs"]
mod persistence;

#[path = "integration/lifecycle.rs"]
mod lifecycle;

#[path = "integration/fastembed_model.rs"]
mod fastembed_model;
