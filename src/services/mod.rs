pub mod activity;
pub mod ledger;
pub mod oracle;
pub mod orchestrator;
pub mod queue;
pub mod stats;
pub mod store;
