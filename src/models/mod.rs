pub mod activity;
pub mod credit;
pub mod job;
pub mod stats;
pub mod verification;
