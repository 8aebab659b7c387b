pub mod clock;
pub mod config;
pub mod ledger;
pub mod observability;
pub mod retention;
pub mod server;
pub mod supervisor;
pub mod units;
