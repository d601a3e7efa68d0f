//! Outlet state-reconciliation and async-correlation engine
//!
//! - `registry`: Authoritative outlet table and reconciliation flows
//! - `ledger`: Pending-response ledger for deferred gateway results

pub mod ledger;
pub mod registry;

pub use ledger::PendingLedger;
pub use registry::OutletRegistry;
