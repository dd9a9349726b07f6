//! Persistence boundary for Leaseguard.
//!
//! The document store itself is an external collaborator. This module
//! defines the repository traits the core talks to and ships in-memory
//! implementations under [`mocks`] for tests and the CLI.

mod error;
pub mod mocks;

pub mod company_repo;
pub mod delivery_ledger;
pub mod membership_repo;
pub mod store;
pub mod switch_log_repo;

pub use company_repo::CompanyRepository;
pub use delivery_ledger::DeliveryLedger;
pub use error::DbError;
pub use membership_repo::MembershipRepository;
pub use store::RecordStore;
pub use switch_log_repo::SwitchLogRepository;
