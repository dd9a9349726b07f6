//! In-memory implementations of the repository traits.
//!
//! Used by unit tests, integration tests, and the CLI's snapshot mode.

mod company_repo;
mod delivery_ledger;
mod membership_repo;
mod record_store;
mod switch_log_repo;

pub use company_repo::MockCompanyRepository;
pub use delivery_ledger::MemoryDeliveryLedger;
pub use membership_repo::MockMembershipRepository;
pub use record_store::MockRecordStore;
pub use switch_log_repo::MockSwitchLogRepository;
