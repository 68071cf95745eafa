//! Repository implementations for database access.
//!
//! One repository per aggregate; each owns the SQL for its tables. Write
//! paths open explicit transactions, read paths borrow the pool. All
//! repositories return domain models from [`crate::db::models`] and classify
//! failures through [`crate::db::errors::DbError`].

pub mod audits;
pub mod catalog;
pub mod chat;
pub mod company;
pub mod documents;
pub mod invoices;
pub mod price_history;
pub mod reminders;

pub use audits::Audits;
pub use catalog::Materials;
pub use chat::{Memory, Sessions};
pub use company::CompanyDocuments;
pub use documents::Documents;
pub use invoices::Invoices;
pub use price_history::PriceHistory;
pub use reminders::Reminders;
