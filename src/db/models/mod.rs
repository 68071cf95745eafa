//! Database entity models, grouped by aggregate.

pub mod audits;
pub mod catalog;
pub mod chat;
pub mod company;
pub mod documents;
pub mod inventory;
pub mod invoices;

pub use audits::*;
pub use catalog::*;
pub use chat::*;
pub use company::*;
pub use documents::*;
pub use inventory::*;
pub use invoices::*;
