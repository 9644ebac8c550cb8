pub mod catalog;
pub mod events;
pub mod receipts;
pub mod tier;
