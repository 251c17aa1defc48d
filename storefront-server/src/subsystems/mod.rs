pub mod catalog;
pub mod compose;
pub mod search;
pub mod shop;
