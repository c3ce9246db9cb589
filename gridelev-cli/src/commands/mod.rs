pub mod index;
pub mod list;
pub mod resolve;
