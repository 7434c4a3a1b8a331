pub mod duplicate;
pub mod ordering;
pub mod selection;
pub mod session;
pub mod types;
