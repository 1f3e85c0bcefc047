pub mod contract;
pub mod holding;
pub mod suggestion;
