pub mod access;
pub mod activity;
pub mod reconcile;
pub mod storage;
pub mod trips;
