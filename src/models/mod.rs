pub mod activity;
pub mod event;
pub mod trip;
pub mod user;
