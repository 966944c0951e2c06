pub mod cache;
pub mod sim;
pub mod trace;

#[cfg(feature = "stat")]
pub mod stat;
