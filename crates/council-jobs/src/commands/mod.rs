pub mod cleanup;
pub mod exec;
pub mod start;
pub mod status;
pub mod wait;
