pub mod capture;
pub mod log;
pub mod secret;
pub mod session;
pub mod term;
pub mod tmux;
pub mod which;
