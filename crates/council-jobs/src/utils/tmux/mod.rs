mod common;
mod server;
mod session;

pub use common::{SOCKET_ENV, tmux_args_base, tmux_socket_path};
pub use server::prepare_server;
pub use session::{has_session, kill_session, list_session_names, pane_dead, start_session};
