mod id;
pub mod markers;
mod paths;
mod state;

pub use id::{SESSION_PREFIX, SessionId};
pub use paths::{SESSION_EXTENSIONS, SessionDescriptor, SessionPaths, session_id_of_file};
pub use state::{SessionState, inspect, known_sessions, remove_session_files};
