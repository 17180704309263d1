mod server;
mod shutdown;

pub use server::Server;
pub use shutdown::{spawn_signal_listener, Shutdown};
