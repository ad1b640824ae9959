// Handshake bookkeeping shared by both roles.

pub mod state;
pub mod transcript;

pub use state::{HandshakeState, Role};
pub use transcript::Transcript;
