pub mod event_manager;
pub mod message_manager;
pub mod session_manager;

pub use event_manager::{EventManager, IngestOutcome};
pub use message_manager::{MessageManager, SendOptions};
pub use session_manager::SessionManager;
