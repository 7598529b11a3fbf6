//! Business logic: message fan-out and presence notification.

pub mod fanout;
pub mod presence;

pub use fanout::FanoutEngine;
pub use presence::PresenceNotifier;
