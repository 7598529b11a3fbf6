//! Shared in-memory routing state: connection registry and room router.

pub mod connections;
pub mod rooms;

pub use connections::{ConnectionRegistry, OutboundSender};
pub use rooms::RoomRouter;
