pub mod errors;
pub mod messages;
pub mod room;
pub mod run;
pub mod user;

use uuid::Uuid;

/// Stable identity of a player, issued by the external identity provider.
pub type PlayerId = Uuid;
/// Identity of one word-guessing run inside a room.
pub type RunId = Uuid;
/// Short human-shareable room code, e.g. "K4F7QZ".
pub type RoomId = String;

// Re-export all types
pub use errors::*;
pub use messages::*;
pub use room::*;
pub use run::*;
pub use user::*;
