mod connection_handle;
mod room_registry;

pub use self::connection_handle::{ConnectionHandle, Delivery};
pub use self::room_registry::{RegistryError, RoomRegistry};
