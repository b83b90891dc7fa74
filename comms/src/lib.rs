/// Chat message envelope which clients send to the server
pub mod command;
/// Events which the server relays to every member of a room
pub mod event;
/// Implementation of event and command transportation over WebSockets.
/// Requires 'server' or 'client' features to be enabled and will bring in the websocket dependencies
pub mod transport;
