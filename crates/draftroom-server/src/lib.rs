// Server library: configuration, the player catalog loader, the client wire
// protocol and the WebSocket transport, shared by the binary and its tests.

pub mod config;
pub mod pool_loader;
pub mod protocol;
pub mod router;
pub mod ws_server;
