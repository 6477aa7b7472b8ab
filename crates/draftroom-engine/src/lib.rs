// Concurrent draft sessions: registry, pick clocks, admin auto-play and the
// broadcast boundary that carries their events out.

pub mod broadcast;
pub mod engine;
pub mod protocol;
pub mod timer;

pub use broadcast::{BroadcastError, BroadcastSink, ChannelSink, Envelope, NullSink};
pub use engine::{DraftEngine, EngineStats};
pub use protocol::{ClockTick, EngineEvent, SessionSnapshot, TeamSnapshot};
pub use timer::{TimerConfig, TimerState};
