// Draft domain: players, rosters, turn order, session state and the pick
// rules that mutate it. Pure and synchronous; scheduling lives in
// draftroom-engine.

pub mod autopick;
pub mod error;
pub mod pick;
pub mod player;
pub mod resolver;
pub mod roster;
pub mod session;
pub mod turn_order;

pub use error::DraftError;
