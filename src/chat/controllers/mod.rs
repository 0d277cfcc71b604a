pub mod turn_engine;

pub use turn_engine::{EngineEvent, SearchOutcome, TurnEngine, TurnState};
