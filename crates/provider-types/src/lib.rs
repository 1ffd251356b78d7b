pub mod intents;
pub mod ledger;
pub mod messages;

pub use intents::*;
pub use ledger::*;
pub use messages::*;
