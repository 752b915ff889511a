pub mod delivery;
pub mod event;
pub mod matching;
pub mod rider;
