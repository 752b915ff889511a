pub mod dispatch;
pub mod lifecycle;
pub mod matching;
pub mod roster;
