pub mod baseline;
pub mod change_log;
pub mod counter;
pub mod frame;
pub mod grid;
pub mod snapshot;
