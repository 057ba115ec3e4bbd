pub mod command;
pub mod intent;
pub mod session;
pub mod task;
