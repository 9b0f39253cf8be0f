pub mod common;
pub mod config;
pub mod event;
pub mod note;
pub mod pomodoro;
pub mod sync;
pub mod todo;
