pub mod engine;
pub mod event_bus;
pub mod gate;
pub mod history;
pub mod intervention;
pub mod labeler;
pub mod loop_control;
pub mod prompt;
pub mod state;
pub mod transcript;
