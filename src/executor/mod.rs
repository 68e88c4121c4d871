pub mod adapter;
pub mod coordinator;
pub mod dispatcher;
pub mod input;
pub mod motion;
pub mod safety;
pub mod text_input;
