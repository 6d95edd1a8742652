// Presentation layer - HTTP publishing of tracker state
pub mod app_state;
pub mod handlers;
