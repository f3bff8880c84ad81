pub mod auth_service;
pub mod chat_service;
pub mod relay;
pub mod session_service;
pub mod transcript;
