pub mod ollama;
pub mod observer;
pub mod scripted;
