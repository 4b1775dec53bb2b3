pub mod health;
pub mod index;
pub mod progress;
pub mod upload;
