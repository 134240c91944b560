pub mod assistant;
pub mod config;
pub mod error;
pub mod llm;
pub mod server;
pub mod site;


pub use assistant::{Assistant, AssistantSettings};
pub use config::Config;
pub use error::AppError;
