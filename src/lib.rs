pub mod auth;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod news;
pub mod pipeline;
pub mod scheduler;
pub mod utils;

pub use context::NewsroomContext;
pub use error::NewsroomError;
