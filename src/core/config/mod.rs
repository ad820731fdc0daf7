pub mod data;
pub mod io;
pub mod printing;


pub use data::{ApiSettings, Config, RateLimitConfig};
pub use io::ConfigError;
