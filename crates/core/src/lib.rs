pub mod candidate;
pub mod config;
pub mod error;
pub mod reading;

pub use candidate::*;
pub use config::Config;
pub use error::*;
pub use reading::Reading;
