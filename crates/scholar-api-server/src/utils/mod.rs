pub mod error;
pub mod retry;

pub use retry::RetryPolicy;
