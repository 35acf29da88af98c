mod backoff;
pub use backoff::BackoffStrategy;

mod crash;
pub use crash::CrashPolicy;

mod retry;
pub use retry::RetryStrategy;
