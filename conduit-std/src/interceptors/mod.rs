//! Standard publish interceptors.

mod filter;
mod logging;
mod timeout;

pub use filter::FilterInterceptor;
pub use logging::LoggingInterceptor;
pub use timeout::TimeoutInterceptor;
