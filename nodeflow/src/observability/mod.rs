//! Observability utilities.

mod logging;
mod timing;

pub use logging::{init_tracing, init_tracing_with_default, LogFormat};
pub use timing::SpanTimer;
