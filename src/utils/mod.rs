pub mod allocator;
pub mod logging;
pub mod profiling;
pub mod random;
