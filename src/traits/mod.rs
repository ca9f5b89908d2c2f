//! Core traits implemented by provided services.

mod dispose;

pub use dispose::Dispose;
