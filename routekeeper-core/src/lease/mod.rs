mod backoff;
mod writer_lease;

#[cfg(test)]
mod tests;

pub use backoff::Backoff;
pub use writer_lease::*;
