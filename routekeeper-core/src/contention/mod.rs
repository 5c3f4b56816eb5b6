mod observer;
mod tracker;

#[cfg(test)]
mod tests;

pub use observer::*;
pub use tracker::*;
