mod admitter;
mod client;
mod ingress;

#[cfg(test)]
mod tests;

pub use admitter::*;
pub use client::*;
pub use ingress::*;
