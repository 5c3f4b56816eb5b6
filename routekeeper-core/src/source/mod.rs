mod event;
mod json_lines;

#[cfg(test)]
mod tests;

pub use event::*;
pub use json_lines::*;
