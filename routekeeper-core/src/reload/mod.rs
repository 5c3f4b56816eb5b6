mod coalescer;


pub use coalescer::*;
