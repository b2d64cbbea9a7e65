//! Job repository backends.

pub mod memory;

pub use memory::InMemoryJobRepository;
