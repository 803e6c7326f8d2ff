//! Email store backends.

mod memory;

pub use memory::MemoryEmailStore;
