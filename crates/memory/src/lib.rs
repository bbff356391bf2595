//! Long-term fact stores for deskhand.
//!
//! Both backends rank with the same keyword scorer in [`keyword`].

pub mod file_backend;
pub mod in_memory;
pub mod keyword;

pub use file_backend::FileBackend;
pub use in_memory::InMemoryBackend;
