pub mod memory;
pub mod rest;

pub use memory::InMemoryBooksApi;
pub use rest::RestBooksApi;
