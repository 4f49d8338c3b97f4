//! Bookshelf library exports for testing

use clap::ValueEnum;

pub mod api;
pub mod cli;
pub mod core;
pub mod store;

#[cfg(test)]
pub mod test_support;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Provider {
    #[default]
    Rest,
    Memory,
}

impl Provider {
    /// The name `build_api` and the config file use.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Rest => "rest",
            Provider::Memory => "memory",
        }
    }
}
