//! Concrete inference backends

mod tract;

pub use tract::TractBackend;

#[cfg(test)]
pub(crate) mod test_utils;
