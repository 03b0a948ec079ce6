//! Adapters behind the domain ports: storage backends and the outcome
//! publisher.

pub mod in_memory;
pub mod publisher;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
#[cfg(test)]
pub(crate) mod faulty;
