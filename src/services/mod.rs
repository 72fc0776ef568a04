pub mod aggregator;
pub mod assembler;
pub mod data_service;
#[cfg(test)]
pub(crate) mod fake_source;
pub mod market_data;
pub mod normalizer;
pub mod partition;
