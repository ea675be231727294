//! Store adapter: typed CRUD over the external record store.
//!
//! The Store is the only durable state in the system. This module owns the
//! REST client, the record types, and the flexible timestamp handling the
//! Store's mixed formats require.

mod client;
mod records;
pub mod time;

pub use client::StoreClient;
pub use records::{
    AlertConfig, Certificate, Host, HostMetric, Paged, ResultRecord, ServerTemplate, Service,
    ServiceTemplate, SslTemplate, ThresholdTemplate,
};
