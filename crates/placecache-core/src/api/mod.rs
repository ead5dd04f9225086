//! Remote location source module.
//!
//! `LocationSource` is the seam the synchronizer fetches through;
//! `HttpLocationSource` implements it over the public administrative-units
//! REST API.

pub mod client;
pub mod error;
pub mod source;

pub use client::HttpLocationSource;
pub use error::ApiError;
pub use source::LocationSource;
