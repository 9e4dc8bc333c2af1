//! Dataverse Web API access for won services and quote lines.

pub mod auth;
pub mod client;
pub mod error;
pub mod option_sets;
pub mod quote_lines;
pub mod won_service;

pub use auth::{ClientCredentials, ForwardedToken, TokenProvider};
pub use client::{build_http_client, DataverseClient, RetryPolicy};
pub use error::DataverseError;
pub use quote_lines::{create_quote_line_item, NewQuoteLineItem};
pub use won_service::DataverseWonServiceStore;
