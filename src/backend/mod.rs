//! Media server API module

pub mod api;
pub mod models;

pub use api::{MediaApiClient, MediaApiContract, MediaApiError};
pub use models::{MediaDetails, MediaFile, MediaRequest, MediaView, SignedUrls};
