//! Request extractors shared by the `/api/v1` handlers.
//!
//! - [`api_key::RequireApiKey`] -- Checks the `X-API-Key` header when a key is configured.

pub mod api_key;
