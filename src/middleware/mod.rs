// Request identity: bearer tokens resolved through GitHub, with caching

pub mod auth;
pub mod github;

pub use auth::*;
pub use github::*;
