// Storage layer (S3-compatible) for chat images

pub mod s3_client;

pub use s3_client::*;
