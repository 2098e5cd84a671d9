pub mod fetch;
pub mod source;
pub mod transfer;
pub mod upload;
