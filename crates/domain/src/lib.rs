pub mod document;
pub mod editor;
pub mod error;
pub mod events;
pub mod export;
pub mod locks;
pub mod ports;
pub mod review;
pub mod sessions;
pub mod util;
pub mod versions;

pub type DomainResult<T> = Result<T, error::DomainError>;
