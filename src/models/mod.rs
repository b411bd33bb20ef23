pub mod audit;
pub mod enrichment;
pub mod error;
pub mod execution;
pub mod frame;
pub mod metadata;
pub mod pattern;
pub mod request;
pub mod target;
pub mod translation;

pub use audit::*;
pub use enrichment::*;
pub use error::*;
pub use execution::*;
pub use frame::*;
pub use metadata::*;
pub use pattern::*;
pub use request::*;
pub use target::*;
pub use translation::*;
