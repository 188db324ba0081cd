//! Read-only lookup catalogs
//!
//! Both catalogs degrade to built-in fallbacks when the backing tables
//! cannot be read, so a broken catalog never blocks a pairing session.

pub mod colors;
pub mod status;

pub use colors::{ColorCatalog, TubeColor};
pub use status::{ConnectionStatus, StatusCatalog};
