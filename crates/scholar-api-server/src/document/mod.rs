pub mod capabilities;
pub mod parser;

pub use capabilities::ExtractorCapabilities;
pub use parser::{DocumentKind, DocumentParser};
