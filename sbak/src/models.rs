pub mod metadata;
pub mod slack;

pub use metadata::*;
pub use slack::*;

/// Records that are stored keyed by a stable identifier.
pub trait Identified {
    fn id(&self) -> &str;
}
