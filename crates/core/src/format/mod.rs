//! Format classification: source families and target tokens.

mod family;
mod target;

pub use family::{source_extension, source_stem, FormatFamily, SourceFormat, SourceProfile};
pub use target::{TargetFormat, UnknownTargetFormat};
