//! Real pixel decoders

#[cfg(feature = "pdf")]
pub mod mupdf;

#[cfg(feature = "pdf")]
pub use self::mupdf::{MupdfDocument, MupdfProvider};
