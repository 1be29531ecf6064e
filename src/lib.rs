//! Structured record extraction from release-notes pages and generated news text.
//!
//! Both inputs are unreliable: page markup changes without notice, and
//! generated text arrives in whatever shape the model felt like producing.
//! Every entry point degrades through fallbacks instead of failing, and only
//! an unrepairable completion payload surfaces as an error.

pub mod parser;

pub use parser::{
    extract_changelog, extract_news, extract_news_response, DecodeError, ExtractContext, ExtractedRecord,
    ProductPolicy, RecordKind, RepairError,
};
