//! Output writers for extracted articles.
//!
//! # Submodules
//!
//! - [`json`]: Writes an [`ArticleData`](crate::models::ArticleData) record to a JSON file

pub mod json;
