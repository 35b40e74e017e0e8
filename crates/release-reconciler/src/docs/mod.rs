//! Editable change-log documents.
//!
//! Composed notes are uploaded as HTML. Reviewers edit them in place and the
//! reconciler reads them back as Markdown, whether the editor still serves
//! the original HTML or has converted the document to DOCX.

pub mod convert;
pub mod docx;
pub mod dryrun;
pub mod error;
pub mod gdrive;
pub mod store;

pub use convert::{html_to_markdown, markdown_to_html};
pub use docx::docx_to_markdown;
pub use dryrun::DryRunDocuments;
pub use error::{DocumentError, Result};
pub use gdrive::DriveDocuments;
pub use store::{title_matches, ChangelogDocuments, DocumentHandle};
