pub mod archive;
pub mod docx;

pub use archive::{ArchiveBuilder, DOCUMENT_ENTRY};
pub use docx::DocxEncoder;
