pub mod archive;

pub use archive::{ARCHIVE_MAGIC, ARCHIVE_VERSION, ArchiveFile, ArchiveMetadata, CollectionArchive};
