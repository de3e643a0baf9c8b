//! Tar packing for copying sources into an environment
//!
//! Sources are shipped as the body of an archive upload, so their bytes never
//! pass through a shell.

use tar::{Builder, EntryType, Header};

use crate::container::ContainerError;

/// Pack a single regular file into an uncompressed tar archive
pub fn pack_file(name: &str, content: &[u8]) -> Result<Vec<u8>, ContainerError> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);

    let mut builder = Builder::new(Vec::new());
    builder
        .append_data(&mut header, name, content)
        .map_err(ContainerError::Archive)?;
    builder.into_inner().map_err(ContainerError::Archive)
}
