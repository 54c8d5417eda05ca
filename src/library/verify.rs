// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::LibraryError;

/// Compute the content hash of a file in podpull's `sha256:<hex>` format
pub fn content_hash(path: &Path) -> Result<String, LibraryError> {
    let hash_err = |e| LibraryError::HashFailed {
        path: path.to_path_buf(),
        source: e,
    };

    let mut file = File::open(path).map_err(hash_err)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        let read = file.read(&mut buffer).map_err(hash_err)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("sha256:{:x}", hasher.finalize()))
}

/// Whether the file's content matches the expected hash
pub fn matches(path: &Path, expected: &str) -> Result<bool, LibraryError> {
    Ok(content_hash(path)?.eq_ignore_ascii_case(expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn hashes_known_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audio.mp3");
        std::fs::write(&path, b"abc").unwrap();

        assert_eq!(
            content_hash(&path).unwrap(),
            "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn matches_detects_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audio.mp3");
        std::fs::write(&path, b"abc").unwrap();
        let expected = content_hash(&path).unwrap();

        assert!(matches(&path, &expected).unwrap());

        std::fs::write(&path, b"abd").unwrap();
        assert!(!matches(&path, &expected).unwrap());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let result = content_hash(&dir.path().join("missing.mp3"));
        assert!(matches!(result, Err(LibraryError::HashFailed { .. })));
    }
}
