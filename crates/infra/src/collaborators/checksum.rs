use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::CollaboratorError;

/// Hex SHA-256 of a file, computed off the async runtime.
pub async fn sha256_file(path: &Path) -> Result<String, CollaboratorError> {
    let owned: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || hash(&owned))
        .await
        .map_err(|e| CollaboratorError::invalid("checksum", path.display().to_string(), e.to_string()))?
        .map_err(|e| CollaboratorError::io("checksum", path, e))
}

fn hash(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
