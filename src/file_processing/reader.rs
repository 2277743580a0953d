use crate::errors::EngineError;
use std::path::Path;
use tokio::fs;

/// Maximum size of a file an edit may be applied to (10 MB).
const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Reads the current content of an edit target. `None` means the file does
/// not exist yet.
pub async fn read_original(path: &Path) -> Result<Option<String>, EngineError> {
    let metadata = match fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(EngineError::io(path, e)),
    };
    if metadata.is_dir() {
        return Err(EngineError::invalid_data(path, "is a directory"));
    }
    if metadata.len() > MAX_FILE_SIZE {
        return Err(EngineError::invalid_data(
            path,
            format!("file too large ({} bytes, max {})", metadata.len(), MAX_FILE_SIZE),
        ));
    }

    let contents = fs::read_to_string(path)
        .await
        .map_err(|e| EngineError::io(path, e))?;
    Ok(Some(contents))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_original() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        assert_eq!(read_original(&file).await.unwrap(), None);

        std::fs::write(&file, "hello\n").unwrap();
        assert_eq!(read_original(&file).await.unwrap().as_deref(), Some("hello\n"));

        assert!(read_original(dir.path()).await.is_err());
    }
}
