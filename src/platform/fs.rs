// MedScan - platform/fs.rs
//
// Turns user-selected files into `RawImage`s ready for the queue.
// Size limits are checked from metadata before any bytes are read.

use crate::core::model::RawImage;
use crate::util::error::InputError;
use std::path::Path;

/// Read `path` into a `RawImage`, refusing empty files and files larger
/// than `max_bytes`.
pub fn read_image_file(path: &Path, max_bytes: u64) -> Result<RawImage, InputError> {
    let metadata = std::fs::metadata(path).map_err(|e| InputError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    if !metadata.is_file() {
        return Err(InputError::NotAFile {
            path: path.to_path_buf(),
        });
    }

    if metadata.len() == 0 {
        return Err(InputError::Empty {
            path: path.to_path_buf(),
        });
    }

    if metadata.len() > max_bytes {
        return Err(InputError::FileTooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
            max: max_bytes,
        });
    }

    let bytes = std::fs::read(path).map_err(|e| InputError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let label = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    tracing::debug!(file = %path.display(), bytes = bytes.len(), "Image file read");
    Ok(RawImage::new(label, bytes))
}

/// Read every path, keeping successes in order and collecting failures.
pub fn read_image_files<'a, I>(paths: I, max_bytes: u64) -> (Vec<RawImage>, Vec<InputError>)
where
    I: IntoIterator<Item = &'a Path>,
{
    let mut images = Vec::new();
    let mut errors = Vec::new();
    for path in paths {
        match read_image_file(path, max_bytes) {
            Ok(img) => images.push(img),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable input");
                errors.push(e);
            }
        }
    }
    (images, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_image_file_uses_file_name_as_label() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pill.jpg");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        let img = read_image_file(&path, 1024).unwrap();
        assert_eq!(img.label, "pill.jpg");
        assert_eq!(img.bytes, vec![1, 2, 3]);
    }

    #[test]
    fn test_read_image_file_rejects_oversized_and_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.jpg");
        std::fs::write(&path, vec![0u8; 64]).unwrap();

        assert!(matches!(
            read_image_file(&path, 10),
            Err(InputError::FileTooLarge { size: 64, max: 10, .. })
        ));
        assert!(matches!(
            read_image_file(dir.path(), 10),
            Err(InputError::NotAFile { .. })
        ));
    }

    #[test]
    fn test_read_image_file_rejects_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blank.jpg");
        std::fs::write(&path, b"").unwrap();

        let err = read_image_file(&path, 1024).unwrap_err();
        assert!(matches!(err, InputError::Empty { .. }));
        assert!(err.to_string().contains("blank.jpg"));
    }

    #[test]
    fn test_read_image_files_keeps_order_and_collects_errors() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        let missing = dir.path().join("missing.png");
        std::fs::write(&a, [1u8]).unwrap();
        std::fs::write(&b, [2u8]).unwrap();

        let paths = [a.as_path(), missing.as_path(), b.as_path()];
        let (images, errors) = read_image_files(paths, 1024);
        let labels: Vec<_> = images.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, ["a.png", "b.png"]);
        assert_eq!(errors.len(), 1);
    }
}
