use std::io::Cursor;
use std::path::{Path, PathBuf};

use axum::extract::multipart::Field;
use image::imageops::FilterType;
use rand::Rng;

use crate::error::{AppError, AppResult};

pub const AVATAR_LIMIT_BYTES: usize = 200 * 1024;
pub const AVATAR_SIZE: u32 = 128;
const ALLOWED_AVATAR_TYPES: [&str; 3] = ["image/png", "image/jpeg", "image/webp"];

pub const AUDIO_POLICY: UploadPolicy = UploadPolicy {
    allowed_exts: &["mp3"],
    max_bytes: 10 * 1024 * 1024,
    rejection: "Only MP3 audio files are allowed.",
};

pub const PHOTO_POLICY: UploadPolicy = UploadPolicy {
    allowed_exts: &["jpg", "jpeg", "png", "webp"],
    max_bytes: 5 * 1024 * 1024,
    rejection: "Only JPG, JPEG, PNG or WEBP images are allowed.",
};

/// Extension allow-list and size cap for one streamed upload channel.
pub struct UploadPolicy {
    pub allowed_exts: &'static [&'static str],
    pub max_bytes: usize,
    rejection: &'static str,
}

/// A file that has already been written to disk for the current request.
/// Carried around so failure paths can delete it again.
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// Multipart field name the file arrived under.
    pub field_name: String,
    pub disk_path: PathBuf,
    pub file_name: String,
}

fn extension_of(original_name: &str) -> Option<String> {
    Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

fn random_filename(ext: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp_millis();
    let noise: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    format!("{timestamp}-{noise}.{ext}")
}

/// Stream one multipart file field to disk under a randomized name,
/// enforcing the channel's extension and size rules. The partial file is
/// removed when the size cap is exceeded mid-stream.
pub async fn store_field(
    mut field: Field<'_>,
    dir: &Path,
    policy: &UploadPolicy,
) -> AppResult<StoredFile> {
    let field_name = field.name().unwrap_or_default().to_string();
    let original_name = field.file_name().unwrap_or_default().to_string();

    let ext = extension_of(&original_name)
        .filter(|e| policy.allowed_exts.contains(&e.as_str()))
        .ok_or_else(|| AppError::Upload(policy.rejection.to_string()))?;

    tokio::fs::create_dir_all(dir).await?;
    let file_name = random_filename(&ext);
    let disk_path = dir.join(&file_name);

    let mut file = tokio::fs::File::create(&disk_path).await?;
    let mut written = 0usize;

    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(&disk_path).await;
                return Err(AppError::Upload(format!("Upload failed: {e}")));
            }
        };

        written += chunk.len();
        if written > policy.max_bytes {
            drop(file);
            let _ = tokio::fs::remove_file(&disk_path).await;
            return Err(AppError::Upload(format!(
                "File is too large (limit {} bytes).",
                policy.max_bytes
            )));
        }

        tokio::io::AsyncWriteExt::write_all(&mut file, &chunk).await?;
    }

    tokio::io::AsyncWriteExt::flush(&mut file).await?;

    Ok(StoredFile {
        field_name,
        disk_path,
        file_name,
    })
}

/// Delete files written for a failed request. Missing files are fine;
/// anything else is logged and otherwise ignored.
pub fn cleanup_files(files: &[StoredFile]) {
    for file in files {
        if let Err(e) = std::fs::remove_file(&file.disk_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove uploaded file {:?}: {}", file.disk_path, e);
            }
        }
    }
}

/// Validate, resize and store an avatar image. The whole file is
/// buffered in memory (the cap is small), center-cropped to a
/// 128x128 square and re-encoded as PNG. Returns the new filename.
pub fn process_avatar(
    buffer: &[u8],
    content_type: Option<&str>,
    dir: &Path,
    user_id: i64,
) -> AppResult<String> {
    let content_type = content_type.unwrap_or_default();
    if !ALLOWED_AVATAR_TYPES.contains(&content_type) {
        return Err(AppError::Upload("Invalid avatar upload.".into()));
    }
    if buffer.len() > AVATAR_LIMIT_BYTES {
        return Err(AppError::Upload("Invalid avatar upload.".into()));
    }

    let img = image::load_from_memory(buffer)
        .map_err(|_| AppError::Upload("Invalid avatar upload.".into()))?;
    let resized = img.resize_to_fill(AVATAR_SIZE, AVATAR_SIZE, FilterType::Lanczos3);

    let mut encoded = Cursor::new(Vec::new());
    resized.write_to(&mut encoded, image::ImageFormat::Png)?;

    std::fs::create_dir_all(dir)?;
    let filename = format!(
        "user-{}-{}.png",
        user_id,
        chrono::Utc::now().timestamp_millis()
    );
    std::fs::write(dir.join(&filename), encoded.into_inner())?;

    Ok(filename)
}

/// Remove the user's previous avatar file, ignoring "file not found".
pub fn delete_previous_avatar(dir: &Path, stored_path: &str) {
    let Some(basename) = Path::new(stored_path).file_name() else {
        return;
    };
    if let Err(e) = std::fs::remove_file(dir.join(basename)) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove previous avatar: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::DynamicImage::new_rgb8(width, height);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn extension_of_lowercases() {
        assert_eq!(extension_of("Sound.MP3").as_deref(), Some("mp3"));
        assert_eq!(extension_of("photo.jpeg").as_deref(), Some("jpeg"));
        assert_eq!(extension_of("noext").as_deref(), None);
    }

    #[test]
    fn random_filenames_do_not_collide() {
        let a = random_filename("mp3");
        let b = random_filename("mp3");
        assert_ne!(a, b);
        assert!(a.ends_with(".mp3"));
    }

    #[test]
    fn avatar_rejects_wrong_content_type() {
        let tmp = tempfile::tempdir().unwrap();
        let err = process_avatar(&png_bytes(16, 16), Some("image/gif"), tmp.path(), 1)
            .unwrap_err();
        assert!(matches!(err, AppError::Upload(_)));
    }

    #[test]
    fn avatar_rejects_oversized_buffer() {
        let tmp = tempfile::tempdir().unwrap();
        let oversized = vec![0u8; AVATAR_LIMIT_BYTES + 1];
        let err = process_avatar(&oversized, Some("image/png"), tmp.path(), 1).unwrap_err();
        assert!(matches!(err, AppError::Upload(_)));
    }

    #[test]
    fn avatar_is_resized_to_square_png() {
        let tmp = tempfile::tempdir().unwrap();
        let filename =
            process_avatar(&png_bytes(64, 32), Some("image/png"), tmp.path(), 7).unwrap();
        assert!(filename.starts_with("user-7-"));
        assert!(filename.ends_with(".png"));

        let written = image::open(tmp.path().join(&filename)).unwrap();
        assert_eq!(written.width(), AVATAR_SIZE);
        assert_eq!(written.height(), AVATAR_SIZE);
    }

    #[test]
    fn delete_previous_avatar_ignores_missing_files() {
        let tmp = tempfile::tempdir().unwrap();
        // Must not panic or log an error for a file that is already gone
        delete_previous_avatar(tmp.path(), "uploads/avatars/user-1-123.png");

        std::fs::write(tmp.path().join("user-1-456.png"), b"x").unwrap();
        delete_previous_avatar(tmp.path(), "/uploads/avatars/user-1-456.png");
        assert!(!tmp.path().join("user-1-456.png").exists());
    }

    #[test]
    fn cleanup_files_removes_what_exists() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("orphan.mp3");
        std::fs::write(&path, b"audio").unwrap();
        cleanup_files(&[
            StoredFile {
                field_name: "questions[0][audio]".into(),
                disk_path: path.clone(),
                file_name: "orphan.mp3".into(),
            },
            StoredFile {
                field_name: "questions[1][audio]".into(),
                disk_path: tmp.path().join("never-written.mp3"),
                file_name: "never-written.mp3".into(),
            },
        ]);
        assert!(!path.exists());
    }
}
