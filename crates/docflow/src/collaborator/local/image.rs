use std::io::Cursor;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};

use crate::collaborator::{ChunkProcessor, CollaboratorError};
use crate::model::{ChunkKind, ChunkRef, ProcessedChunk};
use crate::storage::LocalObjectStore;

use super::{processed_location, run_blocking};

/// Converts an image chunk to a grayscale PNG.
pub struct LocalImageProcessor {
    store: LocalObjectStore,
}

impl LocalImageProcessor {
    pub fn new(store: LocalObjectStore) -> Self {
        Self { store }
    }
}

fn to_grayscale_png(data: &[u8]) -> Result<Vec<u8>, CollaboratorError> {
    let img = image::load_from_memory(data)
        .map_err(|e| CollaboratorError::new(format!("Failed to load image: {}", e)))?;

    let gray = DynamicImage::ImageLuma8(img.to_luma8());
    let mut buf = Vec::new();
    gray.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| CollaboratorError::new(format!("Failed to encode PNG: {}", e)))?;
    Ok(buf)
}

#[async_trait]
impl ChunkProcessor for LocalImageProcessor {
    async fn process(&self, chunk: &ChunkRef) -> Result<ProcessedChunk, CollaboratorError> {
        if chunk.kind != ChunkKind::Image {
            return Err(CollaboratorError::new(format!(
                "chunk {} is not an image chunk",
                chunk.id
            )));
        }

        let store = self.store.clone();
        let location = chunk.location.clone();
        let output = processed_location(&chunk.location, "png");
        let target = output.clone();

        // Decoding is CPU bound.
        run_blocking("processor.image", move || {
            let data = store.get(&location)?;
            let png = to_grayscale_png(&data)?;
            store.put(&target, &png)?;
            Ok(())
        })
        .await?;

        Ok(ProcessedChunk {
            chunk_id: chunk.id.clone(),
            kind: ChunkKind::Image,
            output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObjectLocation;
    use image::{GenericImageView, Rgb, RgbImage};
    use tempfile::TempDir;

    fn sample_png() -> Vec<u8> {
        let img = RgbImage::from_fn(4, 3, |x, _| Rgb([(x * 60) as u8, 10, 200]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn test_process_writes_grayscale_png() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp_dir.path());
        let location = ObjectLocation::new("derived", "scan.png/image/1.png");
        store.put(&location, &sample_png()).unwrap();

        let processor = LocalImageProcessor::new(store.clone());
        let result = processor
            .process(&ChunkRef::image("i1", location))
            .await
            .unwrap();

        assert_eq!(result.chunk_id.as_str(), "i1");
        assert_eq!(result.output.key, "scan.png/image/1.processed.png");

        let written = image::load_from_memory(&store.get(&result.output).unwrap()).unwrap();
        assert_eq!(written.dimensions(), (4, 3));
        assert!(matches!(written, DynamicImage::ImageLuma8(_)));
    }

    #[tokio::test]
    async fn test_undecodable_image_fails() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp_dir.path());
        let location = ObjectLocation::new("derived", "bad.png/image/1.png");
        store.put(&location, b"garbage").unwrap();

        let processor = LocalImageProcessor::new(store);
        let err = processor
            .process(&ChunkRef::image("i1", location))
            .await
            .unwrap_err();
        assert!(err.message.contains("Failed to load image"));
    }
}
