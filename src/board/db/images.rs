use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, params};

use super::BoardDb;
use crate::errors::BoardError;

/// Requested change to a workspace or project image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageInput {
    /// Field absent: keep whatever is stored.
    Unchanged,
    /// Empty string: drop the image.
    Clear,
    /// Externally hosted image, stored as a URL only.
    Url(String),
    /// `data:image/...` URL uploaded by the client, kept in the image store.
    Upload(String),
}

impl ImageInput {
    pub fn from_field(field: Option<String>) -> Result<Self, BoardError> {
        let Some(raw) = field else {
            return Ok(Self::Unchanged);
        };
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self::Clear);
        }
        if let Some(rest) = raw.strip_prefix("data:") {
            if !rest.starts_with("image/") || !rest.contains(',') {
                return Err(BoardError::validation("image must be an image data URL"));
            }
            return Ok(Self::Upload(raw.to_string()));
        }
        Ok(Self::Url(raw.to_string()))
    }
}

impl BoardDb {
    pub fn store_image(&self, content: &str) -> Result<i64> {
        self.conn
            .execute("INSERT INTO images (content) VALUES (?1)", params![content])
            .context("Failed to insert image")?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_image(&self, id: i64) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT content FROM images WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query image")
    }

    pub fn delete_image(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM images WHERE id = ?1", params![id])
            .context("Failed to delete image")?;
        Ok(affected > 0)
    }

    /// Apply `input` to an entity's current `(image_url, image_id)` pair and
    /// return the pair to store. A replaced or cleared upload is deleted.
    pub(crate) fn resolve_image(
        &self,
        current_url: Option<String>,
        current_id: Option<i64>,
        input: ImageInput,
    ) -> Result<(Option<String>, Option<i64>)> {
        let resolved = match input {
            ImageInput::Unchanged => return Ok((current_url, current_id)),
            ImageInput::Clear => (None, None),
            ImageInput::Url(url) => (Some(url), None),
            ImageInput::Upload(data) => {
                let id = self.store_image(&data)?;
                (Some(data), Some(id))
            }
        };
        if let Some(old) = current_id {
            self.delete_image(old)?;
        }
        Ok(resolved)
    }
}
