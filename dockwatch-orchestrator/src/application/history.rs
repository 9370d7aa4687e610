//! Scan history queries

use std::sync::Arc;

use crate::application::errors::{ApplicationError, BAD_IMAGE_NAME, BAD_SCAN_ID, HISTORY_NOT_FOUND};
use crate::domain::{HistoryStore, ScanId, ScanRecord};

pub struct ScanHistoryService {
    history: Arc<dyn HistoryStore>,
}

impl ScanHistoryService {
    pub fn new(history: Arc<dyn HistoryStore>) -> Self {
        Self { history }
    }

    /// History of `image_name`, most recent first, optionally narrowed to one id.
    pub async fn history(
        &self,
        image_name: &str,
        id: Option<&str>,
    ) -> Result<Vec<ScanRecord>, ApplicationError> {
        let image_name = image_name.trim();
        if image_name.is_empty() {
            return Err(ApplicationError::InvalidInput(BAD_IMAGE_NAME.to_string()));
        }

        let id = id
            .map(|raw| {
                raw.trim()
                    .parse::<ScanId>()
                    .map_err(|_| ApplicationError::InvalidInput(BAD_SCAN_ID.to_string()))
            })
            .transpose()?;

        let records = self.history.find_history(image_name, id).await?;
        if records.is_empty() {
            return Err(ApplicationError::NotFound(HISTORY_NOT_FOUND.to_string()));
        }
        Ok(records)
    }
}
