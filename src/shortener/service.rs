use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{ClickInfo, UrlRecord};
use crate::rpc::{spawn_click_report, ClickRecorder};
use crate::shortener::code::{CodeGenerator, Sha256CodeGenerator};
use crate::storage::{StorageError, UrlRepository};
use crate::validation::{validate_short_code, validate_url, ValidationError};

/// Candidate codes tried before giving up on a shorten request.
pub const MAX_CODE_ATTEMPTS: u32 = 5;

#[derive(Debug, Error)]
pub enum ShortenerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Short link '{0}' not found")]
    NotFound(String),
    #[error("Failed to generate a unique short link after {attempts} attempts")]
    CollisionExhausted { attempts: u32 },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type ShortenerResult<T> = Result<T, ShortenerError>;

/// Shortens, resolves and deletes links, reporting resolved clicks to the
/// analytics service in the background.
pub struct ShortenerService {
    repository: Arc<UrlRepository>,
    recorder: Arc<dyn ClickRecorder>,
    generator: Arc<dyn CodeGenerator>,
}

impl ShortenerService {
    pub fn new(repository: Arc<UrlRepository>, recorder: Arc<dyn ClickRecorder>) -> Self {
        Self {
            repository,
            recorder,
            generator: Arc::new(Sha256CodeGenerator),
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn CodeGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn repository(&self) -> &Arc<UrlRepository> {
        &self.repository
    }

    /// Shorten `url`. A URL that is already shortened keeps its code; a
    /// candidate code taken by a different URL is discarded and a new one
    /// generated, never overwriting the existing mapping.
    pub async fn shorten(&self, url: &str) -> ShortenerResult<UrlRecord> {
        let url = validate_url(url)?;

        if let Some(existing) = self.repository.find_by_url(&url).await? {
            info!(short_code = %existing.short_code, "URL already shortened");
            return Ok(existing);
        }

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let code = self.generator.generate(&url);

            match self.repository.get(&code).await? {
                None => match self.repository.create(&code, &url).await {
                    Ok(record) => {
                        info!(short_code = %record.short_code, "created short link");
                        return Ok(record);
                    }
                    // Taken by a different URL between the lookup and the insert
                    Err(StorageError::Conflict) => {}
                    Err(err) => return Err(err.into()),
                },
                Some(existing) if existing.target_url == url => {
                    info!(short_code = %code, "URL already shortened");
                    return Ok(existing);
                }
                Some(_) => {}
            }

            warn!(
                short_code = %code,
                attempt,
                max_attempts = MAX_CODE_ATTEMPTS,
                "short code collision"
            );
        }

        Err(ShortenerError::CollisionExhausted {
            attempts: MAX_CODE_ATTEMPTS,
        })
    }

    /// Look up a short code and, when it exists, report the click without
    /// waiting for the analytics service.
    pub async fn resolve(&self, short_code: &str, click: ClickInfo) -> ShortenerResult<UrlRecord> {
        validate_short_code(short_code)?;

        let record = self
            .repository
            .get(short_code)
            .await?
            .ok_or_else(|| ShortenerError::NotFound(short_code.to_string()))?;

        spawn_click_report(Arc::clone(&self.recorder), short_code.to_string(), click);

        Ok(record)
    }

    pub async fn list(&self) -> ShortenerResult<Vec<UrlRecord>> {
        Ok(self.repository.list().await?)
    }

    /// Deleting an unknown code is not an error.
    pub async fn delete(&self, short_code: &str) -> ShortenerResult<()> {
        validate_short_code(short_code)?;
        Ok(self.repository.delete(short_code).await?)
    }

    pub async fn ping(&self) -> ShortenerResult<()> {
        Ok(self.repository.ping().await?)
    }
}
