use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{debug, error};

use super::proto::analytics_service_server::{AnalyticsService, AnalyticsServiceServer};
use super::proto::{RecordClickRequest, RecordClickResponse};
use crate::analytics::AnalyticsRepository;
use crate::models::ClickInfo;

/// `analytics.AnalyticsService` backed by the analytics repository.
pub struct AnalyticsGrpcService {
    repo: Arc<AnalyticsRepository>,
}

impl AnalyticsGrpcService {
    pub fn new(repo: Arc<AnalyticsRepository>) -> Self {
        Self { repo }
    }
}

#[tonic::async_trait]
impl AnalyticsService for AnalyticsGrpcService {
    async fn record_click(
        &self,
        request: Request<RecordClickRequest>,
    ) -> Result<Response<RecordClickResponse>, Status> {
        let RecordClickRequest { short_link, click } = request.into_inner();

        let short_link = short_link.trim();
        if short_link.is_empty() {
            return Err(Status::invalid_argument("short_link must not be empty"));
        }

        // Older clients may omit the click details
        let click = click.map(ClickInfo::from).unwrap_or_default();

        match self.repo.record_click(short_link, &click).await {
            Ok(_) => {
                debug!(short_link, "RecordClick handled");
                Ok(Response::new(RecordClickResponse { success: true }))
            }
            Err(err) => {
                error!(short_link, error = %err, "failed to record click");
                Err(Status::internal("failed to record click"))
            }
        }
    }
}

pub fn analytics_grpc_service(
    repo: Arc<AnalyticsRepository>,
) -> AnalyticsServiceServer<AnalyticsGrpcService> {
    AnalyticsServiceServer::new(AnalyticsGrpcService::new(repo))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{AnalyticsStore, SqliteAnalyticsStorage};
    use crate::rpc::proto::ClickModel;
    use tonic::Code;

    async fn service() -> (AnalyticsGrpcService, Arc<AnalyticsRepository>) {
        let storage = SqliteAnalyticsStorage::new("sqlite::memory:", 1).await.unwrap();
        storage.init().await.unwrap();
        let repo = Arc::new(AnalyticsRepository::new(Arc::new(storage)));
        (AnalyticsGrpcService::new(Arc::clone(&repo)), repo)
    }

    #[tokio::test]
    async fn test_record_click_persists_event() {
        let (service, repo) = service().await;

        let response = service
            .record_click(Request::new(RecordClickRequest {
                short_link: "AbCd1234".to_string(),
                click: Some(ClickModel {
                    ip: "203.0.113.7".to_string(),
                    city: "Lisbon".to_string(),
                    country: "PT".to_string(),
                }),
            }))
            .await
            .unwrap();
        assert!(response.into_inner().success);

        let record = repo.get("AbCd1234").await.unwrap().unwrap();
        assert_eq!(record.clicks.len(), 1);
        assert_eq!(record.clicks[0].country, "PT");
    }

    #[tokio::test]
    async fn test_missing_click_uses_unknown_values() {
        let (service, repo) = service().await;

        service
            .record_click(Request::new(RecordClickRequest {
                short_link: "AbCd1234".to_string(),
                click: None,
            }))
            .await
            .unwrap();

        let record = repo.get("AbCd1234").await.unwrap().unwrap();
        assert_eq!(record.clicks[0].ip, "0.0.0.0");
        assert_eq!(record.clicks[0].city, "unknown");
    }

    #[tokio::test]
    async fn test_empty_short_link_is_invalid_argument() {
        let (service, _) = service().await;

        let status = service
            .record_click(Request::new(RecordClickRequest {
                short_link: "  ".to_string(),
                click: None,
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
    }
}
