use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Bytes,
    extract::{ConnectInfo, DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::json;

use crate::pipeline::{BatchCommitter, IngestError, IngestionResult};

/// Routes the device firmware and the upload screen call.
///
/// `POST /createSolarCharger` takes `{ "UID": ..., "data": [...] }`;
/// `POST /uploadSolarData/:file_name` takes a raw CSV export body.
pub fn router(committer: Arc<BatchCommitter>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/createSolarCharger", post(create_solar_charger))
        .route("/uploadSolarData/:file_name", post(upload_solar_data))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(committer)
}

pub async fn serve(bind_addr: &str, app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid api bind addr '{bind_addr}': {e}"))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "ingestion API listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

async fn create_solar_charger(
    State(committer): State<Arc<BatchCommitter>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    Json(batch): Json<crate::sources::RawBatch>,
) -> Result<Response, IngestError> {
    metrics::counter!("http_ingest_requests_total", "route" => "createSolarCharger").increment(1);

    let ip = peer.map(|ConnectInfo(addr)| addr.ip().to_string());
    let result = committer.ingest_batch(batch, ip.as_deref()).await?;
    Ok(success(result))
}

async fn upload_solar_data(
    State(committer): State<Arc<BatchCommitter>>,
    Path(file_name): Path<String>,
    peer: Option<ConnectInfo<SocketAddr>>,
    body: Bytes,
) -> Result<Response, IngestError> {
    metrics::counter!("http_ingest_requests_total", "route" => "uploadSolarData").increment(1);

    let ip = peer.map(|ConnectInfo(addr)| addr.ip().to_string());
    let result = committer.ingest_csv(&body, &file_name, ip.as_deref()).await?;
    Ok(success(result))
}

fn success(result: IngestionResult) -> Response {
    let body = json!({
        "status": 200,
        "message": result.message(),
        "inserted": result.inserted_count,
        "duplicates": result.duplicate_count,
        "skipped_rows": result.skipped_rows,
        "data": result.inserted_records,
    });
    (StatusCode::OK, Json(body)).into_response()
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let (status, body) = if self.is_retryable() {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "status": 500, "message": "Internal Server Error", "error": self.to_string() }),
            )
        } else {
            (
                StatusCode::BAD_REQUEST,
                json!({ "status": 400, "message": self.to_string() }),
            )
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::FixedClock, directory::StaticDeviceDirectory, pipeline::CommitterSettings,
        sinks::InMemoryReadingStore,
    };
    use axum::{body::Body, http::Request};
    use time::macros::datetime;
    use tower::ServiceExt;

    fn app(store: Arc<InMemoryReadingStore>) -> Router {
        let committer = BatchCommitter::new(
            store,
            Arc::new(StaticDeviceDirectory::new(["IND.RAJ.SHA001"])),
            Arc::new(FixedClock(datetime!(2024-06-01 12:00:00 UTC))),
            CommitterSettings::default(),
        );
        router(Arc::new(committer), 1024 * 1024)
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn push_returns_inserted_rows() {
        let store = Arc::new(InMemoryReadingStore::new());
        let req = Request::post("/createSolarCharger")
            .header("content-type", "application/json")
            .body(Body::from(
                r#"{"UID":"D1","data":[{"PvVolt":"14.2","RecordTime":"2024-01-01T00:00:00Z"}]}"#,
            ))
            .unwrap();

        let resp = app(store).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["inserted"], 1);
        assert_eq!(body["data"][0]["UID"], "D1");
        assert_eq!(body["data"][0]["PvVolt"], 14.2);
        assert_eq!(body["data"][0]["IP"], "Not Set");
    }

    #[tokio::test]
    async fn malformed_push_is_a_bad_request() {
        let store = Arc::new(InMemoryReadingStore::new());
        let req = Request::post("/createSolarCharger")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"UID":"D1","data":[]}"#))
            .unwrap();

        let resp = app(store).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["status"], 400);
    }

    #[tokio::test]
    async fn storage_failure_is_a_server_error() {
        let store = Arc::new(InMemoryReadingStore::new());
        store.set_fail_reads(true);
        let req = Request::post("/createSolarCharger")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"UID":"D1","data":[{"RecordTime":"2024-01-01T00:00:00Z"}]}"#))
            .unwrap();

        let resp = app(store).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn csv_upload_for_unregistered_device_is_a_bad_request() {
        let store = Arc::new(InMemoryReadingStore::new());
        let req = Request::post("/uploadSolarData/IND.RAJ.SHA999.csv")
            .body(Body::from("Date & Time,PV Voltage\n10:00:00 01/02/2024,12\n"))
            .unwrap();

        let resp = app(store).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert!(body["message"].as_str().unwrap().contains("IND.RAJ.SHA999"));
    }
}
