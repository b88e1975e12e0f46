use std::fmt;
use std::sync::Arc;

use reqwest::Method;
use tracing::{info, warn};
use url::{ParseError, Url};

use crate::config::Credentials;

use super::error::{UploadError, UploadResult};
use super::models::UploadSession;
use super::transport::{
    TransportRequest, UploadTransport, LOCATION, STREAM_MEDIA_ID, UPLOAD_LENGTH, UPLOAD_OFFSET,
};

/// Opens and inspects resumable upload sessions.
#[derive(Clone)]
pub struct SessionNegotiator {
    transport: Arc<dyn UploadTransport>,
    credentials: Credentials,
    api_base: String,
}

impl fmt::Debug for SessionNegotiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionNegotiator")
            .field("create_url", &self.create_url())
            .field("credentials", &self.credentials)
            .finish()
    }
}

impl SessionNegotiator {
    pub fn new(
        transport: Arc<dyn UploadTransport>,
        credentials: Credentials,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            credentials,
            api_base: api_base.into(),
        }
    }

    pub fn create_url(&self) -> String {
        format!(
            "{}/accounts/{}/stream",
            self.api_base.trim_end_matches('/'),
            self.credentials.account_id
        )
    }

    /// Declares an upload of `file_size` bytes and returns the session handle.
    ///
    /// Only 200 and 201 are accepted. An absolute `Location` is stored
    /// verbatim; a relative one is resolved against the create URL.
    pub async fn open(&self, file_size: u64) -> UploadResult<UploadSession> {
        let create_url = self.create_url();
        let base = Url::parse(&create_url)?;
        let request = TransportRequest::new(Method::POST, &create_url)
            .bearer(&self.credentials.api_token)
            .tus()
            .header(UPLOAD_LENGTH, file_size);

        info!(file_size, "initiating upload session");
        let response = self.transport.send(request).await?;
        if !matches!(response.status, 200 | 201) {
            warn!(status = response.status, "upload session rejected");
            return Err(UploadError::SessionInitFailed {
                status: response.status,
                body: response.body,
            });
        }

        let location = response
            .header(LOCATION)
            .ok_or(UploadError::MissingHeader { name: LOCATION })?;
        let content_id = response
            .header(STREAM_MEDIA_ID)
            .ok_or(UploadError::MissingHeader {
                name: STREAM_MEDIA_ID,
            })?;
        let endpoint = resolve_endpoint(&base, location)?;

        info!(endpoint = %endpoint, content_id, "upload session opened");
        Ok(UploadSession {
            endpoint,
            content_id: content_id.to_string(),
            total_length: file_size,
        })
    }

    /// Asks the server how many bytes of `session` it has durably received.
    pub async fn query_offset(&self, session: &UploadSession) -> UploadResult<u64> {
        let request = TransportRequest::new(Method::HEAD, &session.endpoint)
            .bearer(&self.credentials.api_token)
            .tus();
        let response = self.transport.send(request).await?;
        if !matches!(response.status, 200 | 204) {
            return Err(UploadError::OffsetQueryFailed {
                status: response.status,
                body: response.body,
            });
        }
        let value = response
            .header(UPLOAD_OFFSET)
            .ok_or(UploadError::MissingHeader {
                name: UPLOAD_OFFSET,
            })?;
        let offset = parse_offset(value)?;
        if offset > session.total_length {
            return Err(UploadError::OffsetOutOfRange {
                chunk_index: 0,
                previous: 0,
                reported: offset,
                total: session.total_length,
            });
        }
        info!(content_id = %session.content_id, offset, "server confirmed offset");
        Ok(offset)
    }
}

fn resolve_endpoint(base: &Url, location: &str) -> UploadResult<String> {
    match Url::parse(location) {
        Err(ParseError::RelativeUrlWithoutBase) => Ok(base.join(location)?.to_string()),
        _ => Ok(location.to_string()),
    }
}

pub(crate) fn parse_offset(value: &str) -> UploadResult<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| UploadError::InvalidOffsetHeader {
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::transport::{TransportResponse, TUS_RESUMABLE};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct OneShot {
        response: TransportResponse,
        seen: Mutex<Vec<TransportRequest>>,
    }

    #[async_trait]
    impl UploadTransport for OneShot {
        async fn send(&self, request: TransportRequest) -> UploadResult<TransportResponse> {
            self.seen.lock().unwrap().push(request);
            Ok(self.response.clone())
        }
    }

    fn negotiator(response: TransportResponse) -> (SessionNegotiator, Arc<OneShot>) {
        let transport = Arc::new(OneShot {
            response,
            seen: Mutex::new(Vec::new()),
        });
        let negotiator = SessionNegotiator::new(
            transport.clone(),
            Credentials::new("acct", "tok"),
            "https://api.test/client/v4/",
        );
        (negotiator, transport)
    }

    #[tokio::test]
    async fn open_declares_length_and_reads_headers() {
        let (negotiator, transport) = negotiator(
            TransportResponse::new(201)
                .with_header("location", "https://upload.test/tus/xyz")
                .with_header("stream-media-id", "xyz"),
        );
        let session = negotiator.open(4096).await.unwrap();
        assert_eq!(session.endpoint, "https://upload.test/tus/xyz");
        assert_eq!(session.content_id, "xyz");
        assert_eq!(session.total_length, 4096);

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, Method::POST);
        assert_eq!(seen[0].url, "https://api.test/client/v4/accounts/acct/stream");
        assert_eq!(seen[0].header_value(UPLOAD_LENGTH), Some("4096"));
        assert_eq!(seen[0].header_value(TUS_RESUMABLE), Some("1.0.0"));
        assert_eq!(seen[0].header_value("Authorization"), Some("Bearer tok"));
    }

    #[tokio::test]
    async fn relative_location_resolves_against_api() {
        let (negotiator, _) = negotiator(
            TransportResponse::new(200)
                .with_header("Location", "/tus/abc")
                .with_header("stream-media-id", "abc"),
        );
        let session = negotiator.open(1).await.unwrap();
        assert_eq!(session.endpoint, "https://api.test/tus/abc");
    }

    #[tokio::test]
    async fn absolute_location_is_kept_byte_for_byte() {
        for location in [
            "https://Upload.TEST",
            "https://upload.test/tus/a b",
            "http://[bad",
        ] {
            let (negotiator, _) = negotiator(
                TransportResponse::new(201)
                    .with_header("Location", location)
                    .with_header("stream-media-id", "abc"),
            );
            let session = negotiator.open(1).await.unwrap();
            assert_eq!(session.endpoint, location);
        }
    }

    #[tokio::test]
    async fn malformed_api_base_fails_before_any_request() {
        let transport = Arc::new(OneShot {
            response: TransportResponse::new(201),
            seen: Mutex::new(Vec::new()),
        });
        let negotiator =
            SessionNegotiator::new(transport.clone(), Credentials::new("acct", "tok"), "not a url");
        assert!(matches!(
            negotiator.open(1).await,
            Err(UploadError::InvalidUrl(_))
        ));
        assert!(transport.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_success_status_fails() {
        let (negotiator, _) = negotiator(TransportResponse::new(403).with_body("forbidden"));
        match negotiator.open(10).await {
            Err(UploadError::SessionInitFailed { status, body }) => {
                assert_eq!(status, 403);
                assert_eq!(body, "forbidden");
            }
            other => panic!("expected SessionInitFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn accepted_status_without_location_fails() {
        let (negotiator, _) =
            negotiator(TransportResponse::new(201).with_header("stream-media-id", "abc"));
        assert!(matches!(
            negotiator.open(10).await,
            Err(UploadError::MissingHeader { name: LOCATION })
        ));
    }

    #[tokio::test]
    async fn query_offset_reads_upload_offset() {
        let (negotiator, transport) =
            negotiator(TransportResponse::new(200).with_header("Upload-Offset", "2048"));
        let session = UploadSession {
            endpoint: "https://upload.test/tus/xyz".into(),
            content_id: "xyz".into(),
            total_length: 4096,
        };
        assert_eq!(negotiator.query_offset(&session).await.unwrap(), 2048);
        assert_eq!(transport.seen.lock().unwrap()[0].method, Method::HEAD);
    }

    #[tokio::test]
    async fn query_offset_rejects_gone_session() {
        let (negotiator, _) = negotiator(TransportResponse::new(404));
        let session = UploadSession {
            endpoint: "https://upload.test/tus/xyz".into(),
            content_id: "xyz".into(),
            total_length: 4096,
        };
        assert!(matches!(
            negotiator.query_offset(&session).await,
            Err(UploadError::OffsetQueryFailed { status: 404, .. })
        ));
    }

    #[test]
    fn parse_offset_rejects_garbage() {
        assert_eq!(parse_offset(" 17 ").unwrap(), 17);
        assert!(matches!(
            parse_offset("-1"),
            Err(UploadError::InvalidOffsetHeader { .. })
        ));
    }
}
