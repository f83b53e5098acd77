use anyhow::{Context, Result};
use async_trait::async_trait;
use common::{AspectPayload, Identity, IngestError, Proposal, ProposalSink, SystemMetadata};
use reqwest::StatusCode;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, instrument};

const INGEST_PATH: &str = "/aspects?action=ingestProposal";
const RESTLI_PROTOCOL_HEADER: &str = "X-RestLi-Protocol-Version";
const RESTLI_PROTOCOL_VERSION: &str = "2.0.0";

/// Proposal sink backed by the metadata service's REST ingest endpoint
pub struct MetadataServiceSink {
    http: reqwest::Client,
    ingest_url: String,
}

impl MetadataServiceSink {
    /// `timeout` bounds the whole request, including reading the response
    pub fn new(gms_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build metadata service HTTP client")?;

        Ok(Self {
            http,
            ingest_url: format!("{}{}", gms_url.trim_end_matches('/'), INGEST_PATH),
        })
    }
}

#[async_trait]
impl ProposalSink for MetadataServiceSink {
    #[instrument(
        skip_all,
        fields(entity_urn = %proposal.entity_urn, aspect = %proposal.aspect_name)
    )]
    async fn ingest(&self, proposal: &Proposal, identity: &Identity) -> Result<(), IngestError> {
        let body = IngestProposalRequest::try_from(proposal)?;
        let response = self
            .http
            .post(&self.ingest_url)
            .header(reqwest::header::AUTHORIZATION, identity.authorization_header())
            .header(RESTLI_PROTOCOL_HEADER, RESTLI_PROTOCOL_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| IngestError::transient(format!("request failed: {e}")))?;

        let status = response.status();
        if let Some(error) = classify_status(status) {
            let body = response.text().await.unwrap_or_default();
            debug!(status = %status, body = %body, "metadata service rejected proposal");
            return Err(match error {
                IngestError::Permanent(reason) if !body.is_empty() => {
                    IngestError::Permanent(format!("{reason}: {body}"))
                }
                other => other,
            });
        }

        debug!(status = %status, "proposal accepted");
        Ok(())
    }
}

/// Map a response status to an ingest failure; `None` means success.
///
/// Overload and request timeouts are worth retrying, every other client
/// error would fail the same way again.
pub fn classify_status(status: StatusCode) -> Option<IngestError> {
    if status.is_success() {
        return None;
    }

    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        Some(IngestError::transient(status.to_string()))
    } else {
        Some(IngestError::permanent(status.to_string()))
    }
}

#[derive(Debug, Serialize)]
struct IngestProposalRequest<'a> {
    proposal: ProposalBody<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProposalBody<'a> {
    entity_urn: &'a str,
    entity_type: &'a str,
    aspect_name: &'a str,
    change_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    aspect: Option<AspectBody<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_metadata: Option<SystemMetadataBody<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AspectBody<'a> {
    value: &'a str,
    content_type: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SystemMetadataBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    run_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_observed: Option<i64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    properties: &'a BTreeMap<String, String>,
}

impl<'a> TryFrom<&'a Proposal> for IngestProposalRequest<'a> {
    type Error = IngestError;

    fn try_from(proposal: &'a Proposal) -> Result<Self, Self::Error> {
        Ok(Self {
            proposal: ProposalBody {
                entity_urn: &proposal.entity_urn,
                entity_type: &proposal.entity_type,
                aspect_name: &proposal.aspect_name,
                change_type: proposal.change_kind.as_str(),
                aspect: proposal.aspect.as_ref().map(aspect_body).transpose()?,
                system_metadata: proposal.system_metadata.as_ref().map(system_metadata_body),
            },
        })
    }
}

/// The endpoint carries aspects as JSON strings; bytes that are not UTF-8 are rejected, never rewritten
fn aspect_body(aspect: &AspectPayload) -> Result<AspectBody<'_>, IngestError> {
    let value = std::str::from_utf8(&aspect.value).map_err(|e| {
        IngestError::permanent(format!(
            "aspect value is not valid UTF-8 for content type {}: {e}",
            aspect.content_type
        ))
    })?;

    Ok(AspectBody {
        value,
        content_type: &aspect.content_type,
    })
}

fn system_metadata_body(metadata: &SystemMetadata) -> SystemMetadataBody<'_> {
    SystemMetadataBody {
        run_id: metadata.run_id.as_deref(),
        last_observed: metadata.last_observed_ms,
        properties: &metadata.properties,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ChangeKind;
    use bytes::Bytes;
    use serde_json::json;

    fn proposal() -> Proposal {
        Proposal {
            entity_urn: "urn:li:dataset:(urn:li:dataPlatform:kafka,events,PROD)".to_string(),
            entity_type: "dataset".to_string(),
            aspect_name: "status".to_string(),
            change_kind: ChangeKind::Upsert,
            aspect: Some(AspectPayload::json(r#"{"removed":false}"#)),
            system_metadata: Some(SystemMetadata {
                run_id: Some("ingest-2024-01-01".to_string()),
                last_observed_ms: Some(1_700_000_000_000),
                properties: BTreeMap::new(),
            }),
        }
    }

    #[test]
    fn test_request_body_shape() {
        let proposal = proposal();
        let body = serde_json::to_value(IngestProposalRequest::try_from(&proposal).unwrap()).unwrap();

        assert_eq!(
            body,
            json!({
                "proposal": {
                    "entityUrn": "urn:li:dataset:(urn:li:dataPlatform:kafka,events,PROD)",
                    "entityType": "dataset",
                    "aspectName": "status",
                    "changeType": "UPSERT",
                    "aspect": {
                        "value": "{\"removed\":false}",
                        "contentType": "application/json"
                    },
                    "systemMetadata": {
                        "runId": "ingest-2024-01-01",
                        "lastObserved": 1_700_000_000_000i64
                    }
                }
            })
        );
    }

    #[test]
    fn test_delete_without_aspect_omits_field() {
        let proposal = Proposal {
            change_kind: ChangeKind::Delete,
            aspect: None,
            system_metadata: None,
            ..proposal()
        };
        let body = serde_json::to_value(IngestProposalRequest::try_from(&proposal).unwrap()).unwrap();

        assert_eq!(body["proposal"]["changeType"], "DELETE");
        assert!(body["proposal"].get("aspect").is_none());
        assert!(body["proposal"].get("systemMetadata").is_none());
    }

    #[test]
    fn test_non_utf8_aspect_is_rejected_as_permanent() {
        let proposal = Proposal {
            aspect: Some(AspectPayload::new(
                Bytes::from_static(&[0x08, 0x96, 0x01]),
                "application/x-protobuf",
            )),
            ..proposal()
        };

        let err = IngestProposalRequest::try_from(&proposal).unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("application/x-protobuf"));
        assert_eq!(
            proposal.aspect.unwrap().value,
            Bytes::from_static(&[0x08, 0x96, 0x01])
        );
    }

    #[tokio::test]
    async fn test_non_utf8_aspect_fails_before_sending() {
        let sink = MetadataServiceSink::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        let identity = Identity::new("urn:li:corpuser:system", "system", "secret");
        let proposal = Proposal {
            aspect: Some(AspectPayload::new(
                Bytes::from_static(&[0xff, 0xfe]),
                "application/json",
            )),
            ..proposal()
        };

        let err = sink.ingest(&proposal, &identity).await.unwrap_err();
        assert!(matches!(err, IngestError::Permanent(_)));
    }

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::OK).is_none());
        assert!(classify_status(StatusCode::CREATED).is_none());

        for transient in [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::REQUEST_TIMEOUT,
            StatusCode::TOO_MANY_REQUESTS,
        ] {
            assert!(
                classify_status(transient).unwrap().is_transient(),
                "{transient} should be transient"
            );
        }

        for permanent in [
            StatusCode::BAD_REQUEST,
            StatusCode::UNAUTHORIZED,
            StatusCode::NOT_FOUND,
            StatusCode::UNPROCESSABLE_ENTITY,
        ] {
            assert!(
                !classify_status(permanent).unwrap().is_transient(),
                "{permanent} should be permanent"
            );
        }
    }

    #[test]
    fn test_ingest_url_trims_trailing_slash() {
        let sink = MetadataServiceSink::new("http://gms:8080/", Duration::from_secs(1)).unwrap();
        assert_eq!(sink.ingest_url, "http://gms:8080/aspects?action=ingestProposal");
    }

    #[tokio::test]
    async fn test_connection_failure_is_transient() {
        let sink = MetadataServiceSink::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        let identity = Identity::new("urn:li:corpuser:system", "system", "secret");

        let err = sink.ingest(&proposal(), &identity).await.unwrap_err();
        assert!(err.is_transient());
    }
}
