use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Prefix shared by every metadata entity identifier, e.g. `urn:li:dataset:(...)`
const URN_PREFIX: &str = "urn:li:";

/// Content type assumed for an aspect whose record did not declare one
pub const DEFAULT_ASPECT_CONTENT_TYPE: &str = "application/json";

/// Kind of change a proposal requests for one aspect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Upsert,
    Delete,
    Patch,
    Restate,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Upsert => "UPSERT",
            ChangeKind::Delete => "DELETE",
            ChangeKind::Patch => "PATCH",
            ChangeKind::Restate => "RESTATE",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialized aspect value together with its declared content type
#[derive(Debug, Clone, PartialEq)]
pub struct AspectPayload {
    pub value: Bytes,
    pub content_type: String,
}

impl AspectPayload {
    pub fn new(value: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            content_type: content_type.into(),
        }
    }

    pub fn json(value: impl Into<Bytes>) -> Self {
        Self::new(value, DEFAULT_ASPECT_CONTENT_TYPE)
    }
}

/// Producer-supplied bookkeeping carried alongside a proposal
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SystemMetadata {
    pub run_id: Option<String>,
    pub last_observed_ms: Option<i64>,
    pub properties: BTreeMap<String, String>,
}

/// Canonical request to change one aspect of one entity in the metadata store
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub entity_urn: String,
    pub entity_type: String,
    pub aspect_name: String,
    pub change_kind: ChangeKind,
    pub aspect: Option<AspectPayload>,
    pub system_metadata: Option<SystemMetadata>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProposalValidationError {
    #[error("entity urn is empty")]
    EmptyEntityUrn,

    #[error("entity type is empty")]
    EmptyEntityType,

    #[error("aspect name is empty")]
    EmptyAspectName,

    #[error("entity type '{entity_type}' does not match urn type '{urn_type}'")]
    EntityTypeMismatch {
        urn_type: String,
        entity_type: String,
    },

    #[error("{0} proposal carries no aspect payload")]
    MissingAspect(ChangeKind),
}

impl Proposal {
    /// Check the structural invariants every proposal must satisfy before it
    /// is handed to the metadata service.
    pub fn validate(&self) -> Result<(), ProposalValidationError> {
        if self.entity_urn.trim().is_empty() {
            return Err(ProposalValidationError::EmptyEntityUrn);
        }
        if self.entity_type.trim().is_empty() {
            return Err(ProposalValidationError::EmptyEntityType);
        }
        if self.aspect_name.trim().is_empty() {
            return Err(ProposalValidationError::EmptyAspectName);
        }

        if let Some(urn_type) = entity_type_from_urn(&self.entity_urn) {
            if !urn_type.eq_ignore_ascii_case(&self.entity_type) {
                return Err(ProposalValidationError::EntityTypeMismatch {
                    urn_type: urn_type.to_string(),
                    entity_type: self.entity_type.clone(),
                });
            }
        }

        if self.aspect.is_none() && self.change_kind != ChangeKind::Delete {
            return Err(ProposalValidationError::MissingAspect(self.change_kind));
        }

        Ok(())
    }
}

/// Extract the entity type segment of a `urn:li:<type>:<key>` identifier.
///
/// Returns `None` for identifiers without that shape; those are treated as
/// opaque and carry no type information.
pub fn entity_type_from_urn(urn: &str) -> Option<&str> {
    let rest = urn.strip_prefix(URN_PREFIX)?;
    let (entity_type, key) = rest.split_once(':')?;
    if entity_type.is_empty() || key.is_empty() {
        return None;
    }
    Some(entity_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal(urn: &str, entity_type: &str, kind: ChangeKind) -> Proposal {
        Proposal {
            entity_urn: urn.to_string(),
            entity_type: entity_type.to_string(),
            aspect_name: "status".to_string(),
            change_kind: kind,
            aspect: Some(AspectPayload::json(r#"{"removed":false}"#)),
            system_metadata: None,
        }
    }

    #[test]
    fn test_entity_type_from_urn() {
        assert_eq!(
            entity_type_from_urn("urn:li:dataset:(urn:li:dataPlatform:hive,db.t,PROD)"),
            Some("dataset")
        );
        assert_eq!(entity_type_from_urn("urn:li:corpuser:jdoe"), Some("corpuser"));
        assert_eq!(entity_type_from_urn("entityA"), None);
        assert_eq!(entity_type_from_urn("urn:li:dataset"), None);
        assert_eq!(entity_type_from_urn("urn:li::key"), None);
    }

    #[test]
    fn test_validate_accepts_consistent_urn() {
        let p = proposal("urn:li:corpuser:jdoe", "corpuser", ChangeKind::Upsert);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_validate_is_case_insensitive_on_type() {
        let p = proposal("urn:li:dataFlow:(airflow,etl,prod)", "dataflow", ChangeKind::Upsert);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_validate_accepts_opaque_identifier() {
        let p = proposal("entityA", "dataset", ChangeKind::Upsert);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_type_mismatch() {
        let p = proposal("urn:li:corpuser:jdoe", "dataset", ChangeKind::Upsert);
        assert_eq!(
            p.validate(),
            Err(ProposalValidationError::EntityTypeMismatch {
                urn_type: "corpuser".to_string(),
                entity_type: "dataset".to_string(),
            })
        );
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        let mut p = proposal("", "dataset", ChangeKind::Upsert);
        assert_eq!(p.validate(), Err(ProposalValidationError::EmptyEntityUrn));

        p.entity_urn = "entityA".to_string();
        p.entity_type = " ".to_string();
        assert_eq!(p.validate(), Err(ProposalValidationError::EmptyEntityType));

        p.entity_type = "dataset".to_string();
        p.aspect_name = String::new();
        assert_eq!(p.validate(), Err(ProposalValidationError::EmptyAspectName));
    }

    #[test]
    fn test_validate_payload_only_optional_for_delete() {
        let mut p = proposal("entityA", "dataset", ChangeKind::Patch);
        p.aspect = None;
        assert_eq!(
            p.validate(),
            Err(ProposalValidationError::MissingAspect(ChangeKind::Patch))
        );

        p.change_kind = ChangeKind::Delete;
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_change_kind_display() {
        assert_eq!(ChangeKind::Restate.to_string(), "RESTATE");
        assert_eq!(ChangeKind::Upsert.as_str(), "UPSERT");
    }
}
