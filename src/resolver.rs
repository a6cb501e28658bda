// DID resolution: compose DID documents from the latest log entry

use crate::constants::RESPONSE_CONTEXT;
use crate::error::{MirageError, Result};
use crate::models::{PlcEntry, PlcOperation, PlcService};
use crate::multikey::format_key_and_context;
use serde::Serialize;
use std::collections::BTreeMap;

/// W3C DID document, the response shape of `GET /:didOrHandle`.
#[derive(Debug, Clone, Serialize)]
pub struct DidDocument {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    pub id: String,
    #[serde(rename = "alsoKnownAs")]
    pub also_known_as: Vec<String>,
    #[serde(rename = "verificationMethod")]
    pub verification_method: Vec<DocVerificationMethod>,
    pub service: Vec<DocService>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocVerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub method_type: String,
    pub controller: String,
    #[serde(rename = "publicKeyMultibase")]
    pub public_key_multibase: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocService {
    pub id: String,
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(rename = "serviceEndpoint")]
    pub service_endpoint: String,
}

/// PLC-native state of a DID, the response shape of `GET /:didOrHandle/data`.
#[derive(Debug, Clone, Serialize)]
pub struct PlcData {
    pub did: String,
    #[serde(rename = "verificationMethods")]
    pub verification_methods: BTreeMap<String, String>,
    #[serde(rename = "rotationKeys")]
    pub rotation_keys: Vec<String>,
    #[serde(rename = "alsoKnownAs")]
    pub also_known_as: Vec<String>,
    pub services: BTreeMap<String, PlcService>,
}

/// Build the DID document for the latest entry of a DID.
///
/// Tombstoned DIDs surface as `Gone`; the HTTP layer maps that to 404.
/// Legacy creates carry no verification methods or services, only the
/// asserted handle.
pub fn did_document(entry: &PlcEntry) -> Result<DidDocument> {
    let mut context: Vec<String> = RESPONSE_CONTEXT.iter().map(|c| c.to_string()).collect();
    let mut verification_method = Vec::new();
    let mut service = Vec::new();

    let also_known_as = match &entry.operation {
        PlcOperation::Tombstone(_) => return Err(MirageError::Gone),
        PlcOperation::Operation(op) => {
            for (kid, key) in &op.verification_methods {
                let kac = format_key_and_context(key)?;
                if !context.iter().any(|c| c == kac.context) {
                    context.push(kac.context.to_string());
                }
                verification_method.push(DocVerificationMethod {
                    id: format!("{}#{}", entry.did, kid),
                    method_type: "Multikey".to_string(),
                    controller: entry.did.clone(),
                    public_key_multibase: kac.public_key_multibase,
                });
            }

            for (id, svc) in &op.services {
                service.push(DocService {
                    id: format!("#{}", id),
                    service_type: svc.service_type.clone(),
                    service_endpoint: svc.endpoint.clone(),
                });
            }

            op.also_known_as.clone()
        }
        PlcOperation::LegacyCreate(create) => vec![create.handle.clone()],
    };

    Ok(DidDocument {
        context,
        id: entry.did.clone(),
        also_known_as,
        verification_method,
        service,
    })
}

/// PLC state for the data endpoint. Tombstones and legacy creates have no
/// multi-service state to report.
pub fn plc_data(entry: &PlcEntry) -> Option<PlcData> {
    match &entry.operation {
        PlcOperation::Operation(op) => Some(PlcData {
            did: entry.did.clone(),
            verification_methods: op.verification_methods.clone(),
            rotation_keys: op.rotation_keys.clone(),
            also_known_as: op.also_known_as.clone(),
            services: op.services.clone(),
        }),
        _ => None,
    }
}

/// The PDS endpoint asserted by the latest entry, if any.
pub fn service_endpoint(entry: &PlcEntry) -> Option<String> {
    match &entry.operation {
        PlcOperation::Operation(op) => {
            op.services.get("atproto_pds").map(|s| s.endpoint.clone())
        }
        PlcOperation::LegacyCreate(create) => Some(create.service.clone()),
        PlcOperation::Tombstone(_) => None,
    }
}
