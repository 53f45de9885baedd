//! Endpoint handlers, one module per route group.

pub mod health;
pub mod pharmacy;
pub mod prescriptions;

use axum::body::Bytes;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::models::fields::RequestBody;

/// Hand the raw JSON body to the service, which decodes it once the caller
/// is authorised. An empty body reads as the default value.
pub(crate) fn request_body<T>(body: Bytes) -> RequestBody<T> {
    RequestBody::Raw(body.to_vec())
}

/// Path identifiers that are not UUIDs cannot name a stored record.
pub(crate) fn parse_id(raw: &str, not_found: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound(not_found.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispensing::DispenseInput;

    #[test]
    fn empty_body_reads_as_default() {
        let body: RequestBody<DispenseInput> = request_body(Bytes::from_static(b"  "));
        let input = body.decode().unwrap();
        assert_eq!(input.quantity_dispensed, None);
        assert_eq!(input.status, None);
    }

    #[test]
    fn malformed_body_fails_on_decode() {
        let body: RequestBody<DispenseInput> = request_body(Bytes::from_static(b"{not json"));
        assert!(body.decode().is_err());
    }

    #[test]
    fn non_uuid_id_is_not_found() {
        assert!(matches!(
            parse_id("64b7f0c2e4b0a1a2b3c4d5e6", "Prescription not found"),
            Err(ApiError::NotFound(_))
        ));
        assert!(parse_id(&Uuid::new_v4().to_string(), "x").is_ok());
    }
}
