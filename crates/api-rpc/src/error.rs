//! RPC Error Types
//!
//! Maps application errors and admission rejections to JSON-RPC error codes.

use auditdesk_core::application::{QuotaError, RejectReason};
use auditdesk_core::error::AppError;
use jsonrpsee::types::ErrorObjectOwned;
use serde_json::json;

/// RPC Error Codes
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const NOT_FOUND: i32 = 4001;
    pub const CONFLICT: i32 = 4002;
    pub const UNAUTHORIZED: i32 = 4010;
    pub const LIMIT_REACHED: i32 = 4029;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const DB_ERROR: i32 = 5001;
    pub const SERVICE_UNAVAILABLE: i32 = 5003;
}

/// Convert AppError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    match err {
        AppError::Validation(msg) => {
            ErrorObjectOwned::owned(code::VALIDATION_ERROR, msg, None::<()>)
        }
        AppError::Domain(e) => {
            ErrorObjectOwned::owned(code::VALIDATION_ERROR, e.to_string(), None::<()>)
        }
        AppError::Serialization(e) => {
            ErrorObjectOwned::owned(code::VALIDATION_ERROR, e.to_string(), None::<()>)
        }
        AppError::NotFound(msg) => ErrorObjectOwned::owned(code::NOT_FOUND, msg, None::<()>),
        AppError::Conflict(msg) => ErrorObjectOwned::owned(code::CONFLICT, msg, None::<()>),
        AppError::InvalidState(msg) => ErrorObjectOwned::owned(code::CONFLICT, msg, None::<()>),
        AppError::Unauthorized(msg) => {
            ErrorObjectOwned::owned(code::UNAUTHORIZED, msg, None::<()>)
        }
        AppError::Database(msg) => ErrorObjectOwned::owned(code::DB_ERROR, msg, None::<()>),
        AppError::Gateway(e) => {
            ErrorObjectOwned::owned(code::SERVICE_UNAVAILABLE, e.to_string(), None::<()>)
        }
        AppError::Config(msg) => ErrorObjectOwned::owned(code::INTERNAL_ERROR, msg, None::<()>),
        AppError::Internal(msg) => ErrorObjectOwned::owned(code::INTERNAL_ERROR, msg, None::<()>),
    }
}

/// Quota store failures surface as datastore errors
pub fn quota_to_rpc_error(err: QuotaError) -> ErrorObjectOwned {
    match err {
        QuotaError::Unavailable(msg) => ErrorObjectOwned::owned(code::DB_ERROR, msg, None::<()>),
    }
}

/// Rejected audit requests carry the reason in `data.reason`
pub fn reject_to_rpc_error(reason: RejectReason) -> ErrorObjectOwned {
    let (code, message) = match reason {
        RejectReason::LimitReached => (code::LIMIT_REACHED, "Audit limit reached for this period"),
        RejectReason::AuditInProgress => {
            (code::CONFLICT, "An audit is already in progress for this project")
        }
        RejectReason::ServiceUnavailable => {
            (code::SERVICE_UNAVAILABLE, "Crawler service unavailable")
        }
        RejectReason::DatastoreError => (code::DB_ERROR, "Datastore unavailable"),
    };
    ErrorObjectOwned::owned(code, message, Some(json!({ "reason": reason.as_str() })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use auditdesk_core::port::GatewayError;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            to_rpc_error(AppError::Validation("bad".into())).code(),
            code::VALIDATION_ERROR
        );
        assert_eq!(
            to_rpc_error(AppError::InvalidState("done".into())).code(),
            code::CONFLICT
        );
        assert_eq!(
            to_rpc_error(AppError::Unauthorized("token".into())).code(),
            code::UNAUTHORIZED
        );
        assert_eq!(
            to_rpc_error(AppError::Gateway(GatewayError::ServiceUnavailable(
                "down".into()
            )))
            .code(),
            code::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_rejection_carries_reason() {
        let err = reject_to_rpc_error(RejectReason::LimitReached);
        assert_eq!(err.code(), code::LIMIT_REACHED);
        let data: serde_json::Value = serde_json::from_str(err.data().unwrap().get()).unwrap();
        assert_eq!(data["reason"], "LIMIT_REACHED");
    }
}
