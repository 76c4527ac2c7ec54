//! Permission guard.
//!
//! Verifies, before anything is persisted, that the acting principal may
//! modify a record type and write every field the batch actually references.
//! The processor calls this once per distinct type in a batch, not once per
//! record. A violation aborts the whole request; it signals a caller or
//! authorization problem, not a data problem, and is never reported as a
//! per-record error.

use crate::errors::{GatewayError, Result};
use datastore::permissions::{PermissionEngine, Principal};
use std::sync::Arc;

pub struct PermissionGuard {
    engine: Arc<dyn PermissionEngine>,
}

impl PermissionGuard {
    pub fn new(engine: Arc<dyn PermissionEngine>) -> Self {
        Self { engine }
    }

    /// Checks type-level access, then writability of each referenced field,
    /// short-circuiting on the first violation. Absent fields are never
    /// checked; partial payloads are legal.
    pub fn authorize<'a>(
        &self,
        principal: &Principal,
        type_name: &str,
        fields: impl IntoIterator<Item = &'a str>,
    ) -> Result<()> {
        if !self.engine.can_modify(principal, type_name) {
            tracing::warn!(
                profile = %principal.profile,
                record_type = %type_name,
                "Type-level write access denied"
            );
            return Err(GatewayError::TypeNotWritable {
                profile: principal.profile.clone(),
                record_type: type_name.to_string(),
            });
        }

        for field in fields {
            if !self.engine.can_write_field(principal, type_name, field) {
                tracing::warn!(
                    profile = %principal.profile,
                    record_type = %type_name,
                    field = %field,
                    "Field-level write access denied"
                );
                return Err(GatewayError::FieldNotWritable {
                    profile: principal.profile.clone(),
                    record_type: type_name.to_string(),
                    field: field.to_string(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datastore::permissions::ProfilePermissions;

    fn guard() -> PermissionGuard {
        let permissions: ProfilePermissions = serde_yaml::from_str(
            r#"
integration:
    Order:
        modify: true
        readonly_fields: [totalAmount]
"#,
        )
        .unwrap();
        PermissionGuard::new(Arc::new(permissions))
    }

    #[test]
    fn test_authorized_fields_pass() {
        let guard = guard();
        let principal = Principal::new("integration");

        assert!(guard
            .authorize(&principal, "Order", ["orderNumber", "status"])
            .is_ok());
        // Partial payloads: no fields at all is fine
        assert!(guard.authorize(&principal, "Order", []).is_ok());
    }

    #[test]
    fn test_type_denial_reports_type() {
        let guard = guard();
        let principal = Principal::new("integration");

        let err = guard
            .authorize(&principal, "Invoice", ["amount"])
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::TypeNotWritable { ref record_type, .. } if record_type == "Invoice"
        ));
    }

    #[test]
    fn test_field_denial_reports_field() {
        let guard = guard();
        let principal = Principal::new("integration");

        let err = guard
            .authorize(&principal, "Order", ["status", "totalAmount", "orderNumber"])
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::FieldNotWritable { ref field, .. } if field == "totalAmount"
        ));
    }
}
