//! Tenant query middleware.
//!
//! Every read and write against the document store passes through
//! [`TenantScope`]. Reads get a mandatory company filter, writes get the
//! company id stamped onto the payload, and anything that names a
//! different company is rejected with [`ScopeError::CrossTenantAccess`]
//! and written to the audit trail with both company ids.
//!
//! The store only accepts [`ScopedQuery`] and [`ScopedWrite`], whose
//! constructors are private to this module.

use crate::automation::transport::{MAIL_COLLECTION, NOTIFICATIONS_COLLECTION, WHATSAPP_COLLECTION};
use crate::db::store::{COMPANY_ID_FIELD, ID_FIELD};
use crate::db::{DbError, RecordStore};
use crate::models::{MalformedRecordError, CONTRACTS, TENANT_CONTACTS};
use crate::tenant::{CompanyContext, Permission, Role};
use lg_observability::metrics::{CROSS_TENANT_REJECTIONS, PERMISSION_DENIALS};
use lg_observability::{AuditEventType, AuditLogger, AuditScope};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Errors raised by the tenant query middleware.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    /// The operation named a company other than the resolved one.
    #[error("Cross-tenant access rejected: attempted company {attempted}, context company {actual}")]
    CrossTenantAccess { attempted: Uuid, actual: Uuid },

    /// The context's role does not grant the operation.
    #[error("Permission denied: role {role} lacks {permission}")]
    PermissionDenied { permission: Permission, role: Role },

    /// No company could be determined for the operation.
    #[error("Missing company: {0}")]
    MissingCompany(String),

    /// The query or payload is unusable.
    #[error("Invalid operation: {0}")]
    Invalid(String),

    /// The store failed.
    #[error("Store error: {0}")]
    Store(#[from] DbError),
}

/// One equality condition on a document field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCondition {
    pub field: String,
    pub value: Value,
}

impl FieldCondition {
    fn matches(&self, record: &Value) -> bool {
        record.get(&self.field) == Some(&self.value)
    }
}

/// An unscoped query as written by callers.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    collection: String,
    company_id: Option<Uuid>,
    conditions: Vec<FieldCondition>,
    limit: Option<usize>,
}

impl Query {
    /// Starts a query over one collection.
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            company_id: None,
            conditions: Vec::new(),
            limit: None,
        }
    }

    /// Names the company explicitly.
    pub fn for_company(mut self, company_id: Uuid) -> Self {
        self.company_id = Some(company_id);
        self
    }

    /// Adds an equality condition.
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(FieldCondition {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }
}

/// Company filter attached to every scoped query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TenantFilter {
    Company(Uuid),
    /// Only produced for privileged contexts.
    AllCompanies,
}

impl TenantFilter {
    /// Checks a document's `company_id` against the filter.
    pub fn matches(&self, record: &Value) -> bool {
        match self {
            TenantFilter::AllCompanies => true,
            TenantFilter::Company(id) => record_company_id(record) == Some(*id),
        }
    }
}

/// A query that has passed through the middleware.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedQuery {
    filter: TenantFilter,
    collection: String,
    conditions: Vec<FieldCondition>,
    limit: Option<usize>,
}

impl ScopedQuery {
    pub fn filter(&self) -> TenantFilter {
        self.filter
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn conditions(&self) -> &[FieldCondition] {
        &self.conditions
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Evaluates the tenant filter and every condition against a document.
    pub fn matches(&self, record: &Value) -> bool {
        self.filter.matches(record) && self.conditions.iter().all(|c| c.matches(record))
    }
}

/// A write that has been stamped with its owning company.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedWrite {
    company_id: Uuid,
    collection: String,
    id: String,
    payload: Value,
}

impl ScopedWrite {
    pub fn company_id(&self) -> Uuid {
        self.company_id
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The document to persist, `company_id` and `id` included.
    pub fn payload(&self) -> &Value {
        &self.payload
    }
}

fn record_company_id(record: &Value) -> Option<Uuid> {
    record
        .get(COMPANY_ID_FIELD)
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}

fn parse_company_value(value: &Value) -> Result<Uuid, ScopeError> {
    value
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| ScopeError::Invalid(format!("company id {} is not a UUID", value)))
}

/// The middleware itself.
#[derive(Clone)]
pub struct TenantScope {
    audit: Arc<AuditLogger>,
}

impl TenantScope {
    pub fn new(audit: Arc<AuditLogger>) -> Self {
        Self { audit }
    }

    /// Scopes a read.
    ///
    /// A company id named by the caller (through [`Query::for_company`] or
    /// an equality condition on `company_id`) must match a non-privileged
    /// context. It is never silently narrowed.
    pub async fn scope(&self, ctx: &CompanyContext, query: Query) -> Result<ScopedQuery, ScopeError> {
        let Query {
            collection,
            company_id,
            conditions,
            limit,
        } = query;

        let mut declared: Vec<Uuid> = company_id.into_iter().collect();
        let mut remaining = Vec::with_capacity(conditions.len());
        for condition in conditions {
            if condition.field == COMPANY_ID_FIELD {
                declared.push(parse_company_value(&condition.value)?);
            } else {
                remaining.push(condition);
            }
        }
        declared.sort_unstable();
        declared.dedup();

        let filter = match ctx.company_id() {
            Some(actual) => {
                if let Some(attempted) = declared.iter().copied().find(|id| *id != actual) {
                    return Err(self
                        .reject(ctx, attempted, actual, &collection, "read")
                        .await);
                }
                TenantFilter::Company(actual)
            }
            None => match declared.as_slice() {
                [] => TenantFilter::AllCompanies,
                [single] => TenantFilter::Company(*single),
                _ => {
                    return Err(ScopeError::Invalid(
                        "query names more than one company".to_string(),
                    ))
                }
            },
        };

        debug!(collection = %collection, filter = ?filter, "Scoped query");
        Ok(ScopedQuery {
            filter,
            collection,
            conditions: remaining,
            limit,
        })
    }

    /// Stamps a write with its owning company.
    pub async fn stamp(
        &self,
        ctx: &CompanyContext,
        collection: &str,
        mut payload: Value,
    ) -> Result<ScopedWrite, ScopeError> {
        let declared = match payload.get(COMPANY_ID_FIELD) {
            None | Some(Value::Null) => None,
            Some(value) => Some(parse_company_value(value)?),
        };

        let company_id = match (ctx.company_id(), declared) {
            (Some(actual), Some(attempted)) if attempted != actual => {
                return Err(self
                    .reject(ctx, attempted, actual, collection, "write")
                    .await);
            }
            (Some(actual), _) => actual,
            (None, Some(named)) => named,
            (None, None) => {
                return Err(ScopeError::MissingCompany(format!(
                    "write to '{}' from an all-companies context must name the company",
                    collection
                )))
            }
        };

        let id = match payload.get(ID_FIELD).and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };

        let object = payload.as_object_mut().ok_or_else(|| {
            ScopeError::Invalid(format!("payload for '{}' is not a JSON object", collection))
        })?;
        object.insert(COMPANY_ID_FIELD.to_string(), json!(company_id));
        object.insert(ID_FIELD.to_string(), json!(id));

        Ok(ScopedWrite {
            company_id,
            collection: collection.to_string(),
            id,
            payload,
        })
    }

    /// Checks that a fetched document belongs to the context's company.
    pub async fn verify_record(
        &self,
        ctx: &CompanyContext,
        collection: &str,
        record: &Value,
    ) -> Result<(), ScopeError> {
        let Some(actual) = ctx.company_id() else {
            return Ok(());
        };
        match record_company_id(record) {
            Some(owner) if owner == actual => Ok(()),
            Some(owner) => Err(self.reject(ctx, owner, actual, collection, "read").await),
            None => Err(ScopeError::MissingCompany(format!(
                "document in '{}' carries no company id",
                collection
            ))),
        }
    }

    /// Checks that an insert does not replace another company's document.
    ///
    /// Stores upsert by id, so an id collision would otherwise move the
    /// existing document to the writer's company.
    pub async fn verify_overwrite(
        &self,
        ctx: &CompanyContext,
        write: &ScopedWrite,
        existing: &Value,
    ) -> Result<(), ScopeError> {
        match record_company_id(existing) {
            Some(owner) if owner == write.company_id() => Ok(()),
            Some(owner) => Err(self
                .reject(ctx, owner, write.company_id(), write.collection(), "write")
                .await),
            None => Err(ScopeError::MissingCompany(format!(
                "document '{}' in '{}' carries no company id",
                write.id(),
                write.collection()
            ))),
        }
    }

    /// Checks that the context's role grants `permission`.
    ///
    /// A refusal is logged and audited under the context's scope.
    pub async fn authorize(
        &self,
        ctx: &CompanyContext,
        permission: Permission,
        target: &str,
        operation: &str,
    ) -> Result<(), ScopeError> {
        if ctx.has_permission(permission) {
            return Ok(());
        }

        let role = ctx.role();
        warn!(
            actor = ctx.actor_id(),
            role = %role,
            permission = %permission,
            target,
            operation,
            "Permission denied"
        );
        ::metrics::counter!(PERMISSION_DENIALS, "permission" => permission.as_str())
            .increment(1);
        self.audit
            .log_warning(
                ctx.audit_scope(),
                AuditEventType::PermissionDenied,
                format!(
                    "Refused {} on '{}': role {} lacks {}",
                    operation, target, role, permission
                ),
                format!(
                    "تم رفض العملية على '{}': الدور {} لا يملك صلاحية {}",
                    target, role, permission
                ),
                json!({
                    "actor": ctx.actor_id(),
                    "role": role,
                    "permission": permission,
                    "target": target,
                    "operation": operation,
                }),
            )
            .await;
        Err(ScopeError::PermissionDenied { permission, role })
    }

    async fn reject(
        &self,
        ctx: &CompanyContext,
        attempted: Uuid,
        actual: Uuid,
        collection: &str,
        operation: &str,
    ) -> ScopeError {
        warn!(
            attempted = %attempted,
            actual = %actual,
            collection,
            operation,
            "Cross-tenant access rejected"
        );
        ::metrics::counter!(CROSS_TENANT_REJECTIONS, "operation" => operation.to_string())
            .increment(1);
        self.audit
            .log_warning(
                AuditScope::Company(actual),
                AuditEventType::CrossTenantAccessRejected,
                format!(
                    "Rejected {} on '{}' targeting company {} from company {}",
                    operation, collection, attempted, actual
                ),
                format!(
                    "تم رفض عملية على '{}' تستهدف الشركة {} من سياق الشركة {}",
                    collection, attempted, actual
                ),
                json!({
                    "actor": ctx.actor_id(),
                    "attempted_company_id": attempted,
                    "actual_company_id": actual,
                    "collection": collection,
                    "operation": operation,
                }),
            )
            .await;
        ScopeError::CrossTenantAccess { attempted, actual }
    }
}

/// Permission a write to `collection` requires.
pub fn write_permission(collection: &str) -> Permission {
    match collection {
        CONTRACTS | TENANT_CONTACTS => Permission::ManageContracts,
        MAIL_COLLECTION | WHATSAPP_COLLECTION | NOTIFICATIONS_COLLECTION => {
            Permission::SendNotifications
        }
        _ => Permission::WriteFinancials,
    }
}

/// Typed fetch result: decoded records plus the documents that failed to decode.
#[derive(Debug, Clone)]
pub struct Fetched<T> {
    pub records: Vec<T>,
    pub malformed: Vec<MalformedRecordError>,
}

/// [`RecordStore`] behind the tenant query middleware.
#[derive(Clone)]
pub struct ScopedStore {
    store: Arc<dyn RecordStore>,
    scope: TenantScope,
}

impl ScopedStore {
    pub fn new(store: Arc<dyn RecordStore>, audit: Arc<AuditLogger>) -> Self {
        Self {
            store,
            scope: TenantScope::new(audit),
        }
    }

    pub fn scope(&self) -> &TenantScope {
        &self.scope
    }

    /// Fetches documents visible to the context.
    pub async fn fetch(&self, ctx: &CompanyContext, query: Query) -> Result<Vec<Value>, ScopeError> {
        let scoped = self.scope.scope(ctx, query).await?;
        let mut records = self.store.fetch(&scoped).await?;
        // The store is external; re-apply the filter on what it returned.
        records.retain(|record| scoped.filter().matches(record));
        Ok(records)
    }

    /// Fetches and decodes documents, reporting those that fail to decode.
    pub async fn fetch_as<T: DeserializeOwned>(
        &self,
        ctx: &CompanyContext,
        query: Query,
    ) -> Result<Fetched<T>, ScopeError> {
        let kind = query.collection_name().to_string();
        let documents = self.fetch(ctx, query).await?;

        let mut records = Vec::with_capacity(documents.len());
        let mut malformed = Vec::new();
        for document in documents {
            let id = document
                .get(ID_FIELD)
                .and_then(Value::as_str)
                .unwrap_or("<unknown>")
                .to_string();
            match serde_json::from_value::<T>(document) {
                Ok(record) => records.push(record),
                Err(err) => {
                    warn!(kind = %kind, id = %id, error = %err, "Skipping undecodable document");
                    malformed.push(MalformedRecordError::new(kind.clone(), id, err.to_string()));
                }
            }
        }
        Ok(Fetched { records, malformed })
    }

    /// Gets one document by id if it belongs to the context's company.
    pub async fn get(
        &self,
        ctx: &CompanyContext,
        collection: &str,
        id: &str,
    ) -> Result<Option<Value>, ScopeError> {
        match self.store.get(collection, id).await? {
            Some(record) => {
                self.scope.verify_record(ctx, collection, &record).await?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Inserts a document and returns its id.
    pub async fn insert(
        &self,
        ctx: &CompanyContext,
        collection: &str,
        payload: Value,
    ) -> Result<String, ScopeError> {
        self.scope
            .authorize(ctx, write_permission(collection), collection, "insert")
            .await?;
        let write = self.scope.stamp(ctx, collection, payload).await?;
        if let Some(existing) = self.store.get(collection, write.id()).await? {
            self.scope.verify_overwrite(ctx, &write, &existing).await?;
        }
        Ok(self.store.put(&write).await?)
    }

    /// Replaces an existing document owned by the context's company.
    pub async fn update(
        &self,
        ctx: &CompanyContext,
        collection: &str,
        id: &str,
        mut payload: Value,
    ) -> Result<(), ScopeError> {
        self.scope
            .authorize(ctx, write_permission(collection), collection, "update")
            .await?;
        let existing = self.get(ctx, collection, id).await?.ok_or_else(|| {
            ScopeError::Store(DbError::NotFound {
                entity: collection.to_string(),
                id: id.to_string(),
            })
        })?;

        if let Some(object) = payload.as_object_mut() {
            object.insert(ID_FIELD.to_string(), json!(id));
            // Privileged contexts update in place for the document's owner.
            if ctx.is_privileged() && !object.contains_key(COMPANY_ID_FIELD) {
                if let Some(owner) = existing.get(COMPANY_ID_FIELD) {
                    object.insert(COMPANY_ID_FIELD.to_string(), owner.clone());
                }
            }
        }

        let write = self.scope.stamp(ctx, collection, payload).await?;
        self.store.put(&write).await?;
        Ok(())
    }

    /// Deletes a document owned by the context's company.
    pub async fn delete(
        &self,
        ctx: &CompanyContext,
        collection: &str,
        id: &str,
    ) -> Result<bool, ScopeError> {
        self.scope
            .authorize(ctx, write_permission(collection), collection, "delete")
            .await?;
        if self.get(ctx, collection, id).await?.is_none() {
            return Ok(false);
        }
        Ok(self.store.delete(collection, id).await?)
    }
}
