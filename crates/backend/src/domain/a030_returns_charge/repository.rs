use chrono::{DateTime, NaiveDate, Utc};
use contracts::domain::a030_returns_charge::aggregate::{
    ExternalFailure, ReturnItem, ReturnReason, ReturnsCharge, ReturnsChargeFinancials,
    ReturnsChargeHeader, ReturnsChargeId, ReturnsChargeResolution, ReturnsChargeRisk,
    ReturnsChargeState, VendorClaimRef,
};
use contracts::domain::a030_returns_charge::ReturnStatus;
use contracts::domain::common::{
    AggregateRoot, BaseAggregate, DomainEvent, EntityMetadata, EventStore,
};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::error::{ReturnsError, ReturnsResult};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "a030_returns_charges")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub code: String,
    pub description: String,
    pub comment: Option<String>,
    pub order_id: String,
    pub customer_id: String,
    pub current_status: String,
    pub return_reason: String,
    pub resolution_type: Option<String>,
    pub fraud_risk_score: f64,
    pub return_initiated_date: DateTime<Utc>,
    pub header_json: String,
    pub items_json: String,
    pub financials_json: String,
    pub resolution_json: String,
    pub risk_json: String,
    pub state_json: String,
    pub events_json: String,
    pub vendor_claim_id: Option<String>,
    pub vendor_claim_json: Option<String>,
    pub external_failures_json: String,
    pub is_archived: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for ReturnsCharge {
    type Error = ReturnsError;

    fn try_from(m: Model) -> Result<Self, Self::Error> {
        let metadata = EntityMetadata {
            created_at: m.created_at.unwrap_or_else(Utc::now),
            updated_at: m.updated_at.unwrap_or_else(Utc::now),
            is_archived: m.is_archived,
            version: m.version,
        };
        let uuid = Uuid::parse_str(&m.id)
            .map_err(|e| anyhow::anyhow!("Invalid id '{}' in {}: {}", m.id, ReturnsCharge::full_name(), e))?;

        let header: ReturnsChargeHeader = serde_json::from_str(&m.header_json)?;
        let items: Vec<ReturnItem> = serde_json::from_str(&m.items_json)?;
        let financials: ReturnsChargeFinancials = serde_json::from_str(&m.financials_json)?;
        let resolution: ReturnsChargeResolution = serde_json::from_str(&m.resolution_json)?;
        let risk: ReturnsChargeRisk = serde_json::from_str(&m.risk_json)?;
        let state: ReturnsChargeState = serde_json::from_str(&m.state_json)?;
        let events: Vec<DomainEvent> = serde_json::from_str(&m.events_json)?;
        let vendor_claim: Option<VendorClaimRef> = match m.vendor_claim_json {
            Some(ref json) => Some(serde_json::from_str(json)?),
            None => None,
        };
        let external_failures: Vec<ExternalFailure> =
            serde_json::from_str(&m.external_failures_json)?;

        Ok(ReturnsCharge {
            base: BaseAggregate::with_metadata(
                ReturnsChargeId(uuid),
                m.code,
                m.description,
                m.comment,
                metadata,
                EventStore::from_entries(events),
            ),
            header,
            items,
            financials,
            resolution,
            risk,
            state,
            vendor_claim,
            external_failures,
        })
    }
}

fn to_active_model(charge: &ReturnsCharge) -> ReturnsResult<ActiveModel> {
    let vendor_claim_json = match &charge.vendor_claim {
        Some(claim) => Some(serde_json::to_string(claim)?),
        None => None,
    };
    Ok(ActiveModel {
        id: Set(charge.to_string_id()),
        code: Set(charge.base.code.clone()),
        description: Set(charge.base.description.clone()),
        comment: Set(charge.base.comment.clone()),
        order_id: Set(charge.header.order_id.clone()),
        customer_id: Set(charge.header.customer_id.clone()),
        current_status: Set(charge.current_status().code().to_string()),
        return_reason: Set(charge.header.return_reason.code().to_string()),
        resolution_type: Set(charge
            .resolution
            .resolution_type
            .map(|r| r.code().to_string())),
        fraud_risk_score: Set(charge.risk.fraud_risk_score),
        return_initiated_date: Set(charge.state.return_initiated_date),
        header_json: Set(serde_json::to_string(&charge.header)?),
        items_json: Set(serde_json::to_string(&charge.items)?),
        financials_json: Set(serde_json::to_string(&charge.financials)?),
        resolution_json: Set(serde_json::to_string(&charge.resolution)?),
        risk_json: Set(serde_json::to_string(&charge.risk)?),
        state_json: Set(serde_json::to_string(&charge.state)?),
        events_json: Set(serde_json::to_string(charge.base.events.entries())?),
        vendor_claim_id: Set(charge.vendor_claim.as_ref().map(|c| c.claim_id.clone())),
        vendor_claim_json: Set(vendor_claim_json),
        external_failures_json: Set(serde_json::to_string(&charge.external_failures)?),
        is_archived: Set(charge.base.metadata.is_archived),
        created_at: Set(Some(charge.base.metadata.created_at)),
        updated_at: Set(Some(charge.base.metadata.updated_at)),
        version: Set(charge.base.metadata.version),
    })
}

/// Фильтр списка возвратов
#[derive(Debug, Clone, Default)]
pub struct ReturnsChargeFilter {
    /// Включительно, по return_initiated_date
    pub date_from: Option<NaiveDate>,
    /// Включительно, по return_initiated_date
    pub date_to: Option<NaiveDate>,
    pub status: Option<ReturnStatus>,
    pub return_reason: Option<ReturnReason>,
    pub customer_id: Option<String>,
    pub include_archived: bool,
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc()
}

/// Хранилище документов возврата (SQLite через sea-orm)
#[derive(Clone)]
pub struct ReturnsChargeRepository {
    db: DatabaseConnection,
}

impl ReturnsChargeRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn insert(&self, charge: &ReturnsCharge) -> ReturnsResult<()> {
        to_active_model(charge)?.insert(&self.db).await?;
        Ok(())
    }

    pub async fn get_by_id(&self, id: Uuid) -> ReturnsResult<Option<ReturnsCharge>> {
        Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .map(ReturnsCharge::try_from)
            .transpose()
    }

    pub async fn list(&self, filter: &ReturnsChargeFilter) -> ReturnsResult<Vec<ReturnsCharge>> {
        let mut query = Entity::find();
        if !filter.include_archived {
            query = query.filter(Column::IsArchived.eq(false));
        }
        if let Some(from) = filter.date_from {
            query = query.filter(Column::ReturnInitiatedDate.gte(start_of_day(from)));
        }
        if let Some(to) = filter.date_to {
            if let Some(next_day) = to.succ_opt() {
                query = query.filter(Column::ReturnInitiatedDate.lt(start_of_day(next_day)));
            }
        }
        if let Some(status) = filter.status {
            query = query.filter(Column::CurrentStatus.eq(status.code()));
        }
        if let Some(reason) = filter.return_reason {
            query = query.filter(Column::ReturnReason.eq(reason.code()));
        }
        if let Some(ref customer_id) = filter.customer_id {
            query = query.filter(Column::CustomerId.eq(customer_id.as_str()));
        }

        query
            .order_by_asc(Column::ReturnInitiatedDate)
            .order_by_asc(Column::Code)
            .all(&self.db)
            .await?
            .into_iter()
            .map(ReturnsCharge::try_from)
            .collect()
    }

    pub async fn find_by_vendor_claim(&self, claim_id: &str) -> ReturnsResult<Option<ReturnsCharge>> {
        Entity::find()
            .filter(Column::VendorClaimId.eq(claim_id))
            .one(&self.db)
            .await?
            .map(ReturnsCharge::try_from)
            .transpose()
    }

    /// Сохранить изменения, если версия в базе равна `expected_version`
    ///
    /// В документе уже должна стоять новая версия (expected_version + 1).
    pub async fn update(&self, charge: &ReturnsCharge, expected_version: i32) -> ReturnsResult<()> {
        let mut active = to_active_model(charge)?;
        active.id = ActiveValue::NotSet;
        active.created_at = ActiveValue::NotSet;

        let result = Entity::update_many()
            .set(active)
            .filter(Column::Id.eq(charge.to_string_id()))
            .filter(Column::Version.eq(expected_version))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ReturnsError::ConcurrentModification {
                id: charge.base.id.value(),
            });
        }
        Ok(())
    }
}
