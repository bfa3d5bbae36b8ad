use chrono::{DateTime, Utc};
use contracts::domain::a031_return_policy::aggregate::{
    ReturnPolicy, ReturnPolicyId, ReturnPolicyRules,
};
use contracts::domain::common::{AggregateRoot, BaseAggregate, EntityMetadata, EventStore};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, SqlErr};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::error::{ReturnsError, ReturnsResult};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "a031_return_policies")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub code: String,
    pub description: String,
    pub comment: Option<String>,
    pub version_no: i32,
    pub is_active: bool,
    pub effective_from: DateTime<Utc>,
    pub effective_until: Option<DateTime<Utc>>,
    pub rules_json: String,
    pub is_archived: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for ReturnPolicy {
    type Error = ReturnsError;

    fn try_from(m: Model) -> Result<Self, Self::Error> {
        let metadata = EntityMetadata {
            created_at: m.created_at.unwrap_or_else(Utc::now),
            updated_at: m.updated_at.unwrap_or_else(Utc::now),
            is_archived: m.is_archived,
            version: m.version,
        };
        let uuid = Uuid::parse_str(&m.id)
            .map_err(|e| anyhow::anyhow!("Invalid id '{}' in {}: {}", m.id, ReturnPolicy::full_name(), e))?;
        let rules: ReturnPolicyRules = serde_json::from_str(&m.rules_json)?;

        Ok(ReturnPolicy {
            base: BaseAggregate::with_metadata(
                ReturnPolicyId(uuid),
                m.code,
                m.description,
                m.comment,
                metadata,
                EventStore::new(),
            ),
            version_no: m.version_no,
            rules,
            effective_from: m.effective_from,
            effective_until: m.effective_until,
            is_active: m.is_active,
        })
    }
}

fn to_active_model(policy: &ReturnPolicy) -> ReturnsResult<ActiveModel> {
    Ok(ActiveModel {
        id: Set(policy.to_string_id()),
        code: Set(policy.base.code.clone()),
        description: Set(policy.base.description.clone()),
        comment: Set(policy.base.comment.clone()),
        version_no: Set(policy.version_no),
        is_active: Set(policy.is_active),
        effective_from: Set(policy.effective_from),
        effective_until: Set(policy.effective_until),
        rules_json: Set(serde_json::to_string(&policy.rules)?),
        is_archived: Set(policy.base.metadata.is_archived),
        created_at: Set(Some(policy.base.metadata.created_at)),
        updated_at: Set(Some(policy.base.metadata.updated_at)),
        version: Set(policy.base.metadata.version),
    })
}

/// Хранилище версий политик возвратов
#[derive(Clone)]
pub struct ReturnPolicyRepository {
    db: DatabaseConnection,
}

impl ReturnPolicyRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Вставить версию; занятый (code, version_no) даёт ConcurrentModification
    pub async fn insert(&self, policy: &ReturnPolicy) -> ReturnsResult<()> {
        match to_active_model(policy)?.insert(&self.db).await {
            Ok(_) => Ok(()),
            Err(e) => match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => {
                    Err(ReturnsError::ConcurrentModification {
                        id: policy.base.id.value(),
                    })
                }
                _ => Err(e.into()),
            },
        }
    }

    pub async fn get_by_id(&self, id: Uuid) -> ReturnsResult<Option<ReturnPolicy>> {
        Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .map(ReturnPolicy::try_from)
            .transpose()
    }

    pub async fn list_all(&self) -> ReturnsResult<Vec<ReturnPolicy>> {
        Entity::find()
            .filter(Column::IsArchived.eq(false))
            .order_by_asc(Column::Code)
            .order_by_asc(Column::VersionNo)
            .all(&self.db)
            .await?
            .into_iter()
            .map(ReturnPolicy::try_from)
            .collect()
    }

    /// Политика, действующая на момент `at`
    ///
    /// При пересечении периодов берётся самая поздняя по effective_from,
    /// затем по номеру версии.
    pub async fn find_active_at(&self, at: DateTime<Utc>) -> ReturnsResult<Option<ReturnPolicy>> {
        let candidates = Entity::find()
            .filter(Column::IsArchived.eq(false))
            .filter(Column::IsActive.eq(true))
            .filter(Column::EffectiveFrom.lte(at))
            .order_by_desc(Column::EffectiveFrom)
            .order_by_desc(Column::VersionNo)
            .all(&self.db)
            .await?;

        for model in candidates {
            let policy = ReturnPolicy::try_from(model)?;
            if policy.is_active_at(at) {
                return Ok(Some(policy));
            }
        }
        Ok(None)
    }

    /// Следующий номер версии для кода политики
    pub async fn next_version_no(&self, code: &str) -> ReturnsResult<i32> {
        let latest = Entity::find()
            .filter(Column::Code.eq(code))
            .order_by_desc(Column::VersionNo)
            .one(&self.db)
            .await?;
        Ok(latest.map(|m| m.version_no + 1).unwrap_or(1))
    }

    pub async fn update(&self, policy: &ReturnPolicy, expected_version: i32) -> ReturnsResult<()> {
        let mut active = to_active_model(policy)?;
        active.id = ActiveValue::NotSet;
        active.created_at = ActiveValue::NotSet;

        let result = Entity::update_many()
            .set(active)
            .filter(Column::Id.eq(policy.to_string_id()))
            .filter(Column::Version.eq(expected_version))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ReturnsError::ConcurrentModification {
                id: policy.base.id.value(),
            });
        }
        Ok(())
    }
}
