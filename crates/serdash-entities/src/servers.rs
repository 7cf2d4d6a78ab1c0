//! Entity для таблицы servers.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Состояние жизненного цикла агента.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    /// Создан оператором, ключ ещё не привязан
    #[sea_orm(string_value = "pending_registration")]
    PendingRegistration,

    /// Код погашен, публичный ключ привязан
    #[sea_orm(string_value = "active")]
    Active,

    /// Помечен внешним процессом проверки доступности
    #[sea_orm(string_value = "unreachable")]
    Unreachable,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "servers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub hostname: Option<String>,

    pub ip: Option<String>,

    /// Публичный ключ Ed25519 агента (PEM, SubjectPublicKeyInfo)
    #[sea_orm(column_type = "Text", nullable)]
    pub agent_public_key: Option<String>,

    pub status: ServerStatus,

    pub last_seen_at: Option<DateTimeUtc>,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Привязанный ключ, если агент активен и ключ не пустой.
    pub fn bound_key(&self) -> Option<&str> {
        if self.status != ServerStatus::Active {
            return None;
        }
        self.agent_public_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::registration_codes::Entity")]
    RegistrationCodes,
}

impl Related<super::registration_codes::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RegistrationCodes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
