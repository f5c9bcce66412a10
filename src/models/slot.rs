// Slot Database Model
// Historical entitlement record: one user bound to one (provider, account)
// pair. Rows are never deleted; reconnection reuses the existing row.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::slots;
use crate::utils::TransferError;

/// Slot database model
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = slots)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Slot {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: String,
    pub provider_account_id: String,
    pub provider_email: String,
    pub slot_number: i32,
    pub is_active: bool,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub transferred_from: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// New slot row; `provider_account_id` must already be normalized
#[derive(Debug, Insertable)]
#[diesel(table_name = slots)]
pub struct NewSlot {
    pub user_id: Uuid,
    pub provider: String,
    pub provider_account_id: String,
    pub provider_email: String,
    pub slot_number: i32,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Slot {
    /// Find a slot by its entitlement key, active or not
    pub async fn find_by_key(
        conn: &mut AsyncPgConnection,
        user: Uuid,
        provider_kind: &str,
        normalized_account_id: &str,
    ) -> Result<Option<Self>, TransferError> {
        use crate::schema::slots::dsl::*;

        slots
            .filter(user_id.eq(user))
            .filter(provider.eq(provider_kind))
            .filter(provider_account_id.eq(normalized_account_id))
            .first::<Slot>(conn)
            .await
            .optional()
            .map_err(TransferError::from)
    }

    /// Find a slot held by any user for this (provider, account) pair;
    /// used by the verified-email ownership reclaim path
    pub async fn find_by_provider_account(
        conn: &mut AsyncPgConnection,
        provider_kind: &str,
        normalized_account_id: &str,
    ) -> Result<Option<Self>, TransferError> {
        use crate::schema::slots::dsl::*;

        slots
            .filter(provider.eq(provider_kind))
            .filter(provider_account_id.eq(normalized_account_id))
            .first::<Slot>(conn)
            .await
            .optional()
            .map_err(TransferError::from)
    }

    /// Next per-user slot number (monotonic)
    pub async fn next_slot_number(
        conn: &mut AsyncPgConnection,
        user: Uuid,
    ) -> Result<i32, TransferError> {
        use crate::schema::slots::dsl::*;

        let current: Option<i32> = slots
            .filter(user_id.eq(user))
            .select(diesel::dsl::max(slot_number))
            .first(conn)
            .await
            .map_err(TransferError::from)?;
        Ok(current.unwrap_or(0) + 1)
    }

    /// Insert a new slot row
    pub async fn insert(
        conn: &mut AsyncPgConnection,
        new_slot: NewSlot,
    ) -> Result<Self, TransferError> {
        use crate::schema::slots::dsl::*;

        diesel::insert_into(slots)
            .values(&new_slot)
            .get_result::<Slot>(conn)
            .await
            .map_err(TransferError::from)
    }

    /// Reactivate an existing slot on reconnection
    pub async fn reactivate(
        conn: &mut AsyncPgConnection,
        slot_id: Uuid,
    ) -> Result<(), TransferError> {
        use crate::schema::slots::dsl::*;

        diesel::update(slots.filter(id.eq(slot_id)))
            .set((
                is_active.eq(true),
                disconnected_at.eq(None::<DateTime<Utc>>),
            ))
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Mark a slot disconnected (its entitlement remains consumed)
    pub async fn mark_disconnected(
        conn: &mut AsyncPgConnection,
        slot_id: Uuid,
    ) -> Result<(), TransferError> {
        use crate::schema::slots::dsl::*;

        diesel::update(slots.filter(id.eq(slot_id)))
            .set((
                is_active.eq(false),
                disconnected_at.eq(Some(Utc::now())),
            ))
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Transfer slot ownership after a verified email match, recording the
    /// previous holder
    pub async fn transfer_to_user(
        conn: &mut AsyncPgConnection,
        slot_id: Uuid,
        previous_user: Uuid,
        new_user: Uuid,
    ) -> Result<(), TransferError> {
        use crate::schema::slots::dsl::*;

        diesel::update(slots.filter(id.eq(slot_id)))
            .set((
                user_id.eq(new_user),
                transferred_from.eq(Some(previous_user)),
                is_active.eq(true),
                disconnected_at.eq(None::<DateTime<Utc>>),
            ))
            .execute(conn)
            .await?;
        Ok(())
    }
}
