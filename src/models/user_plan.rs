// User Plan Database Model
// Plan tier, slot entitlements, and copy-operation counters

use chrono::{DateTime, Datelike, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::schema::user_plans;
use crate::utils::TransferError;

/// Plan tier enumeration matching the pricing structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, diesel::expression::AsExpression)]
#[diesel(sql_type = diesel::sql_types::Text)]
pub enum PlanTier {
    Free,    // 2 account slots, 3 lifetime copies
    Starter, // 3 account slots, 50 copies/month
    Pro,     // 10 account slots, 500 copies/month
    Team,    // 25 account slots, unlimited copies
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Starter => "starter",
            PlanTier::Pro => "pro",
            PlanTier::Team => "team",
        }
    }

    /// Total distinct-account slots for this tier
    pub fn slots_total(&self) -> i32 {
        match self {
            PlanTier::Free => 2,
            PlanTier::Starter => 3,
            PlanTier::Pro => 10,
            PlanTier::Team => 25,
        }
    }

    /// Monthly copy-operation limit; None means the tier is not
    /// month-metered (it is either lifetime-metered or unlimited)
    pub fn monthly_copy_limit(&self) -> Option<i32> {
        match self {
            PlanTier::Free => None,
            PlanTier::Starter => Some(50),
            PlanTier::Pro => Some(500),
            PlanTier::Team => None, // Unlimited
        }
    }

    /// Lifetime copy-operation limit; mutually exclusive with the monthly
    /// limit by tier
    pub fn lifetime_copy_limit(&self) -> Option<i32> {
        match self {
            PlanTier::Free => Some(3),
            PlanTier::Starter | PlanTier::Pro | PlanTier::Team => None,
        }
    }
}

impl FromStr for PlanTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(PlanTier::Free),
            "starter" => Ok(PlanTier::Starter),
            "pro" => Ok(PlanTier::Pro),
            "team" => Ok(PlanTier::Team),
            _ => Err(format!("Invalid plan tier: {}", s)),
        }
    }
}

impl<DB> diesel::deserialize::FromSql<diesel::sql_types::Text, DB> for PlanTier
where
    DB: diesel::backend::Backend,
    String: diesel::deserialize::FromSql<diesel::sql_types::Text, DB>,
{
    fn from_sql(bytes: DB::RawValue<'_>) -> diesel::deserialize::Result<Self> {
        let value = String::from_sql(bytes)?;
        Self::from_str(&value).map_err(|e| e.into())
    }
}

impl<DB> diesel::serialize::ToSql<diesel::sql_types::Text, DB> for PlanTier
where
    DB: diesel::backend::Backend,
    str: diesel::serialize::ToSql<diesel::sql_types::Text, DB>,
{
    fn to_sql<'b>(
        &'b self,
        out: &mut diesel::serialize::Output<'b, '_, DB>,
    ) -> diesel::serialize::Result {
        self.as_str().to_sql(out)
    }
}

/// User plan database model
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = user_plans)]
#[diesel(primary_key(user_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserPlan {
    pub user_id: Uuid,
    pub plan_tier: String,
    pub slots_total: i32,
    pub slots_used: i32,
    pub monthly_copy_limit: Option<i32>,
    pub monthly_copies_used: i32,
    pub lifetime_copy_limit: Option<i32>,
    pub lifetime_copies_used: i32,
    pub billing_period_start: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New plan row for insertion
#[derive(Debug, Insertable)]
#[diesel(table_name = user_plans)]
pub struct NewUserPlan {
    pub user_id: Uuid,
    pub plan_tier: String,
    pub slots_total: i32,
    pub monthly_copy_limit: Option<i32>,
    pub lifetime_copy_limit: Option<i32>,
    pub billing_period_start: DateTime<Utc>,
}

impl NewUserPlan {
    pub fn for_tier(user_id: Uuid, tier: PlanTier) -> Self {
        Self {
            user_id,
            plan_tier: tier.as_str().to_string(),
            slots_total: tier.slots_total(),
            monthly_copy_limit: tier.monthly_copy_limit(),
            lifetime_copy_limit: tier.lifetime_copy_limit(),
            billing_period_start: Utc::now(),
        }
    }
}

impl UserPlan {
    /// Find a user's plan
    pub async fn find_by_user(
        conn: &mut AsyncPgConnection,
        user: Uuid,
    ) -> Result<Self, TransferError> {
        use crate::schema::user_plans::dsl::*;

        user_plans
            .filter(user_id.eq(user))
            .first::<UserPlan>(conn)
            .await
            .map_err(TransferError::from)
    }

    /// Get plan tier as enum, defaulting invalid rows to Free
    pub fn plan_tier_enum(&self) -> PlanTier {
        PlanTier::from_str(&self.plan_tier).unwrap_or_else(|e| {
            tracing::warn!(
                "Invalid plan tier '{}' for user {}, defaulting to Free: {}",
                self.plan_tier,
                self.user_id,
                e
            );
            PlanTier::Free
        })
    }

    /// Whether the stored billing period started in an earlier month than
    /// `now`; monthly counters reset only on this rollover
    pub fn needs_period_rollover(&self, now: DateTime<Utc>) -> bool {
        let start = self.billing_period_start;
        start.year() < now.year() || (start.year() == now.year() && start.month() < now.month())
    }

    /// The copy limit and usage that apply to this plan's metering mode.
    /// Returns None when the plan is unmetered (unlimited copies).
    pub fn copy_limit_and_used(&self) -> Option<(i32, i32)> {
        if let Some(limit) = self.monthly_copy_limit {
            Some((limit, self.monthly_copies_used))
        } else {
            self.lifetime_copy_limit
                .map(|limit| (limit, self.lifetime_copies_used))
        }
    }

    /// Reset monthly counters for a new billing period
    pub async fn rollover_period(
        conn: &mut AsyncPgConnection,
        user: Uuid,
        period_start: DateTime<Utc>,
    ) -> Result<(), TransferError> {
        use crate::schema::user_plans::dsl::*;

        diesel::update(user_plans.filter(user_id.eq(user)))
            .set((
                monthly_copies_used.eq(0),
                billing_period_start.eq(period_start),
                updated_at.eq(Utc::now()),
            ))
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Server-side conditional increment of `slots_used`; never
    /// read-modify-write. Returns the number of rows updated, which is 0
    /// when the plan is already at its slot total.
    pub async fn consume_slot_if_available(
        conn: &mut AsyncPgConnection,
        user: Uuid,
    ) -> Result<usize, TransferError> {
        use crate::schema::user_plans::dsl::*;

        let updated = diesel::update(
            user_plans
                .filter(user_id.eq(user))
                .filter(slots_used.lt(slots_total)),
        )
        .set((slots_used.eq(slots_used + 1), updated_at.eq(Utc::now())))
        .execute(conn)
        .await?;
        Ok(updated)
    }

    /// Server-side increment of the copy counter that applies to this
    /// plan's metering mode
    pub async fn increment_copies_used(
        conn: &mut AsyncPgConnection,
        user: Uuid,
    ) -> Result<(), TransferError> {
        use crate::schema::user_plans::dsl::*;

        let plan = Self::find_by_user(conn, user).await?;
        if plan.monthly_copy_limit.is_some() {
            diesel::update(user_plans.filter(user_id.eq(user)))
                .set((
                    monthly_copies_used.eq(monthly_copies_used + 1),
                    updated_at.eq(Utc::now()),
                ))
                .execute(conn)
                .await?;
        } else {
            diesel::update(user_plans.filter(user_id.eq(user)))
                .set((
                    lifetime_copies_used.eq(lifetime_copies_used + 1),
                    updated_at.eq(Utc::now()),
                ))
                .execute(conn)
                .await?;
        }
        Ok(())
    }

    /// Change plan tier, rewriting limits and resetting counters
    pub async fn change_tier(
        conn: &mut AsyncPgConnection,
        user: Uuid,
        tier: PlanTier,
    ) -> Result<(), TransferError> {
        use crate::schema::user_plans::dsl::*;

        diesel::update(user_plans.filter(user_id.eq(user)))
            .set((
                plan_tier.eq(tier.as_str()),
                slots_total.eq(tier.slots_total()),
                monthly_copy_limit.eq(tier.monthly_copy_limit()),
                lifetime_copy_limit.eq(tier.lifetime_copy_limit()),
                monthly_copies_used.eq(0),
                billing_period_start.eq(Utc::now()),
                updated_at.eq(Utc::now()),
            ))
            .execute(conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn plan_for(tier: PlanTier, period_start: DateTime<Utc>) -> UserPlan {
        UserPlan {
            user_id: Uuid::new_v4(),
            plan_tier: tier.as_str().to_string(),
            slots_total: tier.slots_total(),
            slots_used: 0,
            monthly_copy_limit: tier.monthly_copy_limit(),
            monthly_copies_used: 0,
            lifetime_copy_limit: tier.lifetime_copy_limit(),
            lifetime_copies_used: 0,
            billing_period_start: period_start,
            created_at: period_start,
            updated_at: period_start,
        }
    }

    #[test]
    fn test_tier_conversion() {
        assert_eq!(PlanTier::Free.as_str(), "free");
        assert_eq!(PlanTier::from_str("pro"), Ok(PlanTier::Pro));
        assert!(PlanTier::from_str("invalid").is_err());
    }

    #[test]
    fn test_tier_metering_is_mutually_exclusive() {
        for tier in [PlanTier::Free, PlanTier::Starter, PlanTier::Pro, PlanTier::Team] {
            let monthly = tier.monthly_copy_limit().is_some();
            let lifetime = tier.lifetime_copy_limit().is_some();
            assert!(!(monthly && lifetime), "tier {:?} double-metered", tier);
        }
    }

    #[test]
    fn test_period_rollover_detection() {
        let start = Utc.with_ymd_and_hms(2026, 7, 15, 0, 0, 0).unwrap();
        let plan = plan_for(PlanTier::Pro, start);

        let same_month = Utc.with_ymd_and_hms(2026, 7, 31, 23, 0, 0).unwrap();
        assert!(!plan.needs_period_rollover(same_month));

        let next_month = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
        assert!(plan.needs_period_rollover(next_month));

        // Year boundary: January follows December
        let december = Utc.with_ymd_and_hms(2026, 12, 20, 0, 0, 0).unwrap();
        let january = Utc.with_ymd_and_hms(2027, 1, 2, 0, 0, 0).unwrap();
        let plan = plan_for(PlanTier::Pro, december);
        assert!(plan.needs_period_rollover(january));
    }

    #[test]
    fn test_copy_limit_selection() {
        let now = Utc::now();
        let free = plan_for(PlanTier::Free, now);
        assert_eq!(free.copy_limit_and_used(), Some((3, 0)));

        let pro = plan_for(PlanTier::Pro, now);
        assert_eq!(pro.copy_limit_and_used(), Some((500, 0)));

        let team = plan_for(PlanTier::Team, now);
        assert_eq!(team.copy_limit_and_used(), None);
    }

    #[test]
    fn test_invalid_tier_defaults_to_free() {
        let mut plan = plan_for(PlanTier::Pro, Utc::now());
        plan.plan_tier = "bogus".to_string();
        assert_eq!(plan.plan_tier_enum(), PlanTier::Free);
    }
}
