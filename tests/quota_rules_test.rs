// Plan tier and quota rule tests
// Slot totals, copy allowances, and billing period rollover decisions

use chrono::{TimeZone, Utc};
use hopsync_backend_core::models::user_plan::NewUserPlan;
use hopsync_backend_core::{PlanTier, UserPlan};
use std::str::FromStr;
use uuid::Uuid;

fn plan_for(tier: PlanTier) -> UserPlan {
    let new_plan = NewUserPlan::for_tier(Uuid::new_v4(), tier);
    UserPlan {
        user_id: new_plan.user_id,
        plan_tier: new_plan.plan_tier,
        slots_total: new_plan.slots_total,
        slots_used: 0,
        monthly_copy_limit: new_plan.monthly_copy_limit,
        monthly_copies_used: 0,
        lifetime_copy_limit: new_plan.lifetime_copy_limit,
        lifetime_copies_used: 0,
        billing_period_start: new_plan.billing_period_start,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[test]
fn test_tier_slot_totals() {
    assert_eq!(PlanTier::Free.slots_total(), 2);
    assert_eq!(PlanTier::Starter.slots_total(), 3);
    assert_eq!(PlanTier::Pro.slots_total(), 10);
    assert_eq!(PlanTier::Team.slots_total(), 25);
}

#[test]
fn test_metered_tiers_are_mutually_exclusive() {
    // Free meters lifetime copies, paid tiers meter monthly, Team is
    // unmetered
    for tier in [PlanTier::Free, PlanTier::Starter, PlanTier::Pro, PlanTier::Team] {
        let monthly = tier.monthly_copy_limit();
        let lifetime = tier.lifetime_copy_limit();
        assert!(
            !(monthly.is_some() && lifetime.is_some()),
            "{:?} must not meter both windows",
            tier
        );
    }
    assert_eq!(PlanTier::Free.lifetime_copy_limit(), Some(3));
    assert_eq!(PlanTier::Starter.monthly_copy_limit(), Some(50));
    assert_eq!(PlanTier::Pro.monthly_copy_limit(), Some(500));
    assert_eq!(PlanTier::Team.monthly_copy_limit(), None);
    assert_eq!(PlanTier::Team.lifetime_copy_limit(), None);
}

#[test]
fn test_copy_limit_prefers_active_meter() {
    let free = plan_for(PlanTier::Free);
    assert_eq!(free.copy_limit_and_used(), Some((3, 0)));

    let pro = plan_for(PlanTier::Pro);
    assert_eq!(pro.copy_limit_and_used(), Some((500, 0)));

    let team = plan_for(PlanTier::Team);
    assert_eq!(team.copy_limit_and_used(), None);
}

#[test]
fn test_rollover_only_on_calendar_month_change() {
    let mut plan = plan_for(PlanTier::Pro);
    plan.billing_period_start = Utc.with_ymd_and_hms(2026, 7, 15, 0, 0, 0).unwrap();

    let same_month = Utc.with_ymd_and_hms(2026, 7, 31, 23, 0, 0).unwrap();
    assert!(!plan.needs_period_rollover(same_month));

    let next_month = Utc.with_ymd_and_hms(2026, 8, 1, 0, 5, 0).unwrap();
    assert!(plan.needs_period_rollover(next_month));
}

#[test]
fn test_rollover_across_year_boundary() {
    let mut plan = plan_for(PlanTier::Starter);
    plan.billing_period_start = Utc.with_ymd_and_hms(2025, 12, 20, 0, 0, 0).unwrap();

    let january = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
    assert!(plan.needs_period_rollover(january));
}

#[test]
fn test_tier_string_round_trip() {
    for tier in [PlanTier::Free, PlanTier::Starter, PlanTier::Pro, PlanTier::Team] {
        assert_eq!(PlanTier::from_str(tier.as_str()), Ok(tier));
    }
    assert!(PlanTier::from_str("enterprise").is_err());
}
