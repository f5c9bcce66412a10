// Slot Ledger Integration Tests
// Database-backed checks for slot consumption and reconnection

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use hopsync_backend_core::{
    db::{create_diesel_pool, DieselDatabaseConfig, DieselPool},
    models::{NewUserPlan, PlanTier, ProviderKind, UserPlan},
    schema::user_plans,
    services::QuotaService,
    utils::TransferError,
};
use uuid::Uuid;

async fn setup_pool() -> DieselPool {
    dotenv::from_filename(".env.test").ok();
    let db_config = DieselDatabaseConfig::default();
    create_diesel_pool(db_config).await.unwrap()
}

async fn seed_plan(pool: &DieselPool, tier: PlanTier) -> Uuid {
    let user = Uuid::new_v4();
    let mut conn = pool.get().await.unwrap();
    diesel::insert_into(user_plans::table)
        .values(&NewUserPlan::for_tier(user, tier))
        .execute(&mut conn)
        .await
        .unwrap();
    user
}

#[tokio::test]
#[ignore] // Requires database
async fn test_concurrent_connects_never_oversubscribe_slots() {
    let pool = setup_pool().await;
    let user = seed_plan(&pool, PlanTier::Free).await; // 2 slots
    let quota = QuotaService::new(pool.clone());

    quota
        .connect_or_reconnect_slot(user, ProviderKind::Drive, "acct-first", "a@example.com", false)
        .await
        .unwrap();

    // One slot left; both racers pass the plain read but only one may
    // survive the conditional increment
    let (left, right) = tokio::join!(
        quota.connect_or_reconnect_slot(
            user,
            ProviderKind::Drive,
            "acct-second",
            "b@example.com",
            false
        ),
        quota.connect_or_reconnect_slot(
            user,
            ProviderKind::Graph,
            "acct-third",
            "c@example.com",
            false
        ),
    );

    let successes = [&left, &right].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    assert!([&left, &right]
        .iter()
        .any(|r| matches!(r, Err(TransferError::QuotaExceeded { .. }))));

    let mut conn = pool.get().await.unwrap();
    let plan = UserPlan::find_by_user(&mut conn, user).await.unwrap();
    assert_eq!(plan.slots_used, plan.slots_total);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_connect_at_limit_rolls_back_slot_insert() {
    let pool = setup_pool().await;
    let user = seed_plan(&pool, PlanTier::Free).await;
    let quota = QuotaService::new(pool.clone());

    quota
        .connect_or_reconnect_slot(user, ProviderKind::Drive, "acct-1", "a@example.com", false)
        .await
        .unwrap();
    quota
        .connect_or_reconnect_slot(user, ProviderKind::Drive, "acct-2", "b@example.com", false)
        .await
        .unwrap();

    let denied = quota
        .connect_or_reconnect_slot(user, ProviderKind::Graph, "acct-3", "c@example.com", false)
        .await;
    assert!(matches!(denied, Err(TransferError::QuotaExceeded { .. })));

    let mut conn = pool.get().await.unwrap();
    let plan = UserPlan::find_by_user(&mut conn, user).await.unwrap();
    assert_eq!(plan.slots_used, 2);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_reconnect_stays_free_at_limit() {
    let pool = setup_pool().await;
    let user = seed_plan(&pool, PlanTier::Free).await;
    let quota = QuotaService::new(pool.clone());

    quota
        .connect_or_reconnect_slot(user, ProviderKind::Drive, "acct-1", "a@example.com", false)
        .await
        .unwrap();
    quota
        .connect_or_reconnect_slot(user, ProviderKind::Drive, "acct-2", "b@example.com", false)
        .await
        .unwrap();

    let reconnection = quota
        .connect_or_reconnect_slot(user, ProviderKind::Drive, "acct-1", "a@example.com", false)
        .await
        .unwrap();
    assert!(reconnection.reconnected);
    assert!(!reconnection.is_new);

    let mut conn = pool.get().await.unwrap();
    let plan = UserPlan::find_by_user(&mut conn, user).await.unwrap();
    assert_eq!(plan.slots_used, 2);
}
