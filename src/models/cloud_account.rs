// Cloud Account Database Model
// A user's connection to one remote storage account; tokens stored encrypted

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::schema::cloud_accounts;
use crate::utils::TransferError;

/// Supported storage providers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Drive,
    Graph,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Drive => "drive",
            ProviderKind::Graph => "graph",
        }
    }

    /// Seconds before stored expiry at which a token is treated as
    /// expiring. Graph tokens get a wider margin because session-chunked
    /// uploads can outlive a short one.
    pub fn expiry_buffer_secs(&self) -> i64 {
        match self {
            ProviderKind::Drive => 60,
            ProviderKind::Graph => 300,
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drive" => Ok(ProviderKind::Drive),
            "graph" => Ok(ProviderKind::Graph),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// Cloud account database model
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = cloud_accounts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CloudAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: String,
    pub provider_account_id: String,
    pub account_email: String,
    pub access_token_enc: String,
    pub refresh_token_enc: String,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New account row for insertion (reconnect flows upsert instead)
#[derive(Debug, Insertable)]
#[diesel(table_name = cloud_accounts)]
pub struct NewCloudAccount {
    pub user_id: Uuid,
    pub provider: String,
    pub provider_account_id: String,
    pub account_email: String,
    pub access_token_enc: String,
    pub refresh_token_enc: String,
    pub token_expires_at: Option<DateTime<Utc>>,
}

impl CloudAccount {
    pub fn provider_kind(&self) -> Result<ProviderKind, TransferError> {
        ProviderKind::from_str(&self.provider)
            .map_err(TransferError::InvalidArgument)
    }

    /// Find account by id
    pub async fn find_by_id(
        conn: &mut AsyncPgConnection,
        account_id: Uuid,
    ) -> Result<Self, TransferError> {
        use crate::schema::cloud_accounts::dsl::*;

        cloud_accounts
            .filter(id.eq(account_id))
            .first::<CloudAccount>(conn)
            .await
            .map_err(TransferError::from)
    }

    /// Insert or refresh the account row for a connect. An existing row
    /// for the same (user, provider, account) key gets the new credential
    /// set and comes back active.
    pub async fn upsert_connection(
        conn: &mut AsyncPgConnection,
        new_account: NewCloudAccount,
    ) -> Result<Self, TransferError> {
        use crate::schema::cloud_accounts::dsl::*;

        diesel::insert_into(cloud_accounts)
            .values(&new_account)
            .on_conflict((user_id, provider, provider_account_id))
            .do_update()
            .set((
                account_email.eq(&new_account.account_email),
                access_token_enc.eq(&new_account.access_token_enc),
                refresh_token_enc.eq(&new_account.refresh_token_enc),
                token_expires_at.eq(new_account.token_expires_at),
                is_active.eq(true),
                disconnected_at.eq(None::<DateTime<Utc>>),
                updated_at.eq(Utc::now()),
            ))
            .get_result::<CloudAccount>(conn)
            .await
            .map_err(TransferError::from)
    }

    /// Persist a refreshed access token. The refresh token column is only
    /// rewritten when the provider actually rotated it; overwriting with a
    /// stale copy loses the working credential.
    pub async fn persist_refreshed_tokens(
        conn: &mut AsyncPgConnection,
        account_id: Uuid,
        new_access_token_enc: &str,
        new_expiry: DateTime<Utc>,
        rotated_refresh_token_enc: Option<&str>,
    ) -> Result<(), TransferError> {
        use crate::schema::cloud_accounts::dsl::*;

        match rotated_refresh_token_enc {
            Some(rt) => {
                diesel::update(cloud_accounts.filter(id.eq(account_id)))
                    .set((
                        access_token_enc.eq(new_access_token_enc),
                        refresh_token_enc.eq(rt),
                        token_expires_at.eq(Some(new_expiry)),
                        is_active.eq(true),
                        disconnected_at.eq(None::<DateTime<Utc>>),
                        updated_at.eq(Utc::now()),
                    ))
                    .execute(conn)
                    .await?;
            },
            None => {
                diesel::update(cloud_accounts.filter(id.eq(account_id)))
                    .set((
                        access_token_enc.eq(new_access_token_enc),
                        token_expires_at.eq(Some(new_expiry)),
                        is_active.eq(true),
                        disconnected_at.eq(None::<DateTime<Utc>>),
                        updated_at.eq(Utc::now()),
                    ))
                    .execute(conn)
                    .await?;
            },
        }
        Ok(())
    }

    /// Soft-disconnect: flagged for reconnection, row retained
    pub async fn deactivate(
        conn: &mut AsyncPgConnection,
        account_id: Uuid,
    ) -> Result<(), TransferError> {
        use crate::schema::cloud_accounts::dsl::*;

        diesel::update(cloud_accounts.filter(id.eq(account_id)))
            .set((
                is_active.eq(false),
                disconnected_at.eq(Some(Utc::now())),
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

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!(ProviderKind::from_str("drive"), Ok(ProviderKind::Drive));
        assert_eq!(ProviderKind::from_str("graph"), Ok(ProviderKind::Graph));
        assert!(ProviderKind::from_str("dropbox").is_err());
    }

    #[test]
    fn test_expiry_buffers() {
        assert_eq!(ProviderKind::Drive.expiry_buffer_secs(), 60);
        assert_eq!(ProviderKind::Graph.expiry_buffer_secs(), 300);
    }
}
