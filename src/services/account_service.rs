use chrono::Utc;
use sea_orm::sea_query::{LockType, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    entity::{
        account_entries::{
            ActiveModel as EntryActive, Column as EntryCol, Entity as AccountEntries,
            Model as EntryModel,
        },
        accounts::{ActiveModel as AccountActive, Column as AccountCol, Entity as Accounts, Model as AccountModel},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_self_or_admin},
    models::{Account, AccountEntry, EntryType},
    response::{ApiResponse, Meta},
    state::AppState,
};

/// Balance after applying a credit.
pub fn next_balance(balance: i64, amount: i64) -> AppResult<i64> {
    if amount <= 0 {
        return Err(AppError::BadRequest(
            "credit amount must be greater than 0".into(),
        ));
    }
    balance
        .checked_add(amount)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("account balance overflow")))
}

/// Appends a payment entry and raises the balance. Runs on the caller's
/// connection so it can join an outer transaction; the account row is locked
/// for the duration.
pub async fn credit<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    amount: i64,
    reference: &str,
) -> AppResult<AccountModel> {
    if amount <= 0 {
        return Err(AppError::BadRequest(
            "credit amount must be greater than 0".into(),
        ));
    }

    let now = Utc::now();
    Accounts::insert(AccountActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        balance: Set(0),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    })
    .on_conflict(OnConflict::column(AccountCol::UserId).do_nothing().to_owned())
    .exec_without_returning(conn)
    .await?;

    let account = Accounts::find()
        .filter(AccountCol::UserId.eq(user_id))
        .lock(LockType::Update)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("account missing after upsert")))?;

    let balance_after = next_balance(account.balance, amount)?;

    EntryActive {
        id: Set(Uuid::new_v4()),
        account_id: Set(account.id),
        amount: Set(amount),
        entry_type: Set(EntryType::Payment.as_str().to_string()),
        reference: Set(reference.to_string()),
        balance_after: Set(balance_after),
        created_at: Set(now.into()),
    }
    .insert(conn)
    .await?;

    let mut active: AccountActive = account.into();
    active.balance = Set(balance_after);
    active.updated_at = Set(now.into());
    let account = active.update(conn).await?;

    tracing::info!(
        %user_id,
        amount,
        balance = account.balance,
        reference,
        "seller account credited"
    );

    Ok(account)
}

pub async fn get_account(
    state: &AppState,
    user: &AuthUser,
    user_id: Uuid,
) -> AppResult<ApiResponse<Account>> {
    ensure_self_or_admin(user, user_id)?;

    let account = Accounts::find()
        .filter(AccountCol::UserId.eq(user_id))
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Account"))?;

    let history = AccountEntries::find()
        .filter(EntryCol::AccountId.eq(account.id))
        .order_by_desc(EntryCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(entry_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    let meta = Meta::total(history.len());
    Ok(ApiResponse::success(
        "Account",
        account_from_entity(account, history),
        Some(meta),
    ))
}

fn account_from_entity(model: AccountModel, history: Vec<AccountEntry>) -> Account {
    Account {
        id: model.id,
        user_id: model.user_id,
        balance: model.balance,
        history,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

fn entry_from_entity(model: EntryModel) -> AppResult<AccountEntry> {
    Ok(AccountEntry {
        id: model.id,
        amount: model.amount,
        entry_type: model.entry_type.parse()?,
        reference: model.reference,
        balance_after: model.balance_after,
        created_at: model.created_at.with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_after_is_running_sum() {
        let credits = [160, 40, 1000];
        let mut balance = 0;
        let mut afters = Vec::new();
        for amount in credits {
            balance = next_balance(balance, amount).unwrap();
            afters.push(balance);
        }
        assert_eq!(afters, vec![160, 200, 1200]);
        assert_eq!(balance, credits.iter().sum::<i64>());
    }

    #[test]
    fn rejects_non_positive_credit() {
        assert!(matches!(next_balance(10, 0), Err(AppError::BadRequest(_))));
        assert!(matches!(next_balance(10, -5), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn rejects_overflow() {
        assert!(matches!(
            next_balance(i64::MAX, 1),
            Err(AppError::Internal(_))
        ));
    }
}
