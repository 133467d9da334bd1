//! Gift catalog and gift sending.

use tracing::{info, instrument};
use uuid::Uuid;

use pulse_models::gift::price_gift;
use pulse_models::pagination::PageQuery;
use pulse_models::{CreateGiftRequest, FundsMovement, Gift, GiftSend, LedgerEntryKind, SendGiftRequest};

use crate::error::{DbError, DbResult};
use crate::ledger;
use crate::pool::Database;
use crate::retry::with_retry;
use crate::rows::{GiftRow, GiftSendRow};

const GIFT_COLUMNS: &str = "id, name, price, icon_url, is_active, created_at";

const SEND_COLUMNS: &str = "id, gift_id, sender_id, recipient_id, stream_id, quantity, \
     total_price, platform_fee, message, created_at";

/// Repository for gifts.
#[derive(Clone)]
pub struct GiftRepository {
    db: Database,
    fee_bps: u32,
}

impl GiftRepository {
    pub fn new(db: Database, fee_bps: u32) -> Self {
        Self { db, fee_bps }
    }

    /// Active gifts, cheapest first.
    pub async fn catalog(&self) -> DbResult<Vec<Gift>> {
        let rows: Vec<GiftRow> = sqlx::query_as(&format!(
            "SELECT {} FROM gifts WHERE is_active ORDER BY price ASC, name ASC",
            GIFT_COLUMNS
        ))
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn create_gift(&self, request: &CreateGiftRequest) -> DbResult<Gift> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(DbError::invalid("gift name must not be blank"));
        }

        let result: Result<GiftRow, sqlx::Error> = sqlx::query_as(&format!(
            "INSERT INTO gifts (id, name, price, icon_url) VALUES ($1, $2, $3, $4) RETURNING {}",
            GIFT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(request.price)
        .bind(request.icon_url.as_deref())
        .fetch_one(self.db.pool())
        .await;

        match result.map_err(DbError::from) {
            Ok(row) => Ok(row.into()),
            Err(e) if e.is_unique_violation() => {
                Err(DbError::conflict(format!("gift '{}' already exists", name)))
            }
            Err(e) => Err(e),
        }
    }

    /// Send a gift: the sender pays the full price and the recipient gets
    /// the price minus the platform fee.
    #[instrument(skip(self, request), fields(gift_id = %request.gift_id, recipient = %request.recipient_id))]
    pub async fn send(&self, sender_id: Uuid, request: &SendGiftRequest) -> DbResult<GiftSend> {
        if sender_id == request.recipient_id {
            return Err(DbError::invalid("cannot send a gift to yourself"));
        }

        let fee_bps = self.fee_bps;
        with_retry(self.db.retry(), "send_gift", move || async move {
            let mut tx = self.db.pool().begin().await?;

            let gift: Gift = sqlx::query_as::<_, GiftRow>(&format!(
                "SELECT {} FROM gifts WHERE id = $1",
                GIFT_COLUMNS
            ))
            .bind(request.gift_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DbError::not_found(format!("gift {}", request.gift_id)))?
            .into();
            if !gift.is_active {
                return Err(DbError::InvalidState("gift is no longer available".to_string()));
            }

            let recipient: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE id = $1")
                .bind(request.recipient_id)
                .fetch_optional(&mut *tx)
                .await?;
            if recipient.is_none() {
                return Err(DbError::not_found(format!("user {}", request.recipient_id)));
            }

            if let Some(stream_id) = request.stream_id {
                let owner: Option<(Uuid,)> = sqlx::query_as("SELECT owner_id FROM streams WHERE id = $1")
                    .bind(stream_id)
                    .fetch_optional(&mut *tx)
                    .await?;
                match owner {
                    None => return Err(DbError::not_found(format!("stream {}", stream_id))),
                    Some((owner_id,)) if owner_id != request.recipient_id => {
                        return Err(DbError::invalid("stream is not owned by the recipient"));
                    }
                    Some(_) => {}
                }
            }

            let split = price_gift(gift.price, request.quantity, fee_bps)?;
            let send_id = Uuid::new_v4();
            let movement = FundsMovement {
                from_user_id: sender_id,
                to_user_id: request.recipient_id,
                debit: split.total,
                credit: split.net,
                debit_kind: LedgerEntryKind::GiftSent,
                credit_kind: LedgerEntryKind::GiftReceived,
                reference_id: send_id,
                note: Some(gift.name.clone()),
            };
            ledger::move_funds(&mut tx, &movement).await?;

            let message = request
                .message
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty());

            let row: GiftSendRow = sqlx::query_as(&format!(
                "INSERT INTO gift_sends \
                 (id, gift_id, sender_id, recipient_id, stream_id, quantity, total_price, platform_fee, message) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {}",
                SEND_COLUMNS
            ))
            .bind(send_id)
            .bind(gift.id)
            .bind(sender_id)
            .bind(request.recipient_id)
            .bind(request.stream_id)
            .bind(request.quantity)
            .bind(split.total)
            .bind(split.fee)
            .bind(message)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            info!(
                send_id = %send_id,
                total = split.total,
                fee = split.fee,
                "Gift sent"
            );
            Ok(row.into())
        })
        .await
    }

    pub async fn sent(&self, user_id: Uuid, page: &PageQuery) -> DbResult<Vec<GiftSend>> {
        self.history("sender_id", user_id, page).await
    }

    pub async fn received(&self, user_id: Uuid, page: &PageQuery) -> DbResult<Vec<GiftSend>> {
        self.history("recipient_id", user_id, page).await
    }

    async fn history(&self, column: &str, user_id: Uuid, page: &PageQuery) -> DbResult<Vec<GiftSend>> {
        let before = page.cursor().map_err(DbError::Invalid)?;
        let rows: Vec<GiftSendRow> = sqlx::query_as(&format!(
            "SELECT {} FROM gift_sends WHERE {} = $1 \
             AND ($2::timestamptz IS NULL OR created_at < $2) \
             ORDER BY created_at DESC LIMIT $3",
            SEND_COLUMNS, column
        ))
        .bind(user_id)
        .bind(before)
        .bind(i64::from(page.limit()))
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
