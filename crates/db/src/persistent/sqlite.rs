//! SQLite implementation of the storage layer.
//!
//! The `quotes` table layout is the wire-compatible record of accepted
//! quotes: monetary fields as decimal text (arbitrary precision survives
//! round-trips), calldata as hex text, integer fields as native INTEGER.

use std::str::FromStr;

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use bitcoin::Network;
use bridge_lp_primitives::{
    BtcAddress, Quote, QuoteHash, QuoteParams, RegistrationStatus, StateKind, TxRef,
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Row, SqlitePool,
};
use tracing::debug;

use crate::{
    errors::{DbError, DbResult},
    quote::QuoteDb,
    registration::RegistrationDb,
};

const CREATE_QUOTES: &str = r#"
CREATE TABLE IF NOT EXISTS quotes (
    hash TEXT PRIMARY KEY,
    fed_addr TEXT,
    lbc_addr TEXT,
    lp_rsk_addr TEXT,
    btc_refund_addr TEXT,
    rsk_refund_addr TEXT,
    lp_btc_addr TEXT,
    call_fee TEXT,
    penalty_fee TEXT,
    contract_addr TEXT,
    data TEXT,
    gas_limit INTEGER,
    nonce INTEGER,
    value TEXT,
    agreement_timestamp INTEGER,
    time_for_deposit INTEGER,
    call_time INTEGER,
    confirmations INTEGER,
    call_on_register INTEGER
)
"#;

const CREATE_REGISTRATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS registrations (
    quote_hash TEXT PRIMARY KEY,
    state TEXT NOT NULL,
    reg_tx_ref TEXT,
    call_tx_ref TEXT,
    reason TEXT,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
)
"#;

const CREATE_SUBMISSION_MARKERS: &str = r#"
CREATE TABLE IF NOT EXISTS submission_markers (
    quote_hash TEXT PRIMARY KEY,
    claimed_at TEXT NOT NULL DEFAULT (datetime('now'))
)
"#;

/// SQLite-backed store for quotes and registration status.
///
/// The pool is exclusively owned by this type; no other component talks
/// to the database file.
#[derive(Debug, Clone)]
pub struct SqliteDb {
    pool: SqlitePool,
    network: Network,
}

impl SqliteDb {
    /// Opens (creating if missing) the database at `path` and bootstraps
    /// the schema. `network` is the UTXO-chain network stored bitcoin
    /// addresses are validated against on load.
    pub async fn connect(path: &str, network: Network) -> DbResult<Self> {
        debug!(path, "connecting to sqlite");
        let options = SqliteConnectOptions::from_str(path)
            .map_err(DbError::Storage)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Self::from_pool(pool, network).await
    }

    /// Bootstraps the schema on an existing pool.
    pub async fn from_pool(pool: SqlitePool, network: Network) -> DbResult<Self> {
        sqlx::query(CREATE_QUOTES).execute(&pool).await?;
        sqlx::query(CREATE_REGISTRATIONS).execute(&pool).await?;
        sqlx::query(CREATE_SUBMISSION_MARKERS).execute(&pool).await?;

        Ok(Self { pool, network })
    }

    /// Closes the pool; idempotent.
    pub async fn close(&self) {
        debug!("closing sqlite pool");
        self.pool.close().await;
    }

    fn quote_from_row(&self, row: &SqliteRow) -> DbResult<Quote> {
        let params = QuoteParams {
            fed_addr: self.btc_addr(row, "fed_addr")?,
            lbc_addr: evm_addr(row, "lbc_addr")?,
            lp_rsk_addr: evm_addr(row, "lp_rsk_addr")?,
            btc_refund_addr: self.btc_addr(row, "btc_refund_addr")?,
            rsk_refund_addr: evm_addr(row, "rsk_refund_addr")?,
            lp_btc_addr: self.btc_addr(row, "lp_btc_addr")?,
            call_fee: wei(row, "call_fee")?,
            penalty_fee: wei(row, "penalty_fee")?,
            contract_addr: evm_addr(row, "contract_addr")?,
            data: calldata(row, "data")?,
            gas_limit: unsigned(row, "gas_limit")?,
            nonce: row.try_get::<i64, _>("nonce")?,
            value: wei(row, "value")?,
            agreement_timestamp: unsigned(row, "agreement_timestamp")?,
            time_for_deposit: unsigned(row, "time_for_deposit")?,
            call_time: unsigned(row, "call_time")?,
            confirmations: unsigned(row, "confirmations")?,
            call_on_register: row.try_get::<i64, _>("call_on_register")? != 0,
        };

        Quote::new(params).map_err(|e| DbError::Corrupt(e.to_string()))
    }

    fn btc_addr(&self, row: &SqliteRow, column: &str) -> DbResult<BtcAddress> {
        let text: String = row.try_get(column)?;
        BtcAddress::parse(&text, self.network)
            .map_err(|e| DbError::Corrupt(format!("{column}: {e}")))
    }

    fn status_from_row(row: &SqliteRow) -> DbResult<RegistrationStatus> {
        let state: String = row.try_get("state")?;
        let state = state
            .parse::<StateKind>()
            .map_err(|e| DbError::Corrupt(e.to_string()))?;

        Ok(RegistrationStatus {
            state,
            reg_tx_ref: tx_ref(row, "reg_tx_ref")?,
            call_tx_ref: tx_ref(row, "call_tx_ref")?,
            reason: row.try_get("reason")?,
        })
    }
}

fn evm_addr(row: &SqliteRow, column: &str) -> DbResult<Address> {
    let text: String = row.try_get(column)?;
    text.parse()
        .map_err(|e| DbError::Corrupt(format!("{column}: {e}")))
}

fn wei(row: &SqliteRow, column: &str) -> DbResult<U256> {
    let text: String = row.try_get(column)?;
    U256::from_str_radix(&text, 10).map_err(|e| DbError::Corrupt(format!("{column}: {e}")))
}

fn calldata(row: &SqliteRow, column: &str) -> DbResult<Bytes> {
    let text: String = row.try_get(column)?;
    let bytes = hex::decode(&text).map_err(|e| DbError::Corrupt(format!("{column}: {e}")))?;
    Ok(Bytes::from(bytes))
}

fn unsigned<T: TryFrom<i64>>(row: &SqliteRow, column: &str) -> DbResult<T> {
    let raw: i64 = row.try_get(column)?;
    T::try_from(raw).map_err(|_| DbError::Corrupt(format!("{column} out of range: {raw}")))
}

fn tx_ref(row: &SqliteRow, column: &str) -> DbResult<Option<TxRef>> {
    let text: Option<String> = row.try_get(column)?;
    text.map(|t| {
        t.parse::<TxRef>()
            .map_err(|e| DbError::Corrupt(format!("{column}: {e}")))
    })
    .transpose()
}

#[async_trait]
impl QuoteDb for SqliteDb {
    async fn insert_quote(&self, hash: QuoteHash, quote: &Quote) -> DbResult<()> {
        debug!(%hash, "inserting quote");
        let result = sqlx::query(
            r#"
            INSERT INTO quotes (
                hash,
                fed_addr,
                lbc_addr,
                lp_rsk_addr,
                btc_refund_addr,
                rsk_refund_addr,
                lp_btc_addr,
                call_fee,
                penalty_fee,
                contract_addr,
                data,
                gas_limit,
                nonce,
                value,
                agreement_timestamp,
                time_for_deposit,
                call_time,
                confirmations,
                call_on_register
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(hash) DO NOTHING
            "#,
        )
        .bind(hash.to_string())
        .bind(quote.fed_addr().canonical())
        .bind(quote.lbc_addr().to_string())
        .bind(quote.lp_rsk_addr().to_string())
        .bind(quote.btc_refund_addr().canonical())
        .bind(quote.rsk_refund_addr().to_string())
        .bind(quote.lp_btc_addr().canonical())
        .bind(quote.call_fee().to_string())
        .bind(quote.penalty_fee().to_string())
        .bind(quote.contract_addr().to_string())
        .bind(hex::encode(quote.data()))
        .bind(quote.gas_limit() as i64)
        .bind(quote.nonce())
        .bind(quote.value().to_string())
        .bind(i64::from(quote.agreement_timestamp()))
        .bind(i64::from(quote.time_for_deposit()))
        .bind(i64::from(quote.call_time()))
        .bind(i64::from(quote.confirmations()))
        .bind(i64::from(quote.call_on_register()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Conflict);
        }
        Ok(())
    }

    async fn get_quote(&self, hash: QuoteHash) -> DbResult<Quote> {
        debug!(%hash, "retrieving quote");
        let row = sqlx::query("SELECT * FROM quotes WHERE hash = ? LIMIT 1")
            .bind(hash.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => self.quote_from_row(&row),
            None => Err(DbError::NotFound),
        }
    }
}

#[async_trait]
impl RegistrationDb for SqliteDb {
    async fn claim_submission(&self, hash: QuoteHash) -> DbResult<bool> {
        let result = sqlx::query(
            "INSERT INTO submission_markers (quote_hash) VALUES (?) \
             ON CONFLICT(quote_hash) DO NOTHING",
        )
        .bind(hash.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn upsert_status(&self, hash: QuoteHash, status: &RegistrationStatus) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO registrations (quote_hash, state, reg_tx_ref, call_tx_ref, reason)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(quote_hash) DO UPDATE SET
                state = excluded.state,
                reg_tx_ref = excluded.reg_tx_ref,
                call_tx_ref = excluded.call_tx_ref,
                reason = excluded.reason,
                updated_at = datetime('now')
            "#,
        )
        .bind(hash.to_string())
        .bind(status.state.to_string())
        .bind(status.reg_tx_ref.map(|t| t.to_string()))
        .bind(status.call_tx_ref.map(|t| t.to_string()))
        .bind(status.reason.clone())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_status(&self, hash: QuoteHash) -> DbResult<Option<RegistrationStatus>> {
        let row = sqlx::query("SELECT * FROM registrations WHERE quote_hash = ? LIMIT 1")
            .bind(hash.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| Self::status_from_row(&row)).transpose()
    }

    async fn load_in_flight(&self) -> DbResult<Vec<(QuoteHash, RegistrationStatus)>> {
        let rows = sqlx::query(
            "SELECT * FROM registrations \
             WHERE state IN ('submitting', 'awaiting_user_call', 'call_in_flight')",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let hash: String = row.try_get("quote_hash")?;
                let hash = hash
                    .parse::<QuoteHash>()
                    .map_err(|e| DbError::Corrupt(e.to_string()))?;
                Ok((hash, Self::status_from_row(row)?))
            })
            .collect()
    }
}
