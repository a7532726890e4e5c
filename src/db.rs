use std::collections::BTreeMap;

use anyhow::Context as _;
use serde_json::Value;
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::context::{Context, Notice, Policy};
use crate::error::Result;
use crate::models::{NewUser, Role};
use crate::store::{Collection, MemoryStore};
use crate::{suspension, users};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// What one operation produced: its result and the notices it emitted.
pub struct Outcome<T> {
    pub result: Result<T>,
    pub notices: Vec<Notice>,
}

/// Runs one synchronous core operation against a locked snapshot of the
/// documents. Changed collections are written back and committed only when
/// the operation succeeds; otherwise the transaction rolls back.
pub async fn run<T>(
    pool: &PgPool,
    policy: Policy,
    op: impl FnOnce(&mut Context<MemoryStore>) -> Result<T>,
) -> anyhow::Result<Outcome<T>> {
    let mut tx = pool.begin().await.context("failed to open transaction")?;
    sqlx::query("LOCK TABLE waste_reporting.documents IN SHARE ROW EXCLUSIVE MODE")
        .execute(&mut *tx)
        .await?;

    let store = load_snapshot(&mut tx).await?;
    let mut ctx = Context::new(store, policy);
    let result = op(&mut ctx);
    suspension::logout(&mut ctx);

    if result.is_ok() {
        let written = flush(&mut tx, &ctx.store).await?;
        tx.commit().await?;
        tracing::debug!(
            collections = written,
            notices = ctx.notices().len(),
            "Documents committed"
        );
    } else {
        tx.rollback().await?;
        tracing::debug!("Operation failed, documents rolled back");
    }

    Ok(Outcome {
        result,
        notices: ctx.take_notices(),
    })
}

async fn load_snapshot(tx: &mut Transaction<'_, Postgres>) -> anyhow::Result<MemoryStore> {
    let rows = sqlx::query("SELECT key, body FROM waste_reporting.documents")
        .fetch_all(&mut **tx)
        .await?;

    let mut documents = BTreeMap::new();
    for row in rows {
        let key: String = row.get("key");
        if Collection::from_key(&key).is_none() {
            tracing::warn!(%key, "Ignoring unknown document");
            continue;
        }
        let body: Value = row.get("body");
        documents.insert(key, body);
    }

    MemoryStore::from_documents(&documents).context("stored documents are malformed")
}

async fn flush(tx: &mut Transaction<'_, Postgres>, store: &MemoryStore) -> anyhow::Result<usize> {
    if !store.is_dirty() {
        return Ok(0);
    }
    let documents = store.dirty_documents()?;
    for (key, body) in documents.iter() {
        sqlx::query(
            r#"
            INSERT INTO waste_reporting.documents (key, body, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (key) DO UPDATE
            SET body = EXCLUDED.body, updated_at = now()
            "#,
        )
        .bind(*key)
        .bind(body)
        .execute(&mut **tx)
        .await?;
    }
    Ok(documents.len())
}

pub async fn seed(pool: &PgPool, policy: Policy) -> anyhow::Result<usize> {
    let accounts = vec![
        ("Morgan Reyes", "moderator@wastewatch.org", "555-0101", Role::Moderator),
        ("Vic Okafor", "volunteer@wastewatch.org", "555-0102", Role::Volunteer),
        ("Avery Lee", "citizen@wastewatch.org", "555-0103", Role::Citizen),
    ];

    let rows: Vec<NewUser> = accounts
        .into_iter()
        .map(|(fullname, email, phone, role)| NewUser {
            fullname: fullname.to_string(),
            email: email.to_string(),
            password: "demo1234".to_string(),
            phone: phone.to_string(),
            role,
        })
        .collect();

    let outcome = run(pool, policy, |ctx| register_missing(ctx, rows)).await?;
    Ok(outcome.result?)
}

pub async fn import_csv(
    pool: &PgPool,
    policy: Policy,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        fullname: String,
        email: String,
        password: String,
        #[serde(default)]
        phone: String,
        role: Role,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut rows = Vec::new();
    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        rows.push(NewUser {
            fullname: row.fullname,
            email: row.email,
            password: row.password,
            phone: row.phone,
            role: row.role,
        });
    }

    let outcome = run(pool, policy, |ctx| register_missing(ctx, rows)).await?;
    Ok(outcome.result?)
}

/// Registers every account whose email is not already on file.
fn register_missing(ctx: &mut Context<MemoryStore>, rows: Vec<NewUser>) -> Result<usize> {
    let mut inserted = 0usize;
    for row in rows {
        if users::find_by_email(ctx, &row.email)?.is_some() {
            tracing::debug!(email = %row.email, "Skipping registered account");
            continue;
        }
        users::add_user(ctx, row)?;
        inserted += 1;
    }
    Ok(inserted)
}
