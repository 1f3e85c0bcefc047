use crate::domain::holding::PortfolioState;
use anyhow::Context;

/// Bump when the persisted document shape changes; `load_state` refuses
/// documents written by a newer schema.
pub const SCHEMA_VERSION: i32 = 1;

const SLOT_NAMESPACE: &str = "indorex.portfolio";

pub fn slot_key(user: &str) -> String {
    format!("{SLOT_NAMESPACE}.{}", user.trim())
}

/// Upserts the whole `{holdings, history}` document for the user's slot.
pub async fn save_state(
    pool: &sqlx::PgPool,
    user: &str,
    state: &PortfolioState,
) -> anyhow::Result<()> {
    let doc = serde_json::to_value(state).context("failed to serialize portfolio state")?;

    sqlx::query(
        "INSERT INTO portfolio_state (slot_key, schema_version, doc, updated_at) \
         VALUES ($1, $2, $3, now()) \
         ON CONFLICT (slot_key) DO UPDATE SET \
           schema_version = EXCLUDED.schema_version, \
           doc = EXCLUDED.doc, \
           updated_at = now()",
    )
    .persistent(false)
    .bind(slot_key(user))
    .bind(SCHEMA_VERSION)
    .bind(doc)
    .execute(pool)
    .await
    .context("upsert portfolio_state failed")?;

    Ok(())
}

/// Returns `None` when the slot has never been written; callers fall back
/// to the default seed.
pub async fn load_state(
    pool: &sqlx::PgPool,
    user: &str,
) -> anyhow::Result<Option<PortfolioState>> {
    let row = sqlx::query_as::<_, (i32, serde_json::Value)>(
        "SELECT schema_version, doc FROM portfolio_state WHERE slot_key = $1",
    )
    .persistent(false)
    .bind(slot_key(user))
    .fetch_optional(pool)
    .await
    .context("select portfolio_state failed")?;

    let Some((version, doc)) = row else {
        return Ok(None);
    };

    // Older versions would be migrated here; v1 is the first schema.
    anyhow::ensure!(
        version <= SCHEMA_VERSION,
        "portfolio_state slot written by newer schema version {version} (supported: {SCHEMA_VERSION})"
    );

    let state = serde_json::from_value::<PortfolioState>(doc)
        .context("failed to decode portfolio_state doc")?;
    Ok(Some(state))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_key_is_namespaced_and_trimmed() {
        assert_eq!(slot_key("default"), "indorex.portfolio.default");
        assert_eq!(slot_key("  alice "), "indorex.portfolio.alice");
    }
}
