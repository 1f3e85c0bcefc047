use anyhow::Context;

// Advisory locks are scoped to the Postgres session. This is used as a
// best-effort guard against concurrent advisor runs on the same slot.
const LOCK_NAMESPACE: i64 = 0x494E_444F_5245; // "INDORE" as hex-ish namespace.

fn lock_key_for_slot(slot_key: &str) -> i64 {
    LOCK_NAMESPACE ^ (fnv1a64(slot_key) as i64)
}

// FNV-1a; stable across processes, unlike the std hasher's random state.
fn fnv1a64(s: &str) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET_BASIS;
    for byte in s.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

pub async fn try_acquire_slot_lock(
    pool: &sqlx::PgPool,
    slot_key: &str,
) -> anyhow::Result<bool> {
    let key = lock_key_for_slot(slot_key);
    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(key)
        .fetch_one(pool)
        .await
        .with_context(|| format!("failed to acquire advisory lock (key={key})"))?;
    Ok(acquired.0)
}

pub async fn release_slot_lock(pool: &sqlx::PgPool, slot_key: &str) -> anyhow::Result<()> {
    let key = lock_key_for_slot(slot_key);
    sqlx::query("SELECT pg_advisory_unlock($1)")
        .persistent(false)
        .bind(key)
        .execute(pool)
        .await
        .with_context(|| format!("failed to release advisory lock (key={key})"))?;
    Ok(())
}
