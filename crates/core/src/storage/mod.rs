use anyhow::Context;

pub mod lock;
pub mod portfolio_state;
pub mod suggestion_runs;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}
