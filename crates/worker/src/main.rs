use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use indorex_core::domain::holding::PortfolioState;
use indorex_core::llm::{GenerateInput, SuggestionClient};
use indorex_core::store::PortfolioStore;

#[derive(Debug, Parser)]
#[command(name = "indorex_worker")]
struct Args {
    /// Free-text question for the advisor.
    #[arg(long)]
    query: String,

    /// Portfolio slot to operate on.
    #[arg(long, default_value = "default")]
    user: String,

    /// Comma-separated names of uploaded documents to cite in the prompt.
    #[arg(long)]
    documents: Option<String>,

    /// Do everything except writing to the database.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = indorex_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    let documents = parse_documents(args.documents.as_deref());

    let llm = indorex_core::llm::anthropic::AnthropicClient::from_settings(&settings)?;
    let provider = "anthropic";

    if args.dry_run {
        let mut store = PortfolioStore::seeded();
        let input = GenerateInput::try_new(args.query.clone(), store.holdings(), documents)?;
        let batch = llm.generate_suggestions(input).await?;
        let snapshot_id = store
            .apply_suggestions(&batch.summary, &batch.suggestions)
            .context("suggestion batch rejected by the store")?;

        tracing::info!(
            dry_run = true,
            %snapshot_id,
            summary = %batch.summary,
            suggestions = batch.suggestions.len(),
            holdings = ?store.holdings(),
            "advisor run complete (nothing persisted)"
        );
        return Ok(());
    }

    let db_url = settings.require_database_url()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    indorex_core::storage::migrate(&pool).await?;

    let slot = indorex_core::storage::portfolio_state::slot_key(&args.user);

    let acquired = indorex_core::storage::lock::try_acquire_slot_lock(&pool, &slot).await?;
    if !acquired {
        tracing::warn!(%slot, "slot lock not acquired; another advisor run in progress");
        return Ok(());
    }

    let state = indorex_core::storage::portfolio_state::load_state(&pool, &args.user)
        .await?
        .unwrap_or_else(PortfolioState::seed);
    let mut store = PortfolioStore::from_state(state);

    let input = GenerateInput::try_new(args.query.clone(), store.holdings(), documents)?;
    let llm_result = llm.generate_suggestions_with_raw(input).await;

    match llm_result {
        Ok((batch, raw)) => match store.apply_suggestions(&batch.summary, &batch.suggestions) {
            Ok(snapshot_id) => {
                indorex_core::storage::portfolio_state::save_state(
                    &pool,
                    &args.user,
                    &store.state(),
                )
                .await?;

                let run_id = indorex_core::storage::suggestion_runs::record_success(
                    &pool,
                    &slot,
                    &args.query,
                    provider,
                    &batch.summary,
                    batch.suggestions.len() as i32,
                    Some(raw),
                )
                .await?;

                tracing::info!(%slot, %snapshot_id, %run_id, "applied suggestion batch");
            }
            Err(err) => {
                let err = anyhow::Error::new(err);
                sentry_anyhow::capture_anyhow(&err);

                let run_id = indorex_core::storage::suggestion_runs::record_failure(
                    &pool,
                    &slot,
                    &args.query,
                    provider,
                    &format!("{:#}", err),
                    Some(raw),
                )
                .await?;

                tracing::error!(%slot, %run_id, error = %err, "suggestion batch rejected by the store");
            }
        },
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            let mut raw_llm_response: Option<serde_json::Value> = None;
            if let Some(diag) =
                err.downcast_ref::<indorex_core::llm::error::LlmDiagnosticsError>()
            {
                if let Some(raw) = diag.raw_output.as_deref() {
                    raw_llm_response = serde_json::from_str(raw)
                        .ok()
                        .or_else(|| Some(serde_json::json!({"raw_text": raw})));
                }
            }

            let run_id = indorex_core::storage::suggestion_runs::record_failure(
                &pool,
                &slot,
                &args.query,
                provider,
                &format!("{:#}", err),
                raw_llm_response,
            )
            .await?;

            tracing::error!(%slot, %run_id, error = %err, "advisor run failed");
        }
    }

    let _ = indorex_core::storage::lock::release_slot_lock(&pool, &slot).await;
    Ok(())
}

fn parse_documents(v: Option<&str>) -> Vec<String> {
    let Some(v) = v else {
        return Vec::new();
    };
    v.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn init_sentry(settings: &indorex_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_documents_splits_and_trims() {
        assert_eq!(
            parse_documents(Some("mifid3.pdf, esg_update.docx ,")),
            vec!["mifid3.pdf".to_string(), "esg_update.docx".to_string()]
        );
        assert!(parse_documents(None).is_empty());
        assert!(parse_documents(Some("  ,")).is_empty());
    }
}
