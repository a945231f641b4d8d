use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use sqlx::PgPool;

use fitkit_common::config::AppConfig;
use fitkit_notifier::{ContentGenerator, Notifier, PgDeliveryLog};

use crate::report::{HttpReportRenderer, ReportRenderer};

/// Shared handles for the jobs, the OTP flow and the API handlers.
#[derive(Clone)]
pub struct EngineContext {
    pub pool: PgPool,
    pub notifier: Arc<Notifier>,
    pub content: Arc<ContentGenerator>,
    /// `None` when no renderer is configured; report features answer 503.
    pub renderer: Option<Arc<dyn ReportRenderer>>,
    pub offset: FixedOffset,
    pub reports_dir: PathBuf,
    pub otp_secret: String,
}

impl EngineContext {
    pub fn from_config(pool: PgPool, config: &AppConfig) -> Self {
        let log = Arc::new(PgDeliveryLog::new(pool.clone()));
        let notifier = Notifier::from_config(config, log);
        let content = ContentGenerator::new(
            config.google_api_key.clone(),
            config.gemini_model.clone(),
            config.app_name.clone(),
        )
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "AI client could not be built, using templates only");
            ContentGenerator::templates_only(config.app_name.clone())
        });
        let renderer = config.report_renderer_url.clone().and_then(|url| {
            match HttpReportRenderer::new(url, config.reports_dir.clone()) {
                Ok(renderer) => Some(Arc::new(renderer) as Arc<dyn ReportRenderer>),
                Err(e) => {
                    tracing::warn!(error = %e, "Report renderer client could not be built, PDF reports disabled");
                    None
                }
            }
        });

        Self {
            pool,
            notifier: Arc::new(notifier),
            content: Arc::new(content),
            renderer,
            offset: config.local_offset(),
            reports_dir: PathBuf::from(&config.reports_dir),
            otp_secret: config.otp_hash_secret.clone(),
        }
    }

    pub fn now_local(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }
}
