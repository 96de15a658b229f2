#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), forbid(clippy::expect_used))]
//! Service entry-point: wires adapters into the domain services and runs the
//! background loops until interrupted.

use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::{Context, Result, eyre};
use mockable::{Clock, DefaultClock};
use ortho_config::OrthoConfig as _;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use staging_backend::AppSettings;
use staging_backend::domain::ports::BearerTokenProvider;
use staging_backend::domain::scheduling::{PeriodicJob, PeriodicTask, Sleeper, TokioSleeper};
use staging_backend::domain::{
    ContactBroadcaster, ContactTickerJob, MessageTemplates, NotificationSyncJob,
    NotificationSyncPorts, RequestLifecyclePorts, RequestLifecycleService, TokenLifecycleConfig,
    TokenLifecycleManager,
};
use staging_backend::outbound::directory::DirectoryHttpClient;
use staging_backend::outbound::lims::{LimsAuthClient, LimsDatasetClient};
use staging_backend::outbound::mail::SendmailNotifier;
use staging_backend::outbound::persistence::{
    DbPool, DieselContactRepository, DieselDownloadRequestRepository,
    DieselNotificationWatermarkRepository, PoolConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let settings = AppSettings::load_from_iter(std::env::args_os())
        .map_err(|err| eyre!("failed to load settings: {err}"))?;
    settings.validate().wrap_err("invalid settings")?;

    let running = Services::build(&settings).await?.start().await;
    info!("staging service running");

    tokio::signal::ctrl_c()
        .await
        .wrap_err("failed to listen for shutdown signal")?;
    info!("shutdown requested");
    running.stop().await;
    Ok(())
}

type Schedule = Vec<(Arc<dyn PeriodicJob>, Duration)>;

/// Wired but not yet running services.
struct Services {
    tokens: TokenLifecycleManager,
    /// Jobs that never call the LIMS.
    local_jobs: Schedule,
    /// LIMS feeds; started once a token is held or `login_grace` has passed.
    lims_jobs: Schedule,
    login_grace: Duration,
    sleeper: Arc<dyn Sleeper>,
}

/// Handles on everything started by [`Services::start`].
struct Running {
    tokens: TokenLifecycleManager,
    tasks: Vec<PeriodicTask>,
}

impl Services {
    async fn build(settings: &AppSettings) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
        let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);
        let timeout = settings.http_timeout();

        let pool = DbPool::new(PoolConfig::new(settings.database_url()?))
            .await
            .wrap_err("failed to build database pool")?;
        let service = Arc::new(RequestLifecycleService::new(
            RequestLifecyclePorts {
                requests: Arc::new(DieselDownloadRequestRepository::new(pool.clone())),
                contacts: Arc::new(DieselContactRepository::new(pool.clone())),
            },
            Arc::clone(&clock),
        ));
        let constants = service
            .get_constants()
            .await
            .map_err(|err| eyre!("refusing to start: {err}"))?;
        info!(expiry_days = constants.expiry_days, "staging constants loaded");

        let (username, password) = settings.lims_credentials()?;
        let auth = LimsAuthClient::new(settings.lims_url()?, username, password, timeout)
            .wrap_err("failed to build LIMS auth client")?;
        let tokens = TokenLifecycleManager::new(
            Arc::new(auth),
            Arc::clone(&clock),
            Arc::clone(&sleeper),
            TokenLifecycleConfig {
                refresh_margin: settings.token_refresh_margin(),
                retry_delay: settings.token_retry_delay(),
            },
        );
        let bearer: Arc<dyn BearerTokenProvider> = Arc::new(tokens.clone());
        let datasets = LimsDatasetClient::new(settings.lims_url()?, bearer, timeout)
            .wrap_err("failed to build LIMS dataset client")?;

        let directory = DirectoryHttpClient::new(
            settings.directory_url()?,
            settings.directory_token.clone(),
            timeout,
        )
        .wrap_err("failed to build directory client")?;
        let broadcaster = Arc::new(ContactBroadcaster::new(
            Arc::new(directory),
            Arc::new(SendmailNotifier::new(settings.mail_from()?)),
            MessageTemplates::new(settings.message_settings()?),
            settings.error_monitoring_email.clone(),
        ));

        let sync_ports = NotificationSyncPorts {
            watermarks: Arc::new(DieselNotificationWatermarkRepository::new(pool)),
            source: Arc::new(datasets),
            broadcaster: Arc::clone(&broadcaster),
            clock,
        };
        let contact_ticker: Arc<dyn PeriodicJob> =
            Arc::new(ContactTickerJob::new(service, broadcaster));
        let released: Arc<dyn PeriodicJob> =
            Arc::new(NotificationSyncJob::released(sync_ports.clone()));
        let validated: Arc<dyn PeriodicJob> = Arc::new(NotificationSyncJob::validated(
            sync_ports,
            settings.validation_recipients()?,
        ));
        let local_jobs: Schedule = vec![(contact_ticker, settings.contact_interval())];
        let lims_jobs: Schedule = vec![
            (released, settings.released_interval()),
            (validated, settings.validated_interval()),
        ];

        Ok(Self {
            tokens,
            local_jobs,
            lims_jobs,
            login_grace: settings.http_timeout(),
            sleeper,
        })
    }

    async fn start(self) -> Running {
        self.tokens.start();
        let mut tasks = spawn_all(self.local_jobs, &self.sleeper);

        match tokio::time::timeout(self.login_grace, self.tokens.wait_for_token()).await {
            Ok(_) => info!("LIMS session established"),
            Err(_) => warn!(
                grace_secs = self.login_grace.as_secs(),
                "no LIMS token yet; starting feeds anyway"
            ),
        }
        tasks.extend(spawn_all(self.lims_jobs, &self.sleeper));

        Running {
            tokens: self.tokens,
            tasks,
        }
    }
}

fn spawn_all(jobs: Schedule, sleeper: &Arc<dyn Sleeper>) -> Vec<PeriodicTask> {
    jobs.into_iter()
        .map(|(job, interval)| PeriodicTask::spawn(job, interval, Arc::clone(sleeper)))
        .collect()
}

impl Running {
    async fn stop(self) {
        for task in &self.tasks {
            task.stop().await;
        }
        self.tokens.stop();
        info!("staging service stopped");
    }
}
