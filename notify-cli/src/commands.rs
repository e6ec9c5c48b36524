use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use notify_client::api::HttpNotificationApi;
use notify_client::database::{self, SqlxNotificationRepository};
use notify_client::notification::HttpConnector;
use notify_client::{
    ClientConfig, ConnectionState, Inbox, InboxTab, IngestEvent, Session, SessionManager,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::cli::OutputFormat;
use crate::output::OutputManager;

pub struct CommandExecutor {
    config: ClientConfig,
    session: Session,
    output: OutputManager,
}

impl CommandExecutor {
    pub fn new(config: ClientConfig, session: Session, colored: bool) -> Self {
        Self {
            config,
            session,
            output: OutputManager::new(colored),
        }
    }

    async fn open_store(&self) -> Result<Arc<SqlxNotificationRepository>> {
        let pool = database::connect(&self.config.database_url)
            .await
            .with_context(|| format!("Failed to open {}", self.config.database_url))?;
        Ok(Arc::new(SqlxNotificationRepository::new(pool)))
    }

    fn user_id(&self) -> Result<&str> {
        self.session
            .user_id()
            .context("No user id; pass --user-id or set NOTIFY_USER_ID")
    }

    fn require_token(&self) -> Result<()> {
        if self.session.token().is_none() {
            bail!("No token; pass --token or set NOTIFY_TOKEN");
        }
        Ok(())
    }

    /// Run the ingestor until Ctrl-C, the optional deadline, or the
    /// connection closing for good.
    pub async fn listen(&self, duration: Option<Duration>, format: OutputFormat) -> Result<()> {
        self.user_id()?;
        self.require_token()?;

        let store = self.open_store().await?;
        let connector = Arc::new(HttpConnector::new(
            &self.config.base_url,
            self.config.request_timeout(),
        ));
        let manager = SessionManager::new(connector, store, self.config.ingestor_config());

        let ingestor = manager.login(self.session.clone()).await?;
        let mut events = ingestor.subscribe();
        info!(base_url = %self.config.base_url, "Listening for notifications");

        let deadline = async {
            match duration {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        loop {
            let event = tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                _ = &mut deadline => break,
                event = events.recv() => event,
            };

            match event {
                Ok(event) => {
                    if let Some(line) = self.output.format_event(&event, format) {
                        println!("{line}");
                    }
                    if matches!(event, IngestEvent::StateChanged(ConnectionState::Closed)) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Output fell behind the ingestor");
                }
                Err(RecvError::Closed) => break,
            }
        }

        let badge = manager.badge().count();
        manager.logout().await;
        if format == OutputFormat::Pretty {
            println!("{badge} new notification(s) this session");
        }
        Ok(())
    }

    pub async fn inbox(&self, tab: InboxTab, page: usize, format: OutputFormat) -> Result<()> {
        let user_id = self.user_id()?;
        let store = self.open_store().await?;
        let inbox = Inbox::load(
            store.as_ref(),
            user_id,
            self.config.preload_limit,
            self.config.inbox_page_size,
        )
        .await?;

        let page = inbox.page(tab, page);
        print!("{}", self.output.format_page(&page, format)?);
        Ok(())
    }

    pub async fn respond(&self, request_id: i64, accept: bool) -> Result<()> {
        let user_id = self.user_id()?;
        self.require_token()?;

        let store = self.open_store().await?;
        let api = HttpNotificationApi::new(
            &self.config.base_url,
            self.session.clone(),
            self.config.request_timeout(),
        )?;
        let mut inbox = Inbox::load(
            store.as_ref(),
            user_id,
            self.config.preload_limit,
            self.config.inbox_page_size,
        )
        .await?;

        inbox
            .respond(&api, store.as_ref(), request_id, accept)
            .await
            .with_context(|| format!("Failed to answer friend request {request_id}"))?;

        let verb = if accept { "Accepted" } else { "Rejected" };
        println!("✓ {verb} friend request {request_id}");
        Ok(())
    }
}
