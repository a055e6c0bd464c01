//! FluentControl Client
//!
//! Thin orchestration over validation, transport, session and monitor.
//! Each client owns its transport, catalog and last accepted deck layout;
//! nothing is shared between client instances.

use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::catalog::{Catalog, CatalogError};
use crate::config::{AppConfig, ConfigError};
use crate::deck::Layout;
use crate::plan::TransferPlan;
use crate::session::{Monitor, MonitorConfig, MonitorError, Session, SessionError, SessionState};
use crate::transport::wire::InstrumentStatus;
use crate::transport::{
    Credentials, HttpTransport, InstrumentApi, Reply, Transport, TransportError,
};
use crate::validation::{self, ValidationError};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("No deck layout has been accepted by the instrument")]
    NoLayout,

    #[error("Instrument did not accept the deck layout: {0}")]
    LayoutNotAccepted(String),

    #[error("Instrument rejected request ({code}): {message}")]
    Rejected { code: u16, message: String },

    #[error("Instrument server error ({code}): {message}")]
    ServerError { code: u16, message: String },

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl ClientError {
    pub fn code(&self) -> &'static str {
        match self {
            ClientError::NoLayout => "NO_LAYOUT",
            ClientError::LayoutNotAccepted(_) => "LAYOUT_NOT_ACCEPTED",
            ClientError::Rejected { .. } => "REJECTED",
            ClientError::ServerError { .. } => "SERVER_ERROR",
            ClientError::Validation(e) => e.code(),
            ClientError::Transport(e) => e.code(),
            ClientError::Session(e) => e.code(),
            ClientError::Monitor(e) => e.code(),
            ClientError::Config(e) => e.code(),
            ClientError::Catalog(_) => "CATALOG_ERROR",
        }
    }
}

fn accepted<T>(reply: Reply<T>) -> Result<T, ClientError> {
    match reply {
        Reply::Accepted(value) => Ok(value),
        Reply::Rejected { code, message } => Err(ClientError::Rejected { code, message }),
        Reply::ServerError { code, message } => Err(ClientError::ServerError { code, message }),
    }
}

fn same_position_ids(a: &Layout, b: &Layout) -> bool {
    a.len() == b.len() && a.positions().iter().all(|p| b.get(&p.position_id).is_some())
}

pub struct FluentClient {
    transport: Arc<dyn Transport>,
    catalog: Arc<Catalog>,
    monitor: MonitorConfig,
    layout: Option<Layout>,
}

impl FluentClient {
    pub fn new(transport: Arc<dyn Transport>, catalog: Arc<Catalog>, monitor: MonitorConfig) -> Self {
        Self {
            transport,
            catalog,
            monitor,
            layout: None,
        }
    }

    /// HTTP client for the configured instrument, credentials from the
    /// environment
    pub fn from_config(config: &AppConfig) -> Result<Self, ClientError> {
        let transport = HttpTransport::new(
            &config.instrument.base_url,
            Credentials::from_env(),
            config.instrument.request_timeout(),
        )?;

        let catalog = match &config.catalog_path {
            Some(path) => {
                info!(path = %path, "Loading instrument catalog");
                Catalog::from_file(path)?
            }
            None => Catalog::standard(),
        };

        Ok(Self::new(
            Arc::new(transport),
            Arc::new(catalog),
            config.monitor_config(),
        ))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn monitor_config(&self) -> &MonitorConfig {
        &self.monitor
    }

    /// Most recently accepted deck layout
    pub fn layout(&self) -> Option<&Layout> {
        self.layout.as_ref()
    }

    fn api(&self) -> InstrumentApi<'_> {
        InstrumentApi::new(self.transport.as_ref())
    }

    // ------------------------------------------------------------------
    // Instrument / deck
    // ------------------------------------------------------------------

    pub async fn instrument_status(&self) -> Result<InstrumentStatus, ClientError> {
        accepted(self.api().instrument_status().await?)
    }

    /// Deck as currently configured on the instrument
    pub async fn deck_layout(&self) -> Result<Layout, ClientError> {
        let snapshot = accepted(self.api().deck_layout().await?)?;
        Ok(Layout::new(snapshot.positions))
    }

    /// Validate and send a layout; on acceptance the submitted layout becomes
    /// the one new sessions are validated against
    pub async fn post_layout(&mut self, layout: Layout) -> Result<&Layout, ClientError> {
        validation::validate_layout(&layout).map_err(ValidationError::from)?;

        let ack = accepted(self.api().post_layout(&layout).await?)?;
        if !ack.accepted {
            let message = ack.message.unwrap_or_else(|| "layout refused".to_string());
            warn!(positions = layout.len(), %message, "Deck layout not accepted");
            return Err(ClientError::LayoutNotAccepted(message));
        }

        // Sessions are validated against what we sent; an echo is only compared
        if let Some(positions) = ack.positions
            && !positions.is_empty()
        {
            let echo = Layout::new(positions);
            if let Err(e) = validation::validate_layout(&echo) {
                warn!(error = %e, "Instrument echoed an invalid deck layout, ignoring it");
            } else if !same_position_ids(&echo, &layout) {
                warn!(
                    sent = layout.len(),
                    echoed = echo.len(),
                    "Instrument echoed a different set of deck positions"
                );
            }
        }
        info!(positions = layout.len(), "Deck layout accepted");
        Ok(self.layout.insert(layout))
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Draft a session against the accepted layout
    pub fn create_session(&self, plan: TransferPlan) -> Result<Session, ClientError> {
        let layout = self.layout.as_ref().ok_or(ClientError::NoLayout)?;
        Ok(Session::draft(plan, layout, &self.catalog)?)
    }

    pub async fn submit(&self, session: &mut Session) -> Result<SessionState, ClientError> {
        Ok(session.submit(self.transport.as_ref()).await?)
    }

    pub async fn start(&self, session: &mut Session) -> Result<SessionState, ClientError> {
        Ok(session.start(self.transport.as_ref()).await?)
    }

    pub async fn poll(&self, session: &mut Session) -> Result<SessionState, ClientError> {
        Ok(session.poll(self.transport.as_ref()).await?)
    }

    pub async fn cancel(&self, session: &mut Session) -> Result<SessionState, ClientError> {
        Ok(session.cancel(self.transport.as_ref()).await?)
    }

    /// Poll until the session reaches a terminal state
    pub async fn monitor(&self, session: &mut Session) -> Result<Session, ClientError> {
        let monitor = Monitor::new(self.monitor.clone());
        Ok(monitor
            .await_terminal(session, self.transport.as_ref())
            .await?)
    }

    /// As `monitor`, returning `Stopped` once `stop` resolves
    pub async fn monitor_until<F>(&self, session: &mut Session, stop: F) -> Result<Session, ClientError>
    where
        F: Future<Output = ()>,
    {
        let monitor = Monitor::new(self.monitor.clone());
        Ok(monitor
            .await_terminal_until(session, self.transport.as_ref(), stop)
            .await?)
    }

    /// Draft, submit, start and monitor a plan to completion
    pub async fn run_plan(&self, plan: TransferPlan) -> Result<Session, ClientError> {
        let mut session = self.create_session(plan)?;
        info!(
            local_id = %session.local_id(),
            transfers = session.plan().len(),
            total_volume_ul = session.plan().total_volume_ul(),
            "Running transfer plan"
        );

        self.submit(&mut session).await?;
        if self.start(&mut session).await? == SessionState::Failed {
            return Err(MonitorError::SessionFailed(
                session.error_detail().unwrap_or_default().to_string(),
            )
            .into());
        }
        self.monitor(&mut session).await
    }
}
