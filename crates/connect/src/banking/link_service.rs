//! Service for linking and unlinking provider connections.

use chrono::Utc;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::oneshot;

use super::connection_lifecycle::{advance_connection, disconnect_accounts};
use super::models::InitiateConnectionRequest;
use super::traits::BankingApiClient;
use crate::config::ConnectConfig;
use crate::oauth::{
    OAuthPopupCoordinator, PopupErrorCode, PopupHandle, PopupHost, PopupOutcome, PopupRequest,
};
use banklink_core::accounts::BankAccountRepositoryTrait;
use banklink_core::connections::{
    self, BankConnection, BankConnectionRepositoryTrait, BankProvider, ConnectionEvent,
    ConnectionStatus,
};
use banklink_core::errors::{Error, Result, ValidationError};
use banklink_core::events::{DomainEventSink, NoOpDomainEventSink};

/// Drives connections from initiation to authorization, and tears them down.
pub struct LinkService {
    api: Arc<dyn BankingApiClient>,
    connections: Arc<dyn BankConnectionRepositoryTrait>,
    accounts: Arc<dyn BankAccountRepositoryTrait>,
    coordinator: OAuthPopupCoordinator,
    config: ConnectConfig,
    event_sink: Arc<dyn DomainEventSink>,
}

impl LinkService {
    pub fn new(
        api: Arc<dyn BankingApiClient>,
        connections: Arc<dyn BankConnectionRepositoryTrait>,
        accounts: Arc<dyn BankAccountRepositoryTrait>,
        popup_host: Arc<dyn PopupHost>,
        config: ConnectConfig,
    ) -> Self {
        // Popups trust the same app origin that is sent as `return_origin`.
        let coordinator = OAuthPopupCoordinator::from_config(popup_host, &config);
        Self {
            api,
            connections,
            accounts,
            coordinator,
            config,
            event_sink: Arc::new(NoOpDomainEventSink),
        }
    }

    /// Sets the domain event sink for emitting connection changes.
    pub fn with_event_sink(mut self, event_sink: Arc<dyn DomainEventSink>) -> Self {
        self.event_sink = event_sink;
        self
    }

    /// Creates a connection with `provider` and opens its consent popup.
    ///
    /// The returned session resolves once the popup settles and the
    /// connection has been moved to `AUTHORIZED` or `FAILED`.
    pub async fn start_link(&self, provider: BankProvider) -> Result<LinkSession> {
        if !provider.is_linkable() {
            return Err(Error::Validation(ValidationError::InvalidInput(format!(
                "Provider {} cannot be linked",
                provider
            ))));
        }
        if self.config.provider_domain(provider).is_none() {
            return Err(Error::Validation(ValidationError::InvalidInput(format!(
                "No domain configured for provider {}",
                provider
            ))));
        }

        let initiated = self
            .api
            .initiate_connection(&InitiateConnectionRequest {
                provider,
                return_origin: Some(self.config.app_origin.clone()),
            })
            .await?;
        let connection = self
            .connections
            .create(BankConnection::new(initiated.connection_id.clone(), provider))
            .await?;
        info!(
            "[Banking] Linking {} via connection {}",
            provider.display_name(),
            connection.id
        );

        let session = self.coordinator.open(PopupRequest::new(
            connection.id.clone(),
            initiated.redirect_url,
            self.config.origin_policy(provider),
        ));
        let handle = session.canceller();
        let finalizer = LinkFinalizer {
            connections: self.connections.clone(),
            event_sink: self.event_sink.clone(),
            connection_id: initiated.connection_id.clone(),
            expires_in: initiated.expires_in,
        };

        if handle.window_opened() {
            if let Err(err) = advance_connection(
                self.connections.as_ref(),
                self.event_sink.as_ref(),
                connection,
                ConnectionEvent::PopupOpened,
            )
            .await
            {
                warn!(
                    "[Banking] Could not record open popup for connection {}: {}",
                    initiated.connection_id, err
                );
                handle.cancel();
                if let Err(fail_err) = finalizer.finish(None).await {
                    warn!(
                        "[Banking] Could not fail connection {}: {}",
                        initiated.connection_id, fail_err
                    );
                }
                return Err(err);
            }
        }

        let (result_tx, result_rx) = oneshot::channel();
        tokio::spawn(async move {
            let outcome = session.outcome().await;
            let _ = result_tx.send(finalizer.finish(outcome).await);
        });

        Ok(LinkSession {
            connection_id: initiated.connection_id,
            handle,
            result: result_rx,
        })
    }

    /// Runs a full link flow and returns its outcome.
    pub async fn initiate_link(&self, provider: BankProvider) -> Result<PopupOutcome> {
        let session = self.start_link(provider).await?;
        Ok(session
            .outcome()
            .await?
            .unwrap_or(PopupOutcome::Cancelled))
    }

    /// Revokes an authorized connection and disconnects its accounts.
    pub async fn disconnect(&self, connection_id: &str) -> Result<BankConnection> {
        let connection = self.connections.get_by_id(connection_id)?;
        // Refuse before touching the provider.
        connections::transition(connection.status, ConnectionEvent::Revoke)?;

        self.api.revoke_connection(connection_id).await?;
        let connection = advance_connection(
            self.connections.as_ref(),
            self.event_sink.as_ref(),
            connection,
            ConnectionEvent::Revoke,
        )
        .await?;
        disconnect_accounts(
            self.accounts.as_ref(),
            self.event_sink.as_ref(),
            connection_id,
        )
        .await?;
        Ok(connection)
    }
}

/// A link flow in progress.
#[derive(Debug)]
pub struct LinkSession {
    connection_id: String,
    handle: PopupHandle,
    result: oneshot::Receiver<Result<Option<PopupOutcome>>>,
}

impl LinkSession {
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Waits for the flow to finish. `None` means it was cancelled by the
    /// caller; the connection is `FAILED` in that case.
    pub async fn outcome(self) -> Result<Option<PopupOutcome>> {
        self.result
            .await
            .map_err(|_| Error::Unexpected("Link flow ended without a result".to_string()))?
    }

    /// Abandons the flow and closes the popup. Idempotent.
    pub fn cancel(&self) -> bool {
        self.handle.cancel()
    }

    /// A handle that can cancel this flow while its outcome is awaited.
    pub fn canceller(&self) -> PopupHandle {
        self.handle.clone()
    }
}

/// Records the popup outcome on the connection.
struct LinkFinalizer {
    connections: Arc<dyn BankConnectionRepositoryTrait>,
    event_sink: Arc<dyn DomainEventSink>,
    connection_id: String,
    expires_in: Option<i64>,
}

impl LinkFinalizer {
    async fn finish(self, outcome: Option<PopupOutcome>) -> Result<Option<PopupOutcome>> {
        let mut connection = self.connections.get_by_id(&self.connection_id)?;

        match &outcome {
            Some(PopupOutcome::Success { .. }) => {
                connection.mark_authorized(Utc::now(), self.expires_in);
                self.advance(connection, ConnectionEvent::Authorize).await?;
            }
            Some(PopupOutcome::Error { code, message }) => {
                match code {
                    PopupErrorCode::PopupBlocked => {
                        warn!("[Banking] Popup blocked for connection {}", self.connection_id)
                    }
                    PopupErrorCode::OAuthError => warn!(
                        "[Banking] Provider error for connection {}: {}",
                        self.connection_id,
                        message.as_deref().unwrap_or("no message")
                    ),
                }
                self.fail(connection).await?;
            }
            Some(PopupOutcome::Cancelled) => {
                debug!("[Banking] User closed the popup for {}", self.connection_id);
                self.fail(connection).await?;
            }
            None => {
                debug!("[Banking] Link cancelled for {}", self.connection_id);
                self.fail(connection).await?;
            }
        }
        Ok(outcome)
    }

    async fn fail(&self, connection: BankConnection) -> Result<()> {
        if matches!(
            connection.status,
            ConnectionStatus::Pending | ConnectionStatus::InProgress
        ) {
            self.advance(connection, ConnectionEvent::Fail).await?;
        }
        Ok(())
    }

    async fn advance(&self, connection: BankConnection, event: ConnectionEvent) -> Result<()> {
        advance_connection(
            self.connections.as_ref(),
            self.event_sink.as_ref(),
            connection,
            event,
        )
        .await?;
        Ok(())
    }
}
