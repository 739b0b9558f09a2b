use crate::api::{ApiGateway, AuthApi, BidLedger, ChatApi, KycApi, NotificationFeed, WalletApi};
use crate::auth::{RefreshScheduler, RefreshTiming, SessionManager};
use crate::configuration::Settings;
use crate::error::{AuthError, ClientError};
use crate::navigation::Navigator;
use crate::storage::{KeyValueStore, TokenStore};
use std::sync::{Arc, Mutex};

/// Composition root: one session, one gateway, and the facades built on them.
pub struct Client {
    session: Arc<SessionManager>,
    gateway: ApiGateway,
    bids: Arc<BidLedger>,
    wallet: WalletApi,
    kyc: KycApi,
    chat: ChatApi,
    notifications: NotificationFeed,
    timing: RefreshTiming,
    scheduler: Mutex<Option<RefreshScheduler>>,
}

impl Client {
    pub fn build(
        settings: &Settings,
        store: Arc<dyn KeyValueStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = settings.api.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;

        let base_url = settings.api.base_url.clone();
        let tokens = TokenStore::new(store);

        let session = Arc::new(SessionManager::new(
            AuthApi::new(base_url.clone(), http_client.clone()),
            tokens.clone(),
            navigator,
            settings.session.login_route.clone(),
        ));
        let gateway = ApiGateway::new(base_url, http_client, tokens);
        let bids = Arc::new(BidLedger::new(gateway.clone()));

        Ok(Self {
            wallet: WalletApi::new(gateway.clone()),
            kyc: KycApi::new(gateway.clone()),
            chat: ChatApi::new(gateway.clone()),
            notifications: NotificationFeed::new(gateway.clone(), Arc::clone(&bids)),
            timing: RefreshTiming::from(&settings.session),
            scheduler: Mutex::new(None),
            session,
            gateway,
            bids,
        })
    }

    /// Restore any stored session, then start proactive refresh.
    pub async fn start(&self) {
        self.session.bootstrap().await;

        let mut scheduler = self
            .scheduler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if scheduler.is_none() {
            *scheduler = Some(RefreshScheduler::start(
                Arc::clone(&self.session),
                self.timing,
            ));
        }
    }

    /// Stop the refresh scheduler. The session itself is left as is.
    pub fn shutdown(&self) {
        let scheduler = self
            .scheduler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        drop(scheduler);
    }

    pub fn is_running(&self) -> bool {
        self.scheduler
            .lock()
            .map(|scheduler| scheduler.is_some())
            .unwrap_or(false)
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn gateway(&self) -> &ApiGateway {
        &self.gateway
    }

    pub fn bids(&self) -> &BidLedger {
        &self.bids
    }

    pub fn wallet(&self) -> &WalletApi {
        &self.wallet
    }

    pub fn kyc(&self) -> &KycApi {
        &self.kyc
    }

    pub fn chat(&self) -> &ChatApi {
        &self.chat
    }

    pub fn notifications(&self) -> &NotificationFeed {
        &self.notifications
    }

    /// Resolve authentication failures by ending the session.
    ///
    /// Any other result passes through untouched.
    pub fn settle<T>(&self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        if let Err(ClientError::Auth(e)) = &result {
            if *e != AuthError::Superseded && self.session.is_authenticated() {
                tracing::info!(error = %e, "Authentication lost, ending session");
                self.session.logout();
            }
        }
        result
    }
}
